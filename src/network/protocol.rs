//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON, tagged by a `type` field.
//! Public game state travels as a [`PublicState`] projection; hands
//! only ever travel inside a private [`ServerMessage::UnoHand`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::monopoly::{DeckKind, Landing};
use crate::game::uno::{Card, CardColor};
use crate::game::{GameError, GameKind, GameStatus, PublicState};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with an externally issued JWT. Must precede every
    /// other message.
    Authenticate {
        /// The bearer token.
        token: String,
    },

    /// Create a new session of the given kind and join it as host.
    CreateGame {
        /// Which game to create.
        kind: GameKind,
    },

    /// Join a specific waiting session.
    JoinGame {
        /// Target session id (UUID string).
        session_id: String,
    },

    /// Join the first open session of the kind, or create one.
    QuickMatch {
        /// Which game to play.
        kind: GameKind,
    },

    /// Start the bound session (host only, needs at least 2 players).
    StartGame,

    /// Race game: roll the die.
    RollDice,

    /// Race game: move a piece by the pending roll.
    MovePiece {
        /// Piece index, 0..=3.
        piece: usize,
    },

    /// Trading game: roll two dice, move, and resolve the landing.
    MonopolyRoll,

    /// Trading game: buy the unowned space you stand on.
    MonopolyBuy {
        /// Board space index.
        space: usize,
    },

    /// Trading game: add a building to an owned street.
    MonopolyBuyBuilding {
        /// Board space index.
        space: usize,
    },

    /// Card game: play a hand card, declaring a color for wilds.
    UnoPlayCard {
        /// Index into the player's hand.
        card_index: usize,
        /// Declared color; required for wilds.
        chosen_color: Option<CardColor>,
    },

    /// Card game: draw one card.
    UnoDrawCard,

    /// Card game: declare being down to the final card.
    UnoCallUno,

    /// Leave the bound session, freeing the seat.
    LeaveGame,

    /// Request the waiting-session listing.
    ListGames,

    /// Ping for latency measurement.
    Ping {
        /// Echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// One entry in the waiting-session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListing {
    /// Session id (UUID string).
    pub session_id: String,
    /// Game kind.
    pub kind: GameKind,
    /// Host display name.
    pub host: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Seated players.
    pub player_count: usize,
    /// Seat capacity.
    pub max_players: usize,
}

/// A race-game capture on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureInfo {
    /// Seat index of the captured piece's owner.
    pub player_index: usize,
    /// Which piece was sent home.
    pub piece: usize,
}

/// A trading-game landing resolution on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LandingInfo {
    /// Nothing to resolve.
    None,
    /// The mover may buy the space.
    CanBuy {
        /// Board space index.
        space: usize,
    },
    /// Rent transferred to the owner.
    PaidRent {
        /// Board space index.
        space: usize,
        /// Amount transferred.
        rent: i64,
        /// Receiving owner (UUID string).
        owner: String,
    },
    /// Tax charged by the bank.
    PaidTax {
        /// Amount charged.
        amount: i64,
    },
    /// The mover was sent to jail.
    WentToJail,
    /// A card was drawn and applied.
    DrewCard {
        /// Source deck.
        deck: DeckKind,
        /// Card text.
        text: String,
        /// Signed balance delta.
        amount: i64,
    },
}

impl From<Landing> for LandingInfo {
    fn from(landing: Landing) -> Self {
        match landing {
            Landing::None => LandingInfo::None,
            Landing::CanBuy { space } => LandingInfo::CanBuy { space },
            Landing::PaidRent { space, rent, owner } => LandingInfo::PaidRent {
                space,
                rent,
                owner: owner.to_uuid_string(),
            },
            Landing::PaidTax { amount } => LandingInfo::PaidTax { amount },
            Landing::WentToJail => LandingInfo::WentToJail,
            Landing::DrewCard { deck, text, amount } => LandingInfo::DrewCard {
                deck,
                text: text.to_string(),
                amount,
            },
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication accepted.
    Authenticated {
        /// Stable player id (UUID string).
        player_id: String,
        /// Display name taken from the token.
        display_name: String,
    },

    /// Authentication rejected.
    AuthError {
        /// Why the credential was refused.
        message: String,
    },

    /// A session was created; the requester is its host.
    GameCreated {
        /// New session id (UUID string).
        session_id: String,
        /// Initial projection.
        state: PublicState,
    },

    /// Full public projection of the bound session.
    GameState {
        /// Session id (UUID string).
        session_id: String,
        /// Current projection.
        state: PublicState,
        /// When the current turn is forced, if the clock is armed.
        turn_deadline: Option<DateTime<Utc>>,
    },

    /// The session left the lobby and play began.
    GameStarted {
        /// Session id (UUID string).
        session_id: String,
        /// Projection at turn one.
        state: PublicState,
        /// When the first turn is forced.
        turn_deadline: Option<DateTime<Utc>>,
    },

    /// Race game: a die was rolled.
    DiceRolled {
        /// Roller (UUID string).
        player_id: String,
        /// Face value.
        value: u8,
        /// No piece could move; the turn passed immediately.
        auto_passed: bool,
    },

    /// Race game: a piece moved.
    PieceMoved {
        /// Mover (UUID string).
        player_id: String,
        /// Which piece.
        piece: usize,
        /// New relative offset.
        new_pos: i8,
        /// Opponent piece sent home, if any.
        captured: Option<CaptureInfo>,
        /// The mover keeps the turn.
        turn_repeats: bool,
    },

    /// A game action was rejected; sent only to the actor.
    InvalidMove {
        /// Rule that was violated.
        message: String,
    },

    /// Trading game: a player rolled and moved.
    MonopolyMoved {
        /// Mover (UUID string).
        player_id: String,
        /// The two dice.
        dice: (u8, u8),
        /// Position after moving.
        new_position: usize,
        /// GO bonus credited.
        passed_go: bool,
        /// Landing resolution.
        landing: LandingInfo,
        /// Doubles: the mover rolls again.
        turn_repeats: bool,
    },

    /// Trading game: a space was bought.
    MonopolyBought {
        /// Buyer (UUID string).
        player_id: String,
        /// Board space index.
        space: usize,
    },

    /// Trading game: a building was added.
    MonopolyBuildingBought {
        /// Buyer (UUID string).
        player_id: String,
        /// Board space index.
        space: usize,
        /// Building count after the purchase.
        houses: u8,
    },

    /// Card game: a card was played.
    UnoCardPlayed {
        /// Player (UUID string).
        player_id: String,
        /// The card, now top of discard.
        card: Card,
        /// Active color after the play.
        color: CardColor,
        /// (seat, count) forced to draw, if any.
        forced_draw: Option<(usize, usize)>,
        /// Seat skipped over, if any.
        skipped: Option<usize>,
    },

    /// Card game: your hand. Sent only to its owner.
    UnoHand {
        /// The full hand.
        hand: Vec<Card>,
    },

    /// Card game: a player drew. The card itself stays hidden.
    UnoPlayerDrew {
        /// Drawer (UUID string).
        player_id: String,
        /// The drawn card was unplayable and the turn passed.
        turn_passed: bool,
    },

    /// Card game: a player declared their final card.
    UnoCalled {
        /// Caller (UUID string).
        player_id: String,
    },

    /// A player left the session.
    PlayerLeft {
        /// Departed player (UUID string).
        player_id: String,
    },

    /// The game finished with a winner.
    GameOver {
        /// Winner (UUID string).
        winner_id: String,
        /// Final projection.
        state: PublicState,
    },

    /// A turn clock expired and the default action was forced.
    TurnTimeout {
        /// Player whose turn was skipped (UUID string).
        player_id: String,
    },

    /// Waiting-session listing changed (or was requested).
    GamesUpdated {
        /// Open sessions.
        games: Vec<GameListing>,
    },

    /// A non-game request failed; sent only to the actor.
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },

    /// Latency measurement response.
    Pong {
        /// Timestamp echoed from the ping.
        timestamp: u64,
    },
}

/// Error codes for failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No authenticated identity on this connection.
    AuthRequired,
    /// Credential validation failed.
    AuthFailed,
    /// No session with that id.
    SessionNotFound,
    /// Session has no free seat.
    SessionFull,
    /// Acting player does not hold the turn.
    NotYourTurn,
    /// The step was already performed this turn.
    AlreadyActed,
    /// Rule violation.
    InvalidAction,
    /// Internal invariant failure; the session state is unchanged.
    Internal,
}

impl ErrorCode {
    /// Map an engine error to its wire code.
    pub fn from_game_error(err: &GameError) -> Self {
        match err {
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::AlreadyActed => ErrorCode::AlreadyActed,
            GameError::InvalidAction(_) => ErrorCode::InvalidAction,
            GameError::Invariant(_) => ErrorCode::Internal,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// TESTS
// =============================================================================
