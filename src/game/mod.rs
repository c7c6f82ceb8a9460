//! Game Logic Module
//!
//! The three turn-based state machines and everything they share.
//! All code here is pure and synchronous: engines know nothing about
//! connections, timers, or transport. Randomness comes from a seeded
//! [`GameRng`] owned by the engine, so a whole game is reproducible
//! from its seed and action sequence.
//!
//! ## Module Structure
//!
//! - `rng`: seeded dice rolls and deck shuffling
//! - `engine`: closed [`GameEngine`] enum, the common contract
//! - `ludo`: race-and-capture game
//! - `monopoly`: property-trading game
//! - `uno`: shedding card game

pub mod engine;
pub mod ludo;
pub mod monopoly;
pub mod rng;
pub mod uno;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use engine::{GameEngine, PublicState};
pub use rng::GameRng;

// =============================================================================
// PLAYER IDENTITY
// =============================================================================

/// Stable player identifier (UUID as bytes).
///
/// Derived from the auth provider's subject claim, so it survives
/// disconnects and reconnects.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Authenticated identity as the engines see it: a stable id plus a
/// display name for projections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Stable external identifier.
    pub id: PlayerId,
    /// Name shown to other players.
    pub display_name: String,
}

// =============================================================================
// GAME KIND & STATUS
// =============================================================================

/// The three supported game kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Race-and-capture game.
    Ludo,
    /// Property-trading game.
    Monopoly,
    /// Shedding card game.
    Uno,
}

impl GameKind {
    /// Maximum players a session of this kind can seat.
    pub fn capacity(self) -> usize {
        match self {
            GameKind::Ludo => 4,
            GameKind::Monopoly => 6,
            GameKind::Uno => 10,
        }
    }

    /// Turn-clock duration for this kind.
    pub fn turn_duration(self) -> Duration {
        match self {
            GameKind::Ludo => Duration::from_secs(60),
            GameKind::Monopoly => Duration::from_secs(90),
            GameKind::Uno => Duration::from_secs(45),
        }
    }

    /// Snake-case name, matching the wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Ludo => "ludo",
            GameKind::Monopoly => "monopoly",
            GameKind::Uno => "uno",
        }
    }
}

/// Lifecycle status of a session's game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby: players may still join.
    Waiting,
    /// Turn order fixed, game in progress.
    Playing,
    /// A winner was decided.
    Finished,
    /// Suspended mid-game and archived as a snapshot.
    Saved,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Rule-level failures returned by engine operations.
///
/// Validation always fully precedes mutation: a returned error means
/// the game state is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The acting player does not hold the current turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The player already performed this step this turn (e.g. rolled twice).
    #[error("already acted this turn")]
    AlreadyActed,

    /// A rule violation: illegal move, purchase, or card play.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// An internal reference was unexpectedly missing. Caught at the
    /// action boundary; never corrupts session state.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl GameError {
    /// Shorthand for an [`GameError::InvalidAction`] with a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        GameError::InvalidAction(msg.into())
    }
}
