//! Game Engine Dispatch
//!
//! [`GameEngine`] is a closed enum over the three game kinds. The
//! session layer talks to it through the common contract (seating,
//! start, projections, timeout default) and reaches the game-specific
//! verbs through the checked accessors, which turn a kind mismatch
//! into a rule error instead of a panic.

use serde::{Deserialize, Serialize};

use crate::game::ludo::{LudoGame, LudoPublic};
use crate::game::monopoly::{MonopolyGame, MonopolyPublic};
use crate::game::uno::{Card, UnoGame, UnoPublic};
use crate::game::{GameError, GameKind, GameStatus, PlayerId, PlayerProfile};

/// One game of any supported kind.
#[derive(Clone, Debug)]
pub enum GameEngine {
    /// Race-and-capture game.
    Ludo(LudoGame),
    /// Property-trading game.
    Monopoly(MonopolyGame),
    /// Shedding card game.
    Uno(UnoGame),
}

/// Public projection of any game, tagged by kind on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublicState {
    /// Race-and-capture projection.
    Ludo(LudoPublic),
    /// Property-trading projection.
    Monopoly(MonopolyPublic),
    /// Shedding-card projection.
    Uno(UnoPublic),
}

impl GameEngine {
    /// Create an empty waiting game of the given kind.
    pub fn new(kind: GameKind) -> Self {
        match kind {
            GameKind::Ludo => GameEngine::Ludo(LudoGame::new()),
            GameKind::Monopoly => GameEngine::Monopoly(MonopolyGame::new()),
            GameKind::Uno => GameEngine::Uno(UnoGame::new()),
        }
    }

    /// Which kind this engine is.
    pub fn kind(&self) -> GameKind {
        match self {
            GameEngine::Ludo(_) => GameKind::Ludo,
            GameEngine::Monopoly(_) => GameKind::Monopoly,
            GameEngine::Uno(_) => GameKind::Uno,
        }
    }

    /// Lifecycle status.
    pub fn status(&self) -> GameStatus {
        match self {
            GameEngine::Ludo(g) => g.status(),
            GameEngine::Monopoly(g) => g.status(),
            GameEngine::Uno(g) => g.status(),
        }
    }

    /// Seat a player.
    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<(), GameError> {
        if self.is_full() {
            return Err(GameError::invalid("no free seat"));
        }
        match self {
            GameEngine::Ludo(g) => g.add_player(profile),
            GameEngine::Monopoly(g) => g.add_player(profile),
            GameEngine::Uno(g) => g.add_player(profile),
        }
    }

    /// Remove a player, repairing the turn index. Returns whether the
    /// player was seated.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        match self {
            GameEngine::Ludo(g) => g.remove_player(id),
            GameEngine::Monopoly(g) => g.remove_player(id),
            GameEngine::Uno(g) => g.remove_player(id),
        }
    }

    /// Fix turn order and begin play.
    pub fn start(&mut self, seed: u64) -> Result<(), GameError> {
        match self {
            GameEngine::Ludo(g) => g.start(seed),
            GameEngine::Monopoly(g) => g.start(seed),
            GameEngine::Uno(g) => g.start(seed),
        }
    }

    /// Suspend a playing game so its snapshot can be archived.
    pub fn suspend(&mut self) {
        match self {
            GameEngine::Ludo(g) => g.suspend(),
            GameEngine::Monopoly(g) => g.suspend(),
            GameEngine::Uno(g) => g.suspend(),
        }
    }

    /// Apply the kind-specific forced default when a turn times out.
    pub fn apply_timeout_default(&mut self) {
        match self {
            GameEngine::Ludo(g) => g.apply_timeout_default(),
            GameEngine::Monopoly(g) => g.apply_timeout_default(),
            GameEngine::Uno(g) => g.apply_timeout_default(),
        }
    }

    /// Seated player count.
    pub fn player_count(&self) -> usize {
        match self {
            GameEngine::Ludo(g) => g.players().len(),
            GameEngine::Monopoly(g) => g.players().len(),
            GameEngine::Uno(g) => g.players().len(),
        }
    }

    /// Seat capacity for this kind.
    pub fn capacity(&self) -> usize {
        self.kind().capacity()
    }

    /// Whether every seat is taken.
    pub fn is_full(&self) -> bool {
        self.player_count() >= self.capacity()
    }

    /// Ids of all seated players, in turn order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        match self {
            GameEngine::Ludo(g) => g.players().iter().map(|p| p.profile.id).collect(),
            GameEngine::Monopoly(g) => g.players().iter().map(|p| p.profile.id).collect(),
            GameEngine::Uno(g) => g.players().iter().map(|p| p.profile.id).collect(),
        }
    }

    /// The first-seated player; start is reserved to them.
    pub fn host(&self) -> Option<PlayerId> {
        self.player_ids().first().copied()
    }

    /// Display name of the host, for the lobby listing.
    pub fn host_name(&self) -> Option<&str> {
        match self {
            GameEngine::Ludo(g) => g.players().first().map(|p| p.profile.display_name.as_str()),
            GameEngine::Monopoly(g) => {
                g.players().first().map(|p| p.profile.display_name.as_str())
            }
            GameEngine::Uno(g) => g.players().first().map(|p| p.profile.display_name.as_str()),
        }
    }

    /// Id of the player whose turn it is.
    pub fn current_player(&self) -> Option<PlayerId> {
        let ids = self.player_ids();
        let idx = match self {
            GameEngine::Ludo(g) => g.current_index(),
            GameEngine::Monopoly(g) => g.current_index(),
            GameEngine::Uno(g) => g.current_index(),
        };
        ids.get(idx).copied()
    }

    /// Whether a player is seated.
    pub fn has_player(&self, id: PlayerId) -> bool {
        match self {
            GameEngine::Ludo(g) => g.seat_of(id).is_some(),
            GameEngine::Monopoly(g) => g.seat_of(id).is_some(),
            GameEngine::Uno(g) => g.seat_of(id).is_some(),
        }
    }

    /// Public projection, safe to broadcast.
    pub fn public_state(&self) -> PublicState {
        match self {
            GameEngine::Ludo(g) => PublicState::Ludo(g.public_state()),
            GameEngine::Monopoly(g) => PublicState::Monopoly(g.public_state()),
            GameEngine::Uno(g) => PublicState::Uno(g.public_state()),
        }
    }

    /// Private projection for one player. Only the card game carries
    /// hidden information; other kinds return `None`.
    pub fn private_hand(&self, id: PlayerId) -> Option<Vec<Card>> {
        match self {
            GameEngine::Uno(g) => g.hand_of(id).map(|h| h.to_vec()),
            _ => None,
        }
    }

    /// Race-game accessor for kind-specific verbs.
    pub fn as_ludo_mut(&mut self) -> Result<&mut LudoGame, GameError> {
        match self {
            GameEngine::Ludo(g) => Ok(g),
            _ => Err(GameError::invalid("not a ludo game")),
        }
    }

    /// Trading-game accessor for kind-specific verbs.
    pub fn as_monopoly_mut(&mut self) -> Result<&mut MonopolyGame, GameError> {
        match self {
            GameEngine::Monopoly(g) => Ok(g),
            _ => Err(GameError::invalid("not a monopoly game")),
        }
    }

    /// Card-game accessor for kind-specific verbs.
    pub fn as_uno_mut(&mut self) -> Result<&mut UnoGame, GameError> {
        match self {
            GameEngine::Uno(g) => Ok(g),
            _ => Err(GameError::invalid("not an uno game")),
        }
    }
}
