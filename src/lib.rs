//! # Tabletop Arena Server
//!
//! Multiplayer session server for turn-based tabletop games, played
//! over WebSockets against an authoritative server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TABLETOP ARENA SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Game logic (pure, seeded randomness)      │
//! │  ├── rng.rs      - Xorshift128+ dice and deck shuffling      │
//! │  ├── engine.rs   - Closed dispatch over the game kinds       │
//! │  ├── ludo.rs     - Race-and-capture game                     │
//! │  ├── monopoly.rs - Property-trading game                     │
//! │  └── uno.rs      - Shedding card game                        │
//! │                                                              │
//! │  network/        - Networking and session plumbing           │
//! │  ├── server.rs   - WebSocket server and message dispatch     │
//! │  ├── protocol.rs - Wire message types                        │
//! │  ├── session.rs  - Session registry and broadcasting         │
//! │  ├── clock.rs    - Turn deadlines with stale-token guards    │
//! │  └── auth.rs     - JWT validation                            │
//! │                                                              │
//! │  storage.rs      - Snapshot and reconnect-pointer seams      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! A session's `RwLock` is the single serialization point: player
//! actions and turn-clock expiries mutate game state one at a time,
//! so every broadcast projection reflects a consistent state. Engines
//! validate before they mutate; a rejected action leaves the game
//! exactly as it was.
//!
//! Disconnects never cost a seat. The player-to-session index
//! survives the socket, and reauthenticating rebinds the new
//! connection to the old seat mid-game.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use game::{GameEngine, GameError, GameKind, GameStatus, PlayerId, PlayerProfile, PublicState};
pub use network::{GameServer, ServerConfig, SessionRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
