//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication, plus the
//! session registry, the turn clock, and JWT validation. Everything
//! game-rule-shaped lives in `game/`; this layer only authenticates,
//! routes, and broadcasts.

pub mod auth;
pub mod clock;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use clock::{TurnClock, TurnToken};
pub use protocol::{ClientMessage, ErrorCode, GameListing, ServerMessage};
pub use server::{ConnectionContext, GameServer, GameServerError, ServerConfig};
pub use session::{GameSession, LeaveOutcome, SessionError, SessionId, SessionRegistry};
