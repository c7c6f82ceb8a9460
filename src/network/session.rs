//! Session Management
//!
//! A [`GameSession`] pairs one [`GameEngine`] with the live connection
//! bindings of its players and a [`TurnClock`]. The session's
//! `RwLock` is the serialization point: player actions and clock
//! expiries all mutate under the same write lock, one at a time.
//!
//! The [`SessionRegistry`] is the in-memory directory of sessions,
//! with a player-to-session index for reconnects. A session is
//! evicted when its last player leaves; disconnects only clear the
//! sender binding and keep the seat.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::game::{GameEngine, GameKind, GameStatus, PlayerId, PlayerProfile};
use crate::network::clock::TurnClock;
use crate::network::protocol::{GameListing, ServerMessage};

/// Session identifier (UUID bytes).
pub type SessionId = [u8; 16];

/// Format a session id for the wire and for logs.
pub fn session_id_string(id: &SessionId) -> String {
    uuid::Uuid::from_bytes(*id).to_string()
}

/// Parse a session id from its wire form.
pub fn parse_session_id(s: &str) -> Option<SessionId> {
    uuid::Uuid::parse_str(s).ok().map(|u| u.into_bytes())
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// No session with that id.
    #[error("session not found")]
    NotFound,

    /// Session has no free seat.
    #[error("session is full")]
    Full,

    /// Player is already seated in a session.
    #[error("already in a session")]
    AlreadyInSession,

    /// Only the host may start the game.
    #[error("only the host can start the game")]
    NotHost,

    /// The underlying game rejected the operation.
    #[error(transparent)]
    Game(#[from] crate::game::GameError),
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// One session: engine, connection bindings, turn clock.
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// The game state machine.
    pub engine: GameEngine,
    /// Turn deadline state.
    pub clock: TurnClock,
    /// Live message channels, one per connected player. A seated
    /// player with no entry here is disconnected.
    senders: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
}

impl GameSession {
    /// Create a session around a fresh engine.
    pub fn new(id: SessionId, kind: GameKind) -> Self {
        Self {
            id,
            engine: GameEngine::new(kind),
            clock: TurnClock::new(kind.turn_duration()),
            senders: BTreeMap::new(),
        }
    }

    /// Bind (or rebind) a player's live connection. Game state is
    /// untouched, so a reconnect lands exactly where it left off.
    pub fn bind(&mut self, player: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        self.senders.insert(player, sender);
    }

    /// Clear a player's connection binding, keeping their seat.
    pub fn unbind(&mut self, player: PlayerId) -> bool {
        self.senders.remove(&player).is_some()
    }

    /// Whether a player currently has a live connection.
    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.senders.contains_key(&player)
    }

    /// Drop a player's seat and binding together (explicit leave).
    pub fn evict_player(&mut self, player: PlayerId) -> bool {
        self.senders.remove(&player);
        self.engine.remove_player(player)
    }

    /// Send a message to every connected player.
    pub async fn broadcast(&self, message: ServerMessage) {
        for sender in self.senders.values() {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Send a message to one player, if connected.
    pub async fn send_to(&self, player: PlayerId, message: ServerMessage) {
        if let Some(sender) = self.senders.get(&player) {
            let _ = sender.send(message).await;
        }
    }

    /// Recompute and deliver the public projection to everyone, plus
    /// one private hand per player for games with hidden information.
    /// The projection carries the current turn deadline so clients can
    /// render a countdown.
    pub async fn broadcast_state(&self) {
        let state = ServerMessage::GameState {
            session_id: session_id_string(&self.id),
            state: self.engine.public_state(),
            turn_deadline: self.clock.deadline(),
        };
        self.broadcast(state).await;

        for player in self.engine.player_ids() {
            if let Some(hand) = self.engine.private_hand(player) {
                self.send_to(player, ServerMessage::UnoHand { hand }).await;
            }
        }
    }

    /// Listing entry for the lobby browser.
    pub fn listing(&self) -> GameListing {
        GameListing {
            session_id: session_id_string(&self.id),
            kind: self.engine.kind(),
            host: self.engine.host_name().unwrap_or_default().to_string(),
            status: self.engine.status(),
            player_count: self.engine.player_count(),
            max_players: self.engine.capacity(),
        }
    }
}

// =============================================================================
// TURN CLOCK DRIVER
// =============================================================================

/// Re-arm the turn clock under the caller's write guard and spawn the
/// expiry task. Arming before the caller broadcasts means the pushed
/// projection carries the fresh deadline, not the previous one.
///
/// The task sleeps for the clock duration, then revalidates its token
/// under the session write lock. Any action that re-arms or disarms
/// the clock in the meantime makes the token stale and the wakeup a
/// no-op, so exactly one forced default fires per expiry. While the
/// token stays valid the task keeps forcing defaults turn after turn.
pub fn reset_turn_clock_locked(arc: &Arc<RwLock<GameSession>>, session: &mut GameSession) {
    if session.engine.status() != GameStatus::Playing {
        session.clock.disarm();
        return;
    }
    let mut token = session.clock.arm();
    let duration = session.clock.duration();

    let session = Arc::clone(arc);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(duration).await;

            let mut s = session.write().await;
            if !s.clock.is_current(token) || s.engine.status() != GameStatus::Playing {
                return;
            }

            let skipped = s.engine.current_player();
            s.engine.apply_timeout_default();
            token = s.clock.arm();

            info!(
                session_id = %session_id_string(&s.id),
                player = ?skipped.map(|p| p.to_uuid_string()),
                "turn clock expired, default action applied"
            );

            if let Some(skipped) = skipped {
                s.broadcast(ServerMessage::TurnTimeout {
                    player_id: skipped.to_uuid_string(),
                })
                .await;
            }
            s.broadcast_state().await;
        }
    });
}

/// [`reset_turn_clock_locked`] for callers not already holding the
/// session write lock.
pub async fn reset_turn_clock(session: &Arc<RwLock<GameSession>>) {
    let mut s = session.write().await;
    reset_turn_clock_locked(session, &mut s);
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// What became of a session after a player left it.
pub enum LeaveOutcome {
    /// Other players remain; the session stays registered.
    Survives(Arc<RwLock<GameSession>>),
    /// The last player left; the session was removed from the
    /// registry. Returned so the caller can archive it.
    Evicted(Arc<RwLock<GameSession>>),
}

/// In-memory directory of all sessions.
pub struct SessionRegistry {
    /// Registered sessions.
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<GameSession>>>>,
    /// Player to session mapping. One session per player.
    player_sessions: RwLock<BTreeMap<PlayerId, SessionId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            player_sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a session with the requester seated as host.
    pub async fn create(
        &self,
        kind: GameKind,
        profile: PlayerProfile,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(SessionId, Arc<RwLock<GameSession>>), SessionError> {
        if self.session_of(profile.id).await.is_some() {
            return Err(SessionError::AlreadyInSession);
        }

        let id = uuid::Uuid::new_v4().into_bytes();
        let mut session = GameSession::new(id, kind);
        session
            .engine
            .add_player(profile.clone())
            .map_err(SessionError::Game)?;
        session.bind(profile.id, sender);

        let arc = Arc::new(RwLock::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&arc));
        self.player_sessions.write().await.insert(profile.id, id);

        info!(
            session_id = %session_id_string(&id),
            kind = kind.as_str(),
            host = %profile.id.to_uuid_string(),
            "session created"
        );
        Ok((id, arc))
    }

    /// Join a specific waiting session.
    pub async fn join(
        &self,
        id: SessionId,
        profile: PlayerProfile,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<RwLock<GameSession>>, SessionError> {
        if self.session_of(profile.id).await.is_some() {
            return Err(SessionError::AlreadyInSession);
        }
        let arc = self.get(&id).await.ok_or(SessionError::NotFound)?;

        {
            let mut session = arc.write().await;
            if session.engine.is_full() {
                return Err(SessionError::Full);
            }
            session
                .engine
                .add_player(profile.clone())
                .map_err(SessionError::Game)?;
            session.bind(profile.id, sender);
        }
        self.player_sessions.write().await.insert(profile.id, id);

        debug!(
            session_id = %session_id_string(&id),
            player = %profile.id.to_uuid_string(),
            "player joined session"
        );
        Ok(arc)
    }

    /// Join the first open session of the kind, or create a new one.
    /// The flag is true when an existing session was joined.
    pub async fn quick_match(
        &self,
        kind: GameKind,
        profile: PlayerProfile,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(SessionId, Arc<RwLock<GameSession>>, bool), SessionError> {
        if self.session_of(profile.id).await.is_some() {
            return Err(SessionError::AlreadyInSession);
        }

        let candidate = {
            let sessions = self.sessions.read().await;
            let mut found = None;
            for (id, arc) in sessions.iter() {
                let session = arc.read().await;
                if session.engine.kind() == kind
                    && session.engine.status() == GameStatus::Waiting
                    && !session.engine.is_full()
                {
                    found = Some(*id);
                    break;
                }
            }
            found
        };

        match candidate {
            Some(id) => match self.join(id, profile.clone(), sender.clone()).await {
                Ok(arc) => Ok((id, arc, true)),
                // The scanned session filled up or started in between.
                Err(SessionError::Full) | Err(SessionError::NotFound) => {
                    let (id, arc) = self.create(kind, profile, sender).await?;
                    Ok((id, arc, false))
                }
                Err(e) => Err(e),
            },
            None => {
                let (id, arc) = self.create(kind, profile, sender).await?;
                Ok((id, arc, false))
            }
        }
    }

    /// Remove a player from their session. Evicts the session when it
    /// becomes empty; otherwise the surviving session's turn clock is
    /// re-armed so the next player gets a full turn window.
    pub async fn leave(&self, player: PlayerId) -> Option<(SessionId, LeaveOutcome)> {
        let id = self.player_sessions.write().await.remove(&player)?;
        let arc = self.get(&id).await?;

        let now_empty = {
            let mut session = arc.write().await;
            session.evict_player(player);
            let empty = session.engine.player_count() == 0;
            if empty {
                // Stale tokens make any in-flight expiry task exit.
                session.clock.disarm();
            } else {
                reset_turn_clock_locked(&arc, &mut session);
            }
            empty
        };

        if now_empty {
            self.sessions.write().await.remove(&id);
            info!(session_id = %session_id_string(&id), "empty session evicted");
            Some((id, LeaveOutcome::Evicted(arc)))
        } else {
            Some((id, LeaveOutcome::Survives(arc)))
        }
    }

    /// Look up a session by id.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<RwLock<GameSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// The session a player is seated in, if any.
    pub async fn session_of(&self, player: PlayerId) -> Option<Arc<RwLock<GameSession>>> {
        let id = *self.player_sessions.read().await.get(&player)?;
        self.get(&id).await
    }

    /// Rebind a reconnecting player's connection to their existing
    /// seat, without touching game state.
    pub async fn rebind(
        &self,
        player: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Option<Arc<RwLock<GameSession>>> {
        let arc = self.session_of(player).await?;
        {
            let mut session = arc.write().await;
            if !session.engine.has_player(player) {
                warn!(
                    player = %player.to_uuid_string(),
                    "player index pointed at a session without their seat"
                );
                return None;
            }
            session.bind(player, sender);
        }
        Some(arc)
    }

    /// Listing of every waiting session, for the lobby browser.
    pub async fn waiting_listings(&self) -> Vec<GameListing> {
        let sessions = self.sessions.read().await;
        let mut listings = Vec::new();
        for arc in sessions.values() {
            let session = arc.read().await;
            if session.engine.status() == GameStatus::Waiting {
                listings.push(session.listing());
            }
        }
        listings
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
