//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections. Accepts
//! connections, authenticates them, and routes game actions into the
//! session registry.
//!
//! Every connection task owns an explicit [`ConnectionContext`]
//! holding the authenticated identity and the bound session id; no
//! handler reads ambient per-connection state. A closed socket only
//! clears the session's sender binding - the player's seat survives
//! until an explicit leave.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::rng::derive_session_seed;
use crate::game::{GameKind, GameStatus, PlayerId, PlayerProfile, PublicState};
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{
    CaptureInfo, ClientMessage, ErrorCode, LandingInfo, ServerMessage,
};
use crate::network::session::{
    parse_session_id, reset_turn_clock_locked, session_id_string, GameSession, LeaveOutcome,
    SessionError, SessionId, SessionRegistry,
};
use crate::storage::{
    ActiveSessionStore, MemoryActiveSessionStore, MemorySnapshotStore, SnapshotStore,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(e) => warn!("ignoring invalid BIND_ADDR {:?}: {}", addr, e),
            }
        }
        if let Ok(max) = std::env::var("MAX_CONNECTIONS") {
            if let Ok(parsed) = max.parse() {
                config.max_connections = parsed;
            }
        }
        config
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-connection state, threaded through every handler.
#[derive(Debug, Default, Clone)]
pub struct ConnectionContext {
    /// Authenticated identity, set by a successful `authenticate`.
    pub profile: Option<PlayerProfile>,
    /// Session this connection is bound to, if any.
    pub session_id: Option<SessionId>,
}

/// Shared server state behind the accept loop.
struct ServerState {
    config: ServerConfig,
    auth: AuthConfig,
    registry: SessionRegistry,
    snapshots: Arc<dyn SnapshotStore>,
    active: Arc<dyn ActiveSessionStore>,
    /// Connected clients, for the lobby broadcast and the connection
    /// limit.
    clients: RwLock<BTreeMap<SocketAddr, mpsc::Sender<ServerMessage>>>,
}

/// The WebSocket server.
pub struct GameServer {
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server with in-memory stores.
    pub fn new(config: ServerConfig, auth: AuthConfig) -> Self {
        Self::with_stores(
            config,
            auth,
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(MemoryActiveSessionStore::new()),
        )
    }

    /// Create a server with explicit persistence backends.
    pub fn with_stores(
        config: ServerConfig,
        auth: AuthConfig,
        snapshots: Arc<dyn SnapshotStore>,
        active: Arc<dyn ActiveSessionStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(ServerState {
                config,
                auth,
                registry: SessionRegistry::new(),
                snapshots,
                active,
                clients: RwLock::new(BTreeMap::new()),
            }),
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        info!("server listening on {}", self.state.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let connected = self.state.clients.read().await.len();
                            if connected >= self.state.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.state.registry.session_count().await
    }

    /// Handle a new WebSocket connection on its own task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = Arc::clone(&self.state);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            state.clients.write().await.insert(addr, msg_tx.clone());

            // Outbound pump: session broadcasts and direct replies
            // funnel through one channel per connection.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut ctx = ConnectionContext::default();
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error {
                                            code: ErrorCode::InvalidAction,
                                            message: "invalid message format".to_string(),
                                        }).await;
                                        continue;
                                    }
                                };
                                state.handle_message(&mut ctx, client_msg, &msg_tx).await;
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                // tungstenite answers pings itself; log only.
                                debug!("ping from {} ({} bytes)", addr, payload.len());
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            state.clients.write().await.remove(&addr);

            // A dropped socket keeps the seat: clear the binding only,
            // so the player can reauthenticate and resume.
            if let Some(profile) = ctx.profile {
                if let Some(session) = state.registry.session_of(profile.id).await {
                    session.write().await.unbind(profile.id);
                    info!(
                        player = %profile.id.to_uuid_string(),
                        "connection lost, seat retained for reconnect"
                    );
                }
            }
        });
    }
}

impl ServerState {
    /// Route one parsed client message.
    async fn handle_message(
        &self,
        ctx: &mut ConnectionContext,
        msg: ClientMessage,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Authenticate { token } => self.handle_authenticate(ctx, &token, tx).await,
            ClientMessage::CreateGame { kind } => self.handle_create(ctx, kind, tx).await,
            ClientMessage::JoinGame { session_id } => self.handle_join(ctx, &session_id, tx).await,
            ClientMessage::QuickMatch { kind } => self.handle_quick_match(ctx, kind, tx).await,
            ClientMessage::StartGame => self.handle_start(ctx, tx).await,
            ClientMessage::RollDice => self.handle_roll_dice(ctx, tx).await,
            ClientMessage::MovePiece { piece } => self.handle_move_piece(ctx, piece, tx).await,
            ClientMessage::MonopolyRoll => self.handle_monopoly_roll(ctx, tx).await,
            ClientMessage::MonopolyBuy { space } => self.handle_monopoly_buy(ctx, space, tx).await,
            ClientMessage::MonopolyBuyBuilding { space } => {
                self.handle_monopoly_buy_building(ctx, space, tx).await
            }
            ClientMessage::UnoPlayCard {
                card_index,
                chosen_color,
            } => self.handle_uno_play(ctx, card_index, chosen_color, tx).await,
            ClientMessage::UnoDrawCard => self.handle_uno_draw(ctx, tx).await,
            ClientMessage::UnoCallUno => self.handle_uno_call(ctx, tx).await,
            ClientMessage::LeaveGame => self.handle_leave(ctx, tx).await,
            ClientMessage::ListGames => {
                let games = self.registry.waiting_listings().await;
                let _ = tx.send(ServerMessage::GamesUpdated { games }).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = tx.send(ServerMessage::Pong { timestamp }).await;
            }
        }
    }

    async fn handle_authenticate(
        &self,
        ctx: &mut ConnectionContext,
        token: &str,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let claims = match validate_token(token, &self.auth) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("authentication failed: {}", e);
                let _ = tx
                    .send(ServerMessage::AuthError {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let profile = claims.profile();

        // A connection re-authenticating as a different subject drops
        // its previous identity's binding first; the old seat itself
        // survives for that identity's own reconnect.
        if let Some(previous) = ctx.profile.take() {
            if previous.id != profile.id {
                if let Some(arc) = self.registry.session_of(previous.id).await {
                    arc.write().await.unbind(previous.id);
                }
                ctx.session_id = None;
            }
        }

        info!(
            player = %profile.id.to_uuid_string(),
            name = %profile.display_name,
            "player authenticated"
        );
        let _ = tx
            .send(ServerMessage::Authenticated {
                player_id: profile.id.to_uuid_string(),
                display_name: profile.display_name.clone(),
            })
            .await;

        // Reconnect: if this identity still holds a seat anywhere,
        // rebind it to this connection and surface the current state.
        // With no live session, fall back to the reconnect hint and
        // surface the archived snapshot instead.
        if let Some(arc) = self.registry.rebind(profile.id, tx.clone()).await {
            let session = arc.read().await;
            ctx.session_id = Some(session.id);
            let _ = tx
                .send(ServerMessage::GameState {
                    session_id: session_id_string(&session.id),
                    state: session.engine.public_state(),
                    turn_deadline: session.clock.deadline(),
                })
                .await;
            if let Some(hand) = session.engine.private_hand(profile.id) {
                let _ = tx.send(ServerMessage::UnoHand { hand }).await;
            }
            info!(
                player = %profile.id.to_uuid_string(),
                session_id = %session_id_string(&session.id),
                "reconnected to existing session"
            );
        } else if let Some(session_id) = self.active.get_active_session(profile.id) {
            self.restore_archived_state(profile.id, session_id, tx).await;
        }
        ctx.profile = Some(profile);
    }

    async fn handle_create(
        &self,
        ctx: &mut ConnectionContext,
        kind: GameKind,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(profile) = self.authed(ctx, tx).await else {
            return;
        };
        match self.registry.create(kind, profile.clone(), tx.clone()).await {
            Ok((id, arc)) => {
                ctx.session_id = Some(id);
                self.active.set_active_session(profile.id, Some(id));
                let state = arc.read().await.engine.public_state();
                let _ = tx
                    .send(ServerMessage::GameCreated {
                        session_id: session_id_string(&id),
                        state,
                    })
                    .await;
                self.broadcast_lobby_listings().await;
            }
            Err(e) => self.send_session_error(tx, &e).await,
        }
    }

    async fn handle_join(
        &self,
        ctx: &mut ConnectionContext,
        session_id: &str,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(profile) = self.authed(ctx, tx).await else {
            return;
        };
        let Some(id) = parse_session_id(session_id) else {
            let _ = tx
                .send(ServerMessage::Error {
                    code: ErrorCode::SessionNotFound,
                    message: format!("malformed session id: {}", session_id),
                })
                .await;
            return;
        };

        match self.registry.join(id, profile.clone(), tx.clone()).await {
            Ok(arc) => {
                ctx.session_id = Some(id);
                self.active.set_active_session(profile.id, Some(id));
                arc.read().await.broadcast_state().await;
                self.broadcast_lobby_listings().await;
            }
            Err(e) => self.send_session_error(tx, &e).await,
        }
    }

    async fn handle_quick_match(
        &self,
        ctx: &mut ConnectionContext,
        kind: GameKind,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(profile) = self.authed(ctx, tx).await else {
            return;
        };
        match self
            .registry
            .quick_match(kind, profile.clone(), tx.clone())
            .await
        {
            Ok((id, arc, joined)) => {
                ctx.session_id = Some(id);
                self.active.set_active_session(profile.id, Some(id));
                if joined {
                    arc.read().await.broadcast_state().await;
                } else {
                    let state = arc.read().await.engine.public_state();
                    let _ = tx
                        .send(ServerMessage::GameCreated {
                            session_id: session_id_string(&id),
                            state,
                        })
                        .await;
                }
                self.broadcast_lobby_listings().await;
            }
            Err(e) => self.send_session_error(tx, &e).await,
        }
    }

    async fn handle_start(&self, ctx: &mut ConnectionContext, tx: &mpsc::Sender<ServerMessage>) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            if session.engine.host() != Some(profile.id) {
                self.send_session_error(tx, &SessionError::NotHost).await;
                return;
            }

            let player_ids: Vec<[u8; 16]> = session
                .engine
                .player_ids()
                .iter()
                .map(|p| *p.as_bytes())
                .collect();
            let seed = derive_session_seed(&session.id, &player_ids);

            if let Err(e) = session.engine.start(seed) {
                self.send_session_error(tx, &SessionError::Game(e)).await;
                return;
            }
            info!(
                session_id = %session_id_string(&session.id),
                kind = session.engine.kind().as_str(),
                players = session.engine.player_count(),
                "game started"
            );

            reset_turn_clock_locked(&arc, &mut session);
            let started = ServerMessage::GameStarted {
                session_id: session_id_string(&session.id),
                state: session.engine.public_state(),
                turn_deadline: session.clock.deadline(),
            };
            session.broadcast(started).await;
            for player in session.engine.player_ids() {
                if let Some(hand) = session.engine.private_hand(player) {
                    session.send_to(player, ServerMessage::UnoHand { hand }).await;
                }
            }
        }

        self.broadcast_lobby_listings().await;
    }

    async fn handle_roll_dice(&self, ctx: &mut ConnectionContext, tx: &mpsc::Sender<ServerMessage>) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            let result = session
                .engine
                .as_ludo_mut()
                .and_then(|g| g.roll(profile.id));
            match result {
                Ok(outcome) => {
                    session
                        .broadcast(ServerMessage::DiceRolled {
                            player_id: profile.id.to_uuid_string(),
                            value: outcome.value,
                            auto_passed: outcome.auto_passed,
                        })
                        .await;
                    reset_turn_clock_locked(&arc, &mut session);
                    session.broadcast_state().await;
                }
                Err(e) => {
                    self.send_invalid_move(tx, &e).await;
                }
            }
        }
    }

    async fn handle_move_piece(
        &self,
        ctx: &mut ConnectionContext,
        piece: usize,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            let result = session
                .engine
                .as_ludo_mut()
                .and_then(|g| g.move_piece(profile.id, piece));
            match result {
                Ok(outcome) => {
                    session
                        .broadcast(ServerMessage::PieceMoved {
                            player_id: profile.id.to_uuid_string(),
                            piece: outcome.piece,
                            new_pos: outcome.new_pos,
                            captured: outcome.captured.map(|c| CaptureInfo {
                                player_index: c.player_index,
                                piece: c.piece,
                            }),
                            turn_repeats: outcome.turn_repeats,
                        })
                        .await;
                    if let Some(winner) = outcome.winner {
                        self.finish_game(&mut session, winner).await;
                    }
                    reset_turn_clock_locked(&arc, &mut session);
                    session.broadcast_state().await;
                }
                Err(e) => {
                    self.send_invalid_move(tx, &e).await;
                }
            }
        }
    }

    async fn handle_monopoly_roll(
        &self,
        ctx: &mut ConnectionContext,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            let result = session
                .engine
                .as_monopoly_mut()
                .and_then(|g| g.roll_and_move(profile.id));
            match result {
                Ok(outcome) => {
                    session
                        .broadcast(ServerMessage::MonopolyMoved {
                            player_id: profile.id.to_uuid_string(),
                            dice: outcome.dice,
                            new_position: outcome.new_position,
                            passed_go: outcome.passed_go,
                            landing: LandingInfo::from(outcome.landing),
                            turn_repeats: outcome.turn_repeats,
                        })
                        .await;
                    if let Some(winner) = outcome.winner {
                        self.finish_game(&mut session, winner).await;
                    }
                    reset_turn_clock_locked(&arc, &mut session);
                    session.broadcast_state().await;
                }
                Err(e) => {
                    self.send_invalid_move(tx, &e).await;
                }
            }
        }
    }

    async fn handle_monopoly_buy(
        &self,
        ctx: &mut ConnectionContext,
        space: usize,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        let mut session = arc.write().await;
        let result = session
            .engine
            .as_monopoly_mut()
            .and_then(|g| g.buy(profile.id, space));
        match result {
            Ok(()) => {
                session
                    .broadcast(ServerMessage::MonopolyBought {
                        player_id: profile.id.to_uuid_string(),
                        space,
                    })
                    .await;
                session.broadcast_state().await;
            }
            Err(e) => self.send_invalid_move(tx, &e).await,
        }
    }

    async fn handle_monopoly_buy_building(
        &self,
        ctx: &mut ConnectionContext,
        space: usize,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        let mut session = arc.write().await;
        let result = session
            .engine
            .as_monopoly_mut()
            .and_then(|g| g.buy_building(profile.id, space));
        match result {
            Ok(houses) => {
                session
                    .broadcast(ServerMessage::MonopolyBuildingBought {
                        player_id: profile.id.to_uuid_string(),
                        space,
                        houses,
                    })
                    .await;
                session.broadcast_state().await;
            }
            Err(e) => self.send_invalid_move(tx, &e).await,
        }
    }

    async fn handle_uno_play(
        &self,
        ctx: &mut ConnectionContext,
        card_index: usize,
        chosen_color: Option<crate::game::uno::CardColor>,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            let result = session
                .engine
                .as_uno_mut()
                .and_then(|g| g.play_card(profile.id, card_index, chosen_color));
            match result {
                Ok(outcome) => {
                    session
                        .broadcast(ServerMessage::UnoCardPlayed {
                            player_id: profile.id.to_uuid_string(),
                            card: outcome.card,
                            color: outcome.color,
                            forced_draw: outcome.forced_draw,
                            skipped: outcome.skipped,
                        })
                        .await;
                    if let Some(winner) = outcome.winner {
                        self.finish_game(&mut session, winner).await;
                    }
                    reset_turn_clock_locked(&arc, &mut session);
                    session.broadcast_state().await;
                }
                Err(e) => {
                    self.send_invalid_move(tx, &e).await;
                }
            }
        }
    }

    async fn handle_uno_draw(&self, ctx: &mut ConnectionContext, tx: &mpsc::Sender<ServerMessage>) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        {
            let mut session = arc.write().await;
            let result = session
                .engine
                .as_uno_mut()
                .and_then(|g| g.draw_card(profile.id));
            match result {
                Ok(outcome) => {
                    session
                        .broadcast(ServerMessage::UnoPlayerDrew {
                            player_id: profile.id.to_uuid_string(),
                            turn_passed: outcome.turn_passed,
                        })
                        .await;
                    reset_turn_clock_locked(&arc, &mut session);
                    session.broadcast_state().await;
                }
                Err(e) => {
                    self.send_invalid_move(tx, &e).await;
                }
            }
        }
    }

    async fn handle_uno_call(&self, ctx: &mut ConnectionContext, tx: &mpsc::Sender<ServerMessage>) {
        let Some((profile, arc)) = self.bound_session(ctx, tx).await else {
            return;
        };

        let mut session = arc.write().await;
        let result = session
            .engine
            .as_uno_mut()
            .and_then(|g| g.call_uno(profile.id));
        match result {
            Ok(()) => {
                session
                    .broadcast(ServerMessage::UnoCalled {
                        player_id: profile.id.to_uuid_string(),
                    })
                    .await;
                session.broadcast_state().await;
            }
            Err(e) => self.send_invalid_move(tx, &e).await,
        }
    }

    async fn handle_leave(&self, ctx: &mut ConnectionContext, tx: &mpsc::Sender<ServerMessage>) {
        let Some(profile) = self.authed(ctx, tx).await else {
            return;
        };

        match self.registry.leave(profile.id).await {
            Some((id, outcome)) => {
                info!(
                    session_id = %session_id_string(&id),
                    player = %profile.id.to_uuid_string(),
                    "player left session"
                );
                match outcome {
                    LeaveOutcome::Survives(arc) => {
                        let session = arc.read().await;
                        session
                            .broadcast(ServerMessage::PlayerLeft {
                                player_id: profile.id.to_uuid_string(),
                            })
                            .await;
                        session.broadcast_state().await;
                    }
                    LeaveOutcome::Evicted(arc) => {
                        // An abandoned mid-game session is archived as
                        // saved rather than silently dropped.
                        let mut session = arc.write().await;
                        if session.engine.status() == GameStatus::Playing {
                            session.engine.suspend();
                            self.archive_snapshot(&session);
                        }
                    }
                }
                ctx.session_id = None;
                self.active.set_active_session(profile.id, None);
                self.broadcast_lobby_listings().await;
            }
            None => {
                let _ = tx
                    .send(ServerMessage::Error {
                        code: ErrorCode::SessionNotFound,
                        message: "not in a session".to_string(),
                    })
                    .await;
            }
        }
    }

    /// Archive the finished game and announce the winner. The caller
    /// holds the session write lock.
    async fn finish_game(&self, session: &mut GameSession, winner: PlayerId) {
        session.clock.disarm();
        self.archive_snapshot(session);

        info!(
            session_id = %session_id_string(&session.id),
            winner = %winner.to_uuid_string(),
            "game over"
        );
        session
            .broadcast(ServerMessage::GameOver {
                winner_id: winner.to_uuid_string(),
                state: session.engine.public_state(),
            })
            .await;
    }

    /// Persist the session's public projection through the snapshot
    /// store. Failures are logged; play never blocks on storage.
    fn archive_snapshot(&self, session: &GameSession) {
        match serde_json::to_value(session.engine.public_state()) {
            Ok(snapshot) => {
                if let Err(e) = self.snapshots.save(session.id, snapshot) {
                    warn!(
                        session_id = %session_id_string(&session.id),
                        "failed to archive session snapshot: {}", e
                    );
                }
            }
            Err(e) => warn!("failed to encode session snapshot: {}", e),
        }
    }

    /// Surface an archived snapshot to a reconnecting player whose
    /// live session no longer exists.
    async fn restore_archived_state(
        &self,
        player: PlayerId,
        session_id: SessionId,
        tx: &mpsc::Sender<ServerMessage>,
    ) {
        match self.snapshots.load(session_id) {
            Ok(Some(snapshot)) => match serde_json::from_value::<PublicState>(snapshot) {
                Ok(state) => {
                    let _ = tx
                        .send(ServerMessage::GameState {
                            session_id: session_id_string(&session_id),
                            state,
                            turn_deadline: None,
                        })
                        .await;
                    info!(
                        player = %player.to_uuid_string(),
                        session_id = %session_id_string(&session_id),
                        "restored archived session state"
                    );
                }
                Err(e) => warn!(
                    session_id = %session_id_string(&session_id),
                    "archived snapshot is malformed: {}", e
                ),
            },
            Ok(None) => {}
            Err(e) => warn!(
                session_id = %session_id_string(&session_id),
                "failed to load archived snapshot: {}", e
            ),
        }
    }

    /// The authenticated profile, or an error to the connection.
    async fn authed(
        &self,
        ctx: &ConnectionContext,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Option<PlayerProfile> {
        match ctx.profile {
            Some(ref profile) => Some(profile.clone()),
            None => {
                let _ = tx
                    .send(ServerMessage::Error {
                        code: ErrorCode::AuthRequired,
                        message: "authenticate first".to_string(),
                    })
                    .await;
                None
            }
        }
    }

    /// The authenticated profile plus their session, or an error to
    /// the connection.
    async fn bound_session(
        &self,
        ctx: &ConnectionContext,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Option<(PlayerProfile, Arc<RwLock<GameSession>>)> {
        let profile = self.authed(ctx, tx).await?;
        match self.registry.session_of(profile.id).await {
            Some(arc) => Some((profile, arc)),
            None => {
                let _ = tx
                    .send(ServerMessage::Error {
                        code: ErrorCode::SessionNotFound,
                        message: "not in a session".to_string(),
                    })
                    .await;
                None
            }
        }
    }

    /// Game-rule rejection, sent only to the acting connection.
    async fn send_invalid_move(
        &self,
        tx: &mpsc::Sender<ServerMessage>,
        err: &crate::game::GameError,
    ) {
        let _ = tx
            .send(ServerMessage::InvalidMove {
                message: err.to_string(),
            })
            .await;
    }

    /// Session-level rejection, sent only to the acting connection.
    async fn send_session_error(&self, tx: &mpsc::Sender<ServerMessage>, err: &SessionError) {
        let code = match err {
            SessionError::NotFound => ErrorCode::SessionNotFound,
            SessionError::Full => ErrorCode::SessionFull,
            SessionError::AlreadyInSession | SessionError::NotHost => ErrorCode::InvalidAction,
            SessionError::Game(g) => ErrorCode::from_game_error(g),
        };
        let _ = tx
            .send(ServerMessage::Error {
                code,
                message: err.to_string(),
            })
            .await;
    }

    /// Push the waiting-session listing to every connected client.
    async fn broadcast_lobby_listings(&self) {
        let games = self.registry.waiting_listings().await;
        let msg = ServerMessage::GamesUpdated { games };
        let clients = self.clients.read().await;
        for sender in clients.values() {
            let _ = sender.send(msg.clone()).await;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret-key-256-bits-long!!";

    fn test_state() -> Arc<ServerState> {
        let server = GameServer::new(
            ServerConfig::default(),
            AuthConfig {
                secret: Some(SECRET.into()),
                ..Default::default()
            },
        );
        Arc::clone(&server.state)
    }

    fn token_for(sub: &str, name: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = crate::network::auth::TokenClaims {
            sub: sub.into(),
            name: Some(name.into()),
            preferred_username: None,
            exp: now + 3600,
            iat: now,
            iss: None,
            aud: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn authed_ctx(
        state: &ServerState,
        sub: &str,
        name: &str,
    ) -> (
        ConnectionContext,
        mpsc::Sender<ServerMessage>,
        mpsc::Receiver<ServerMessage>,
    ) {
        let (tx, mut rx) = mpsc::channel(64);
        let mut ctx = ConnectionContext::default();
        state
            .handle_message(
                &mut ctx,
                ClientMessage::Authenticate {
                    token: token_for(sub, name),
                },
                &tx,
            )
            .await;
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Authenticated { .. }));
        (ctx, tx, rx)
    }

    /// Drain until a matching message arrives (skipping lobby updates
    /// and state refreshes).
    async fn expect<F: Fn(&ServerMessage) -> bool>(
        rx: &mut mpsc::Receiver<ServerMessage>,
        pred: F,
    ) -> ServerMessage {
        for _ in 0..32 {
            let msg = rx.recv().await.expect("channel closed while waiting");
            if pred(&msg) {
                return msg;
            }
        }
        panic!("expected message not received");
    }

    #[tokio::test]
    async fn test_server_creation_and_shutdown() {
        let server = GameServer::new(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                ..Default::default()
            },
            AuthConfig::default(),
        );
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_unauthenticated_requests_rejected() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        let mut ctx = ConnectionContext::default();

        state
            .handle_message(
                &mut ctx,
                ClientMessage::CreateGame {
                    kind: GameKind::Ludo,
                },
                &tx,
            )
            .await;
        let msg = rx.recv().await.unwrap();
        let ServerMessage::Error { code, .. } = msg else {
            panic!("expected an error");
        };
        assert_eq!(code, ErrorCode::AuthRequired);
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        let mut ctx = ConnectionContext::default();

        state
            .handle_message(
                &mut ctx,
                ClientMessage::Authenticate {
                    token: "garbage".into(),
                },
                &tx,
            )
            .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::AuthError { .. }
        ));
        assert!(ctx.profile.is_none());
    }

    #[tokio::test]
    async fn test_create_start_and_roll_flow() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, _bob_tx, mut bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::CreateGame {
                    kind: GameKind::Ludo,
                },
                &alice_tx,
            )
            .await;
        let msg = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameCreated { .. })
        })
        .await;
        let ServerMessage::GameCreated { session_id, .. } = msg else {
            unreachable!();
        };

        let (bob_tx2, mut bob_rx2) = mpsc::channel(64);
        drop(bob_rx);
        state
            .handle_message(
                &mut bob,
                ClientMessage::JoinGame {
                    session_id: session_id.clone(),
                },
                &bob_tx2,
            )
            .await;
        expect(&mut bob_rx2, |m| matches!(m, ServerMessage::GameState { .. })).await;

        // Only the host can start.
        state
            .handle_message(&mut bob, ClientMessage::StartGame, &bob_tx2)
            .await;
        let msg = expect(&mut bob_rx2, |m| matches!(m, ServerMessage::Error { .. })).await;
        let ServerMessage::Error { code, .. } = msg else {
            unreachable!();
        };
        assert_eq!(code, ErrorCode::InvalidAction);

        state
            .handle_message(&mut alice, ClientMessage::StartGame, &alice_tx)
            .await;
        expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameStarted { .. })
        })
        .await;

        // Host rolls; everyone hears it.
        state
            .handle_message(&mut alice, ClientMessage::RollDice, &alice_tx)
            .await;
        let msg = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::DiceRolled { .. })
        })
        .await;
        let ServerMessage::DiceRolled { value, .. } = msg else {
            unreachable!();
        };
        assert!((1..=6).contains(&value));
        expect(&mut bob_rx2, |m| matches!(m, ServerMessage::DiceRolled { .. })).await;
    }

    #[tokio::test]
    async fn test_out_of_turn_action_reported_privately() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, mut bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &bob_tx,
            )
            .await;
        state
            .handle_message(&mut alice, ClientMessage::StartGame, &alice_tx)
            .await;

        // Bob acts out of turn; only Bob hears about it.
        state
            .handle_message(&mut bob, ClientMessage::RollDice, &bob_tx)
            .await;
        let msg = expect(&mut bob_rx, |m| matches!(m, ServerMessage::InvalidMove { .. })).await;
        let ServerMessage::InvalidMove { message } = msg else {
            unreachable!();
        };
        assert!(message.contains("not your turn"));

        // Alice's queue holds no invalid_move.
        while let Ok(msg) = alice_rx.try_recv() {
            assert!(!matches!(msg, ServerMessage::InvalidMove { .. }));
        }
    }

    #[tokio::test]
    async fn test_quick_match_pairs_players() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, _bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Uno,
                },
                &alice_tx,
            )
            .await;
        expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameCreated { .. })
        })
        .await;

        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Uno,
                },
                &bob_tx,
            )
            .await;
        assert_eq!(state.registry.session_count().await, 1);
        assert_eq!(alice.session_id, bob.session_id);
    }

    #[tokio::test]
    async fn test_leave_clears_pointer_and_notifies() {
        let state = test_state();
        let (mut alice, alice_tx, _alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, mut bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &bob_tx,
            )
            .await;

        let alice_id = alice.profile.as_ref().unwrap().id;
        assert!(state.active.get_active_session(alice_id).is_some());

        state
            .handle_message(&mut alice, ClientMessage::LeaveGame, &alice_tx)
            .await;
        assert!(state.active.get_active_session(alice_id).is_none());
        assert!(alice.session_id.is_none());
        expect(&mut bob_rx, |m| matches!(m, ServerMessage::PlayerLeft { .. })).await;
        assert_eq!(state.registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_reauthentication_resumes_session() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, _bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Uno,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Uno,
                },
                &bob_tx,
            )
            .await;
        state
            .handle_message(&mut alice, ClientMessage::StartGame, &alice_tx)
            .await;
        expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameStarted { .. })
        })
        .await;

        // Alice's connection drops: binding cleared, seat kept.
        let alice_id = alice.profile.as_ref().unwrap().id;
        let arc = state.registry.session_of(alice_id).await.unwrap();
        arc.write().await.unbind(alice_id);
        drop((alice_tx, alice_rx));

        // Fresh connection, same token subject.
        let (tx_new, mut rx_new) = mpsc::channel(64);
        let mut ctx_new = ConnectionContext::default();
        state
            .handle_message(
                &mut ctx_new,
                ClientMessage::Authenticate {
                    token: token_for("alice", "Alice"),
                },
                &tx_new,
            )
            .await;

        assert!(matches!(
            rx_new.recv().await.unwrap(),
            ServerMessage::Authenticated { .. }
        ));
        let msg = rx_new.recv().await.unwrap();
        let ServerMessage::GameState { state: projection, .. } = msg else {
            panic!("expected the resumed state");
        };
        let crate::game::PublicState::Uno(uno) = projection else {
            panic!("wrong projection kind");
        };
        assert_eq!(uno.status, GameStatus::Playing);
        // And the private hand follows.
        assert!(matches!(
            rx_new.recv().await.unwrap(),
            ServerMessage::UnoHand { .. }
        ));
        assert_eq!(ctx_new.session_id, alice.session_id);
    }

    #[tokio::test]
    async fn test_list_games_reports_waiting_sessions() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::CreateGame {
                    kind: GameKind::Monopoly,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(&mut alice, ClientMessage::ListGames, &alice_tx)
            .await;

        let msg = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GamesUpdated { games } if !games.is_empty())
        })
        .await;
        let ServerMessage::GamesUpdated { games } = msg else {
            unreachable!();
        };
        assert_eq!(games[0].kind, GameKind::Monopoly);
        assert_eq!(games[0].host, "Alice");
        assert_eq!(games[0].player_count, 1);
        assert_eq!(games[0].max_players, 6);
    }

    #[tokio::test]
    async fn test_abandoned_mid_game_session_archived_as_saved() {
        let state = test_state();
        let (mut alice, alice_tx, _alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, _bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &bob_tx,
            )
            .await;
        state
            .handle_message(&mut alice, ClientMessage::StartGame, &alice_tx)
            .await;
        let id = alice.session_id.unwrap();

        state
            .handle_message(&mut alice, ClientMessage::LeaveGame, &alice_tx)
            .await;
        state
            .handle_message(&mut bob, ClientMessage::LeaveGame, &bob_tx)
            .await;
        assert_eq!(state.registry.session_count().await, 0);

        // The abandoned game survives as a saved snapshot.
        let snapshot = state.snapshots.load(id).unwrap().unwrap();
        assert_eq!(snapshot["status"], "saved");
        assert_eq!(snapshot["kind"], "ludo");
    }

    #[tokio::test]
    async fn test_archived_snapshot_restored_on_reconnect() {
        let state = test_state();

        // First login establishes the derived player id.
        let (alice, _tx, _rx) = authed_ctx(&state, "alice", "Alice").await;
        let alice_id = alice.profile.as_ref().unwrap().id;

        // Simulate a restarted server: the registry is empty but the
        // reconnect hint and an archived snapshot survived.
        let id: SessionId = [7; 16];
        let mut engine = crate::game::GameEngine::new(GameKind::Uno);
        engine
            .add_player(PlayerProfile {
                id: alice_id,
                display_name: "Alice".into(),
            })
            .unwrap();
        state
            .snapshots
            .save(id, serde_json::to_value(engine.public_state()).unwrap())
            .unwrap();
        state.active.set_active_session(alice_id, Some(id));

        let (tx_new, mut rx_new) = mpsc::channel(64);
        let mut ctx_new = ConnectionContext::default();
        state
            .handle_message(
                &mut ctx_new,
                ClientMessage::Authenticate {
                    token: token_for("alice", "Alice"),
                },
                &tx_new,
            )
            .await;
        assert!(matches!(
            rx_new.recv().await.unwrap(),
            ServerMessage::Authenticated { .. }
        ));
        let msg = rx_new.recv().await.unwrap();
        let ServerMessage::GameState {
            state: projection,
            turn_deadline,
            ..
        } = msg
        else {
            panic!("expected the archived state");
        };
        assert!(matches!(projection, PublicState::Uno(_)));
        assert!(turn_deadline.is_none());
    }

    #[tokio::test]
    async fn test_reauthenticating_as_new_subject_unbinds_old_seat() {
        let state = test_state();
        let (mut ctx, tx, mut rx) = authed_ctx(&state, "alice", "Alice").await;
        let alice_id = ctx.profile.as_ref().unwrap().id;

        state
            .handle_message(
                &mut ctx,
                ClientMessage::CreateGame {
                    kind: GameKind::Ludo,
                },
                &tx,
            )
            .await;
        expect(&mut rx, |m| matches!(m, ServerMessage::GameCreated { .. })).await;

        let arc = state.registry.session_of(alice_id).await.unwrap();
        assert!(arc.read().await.is_connected(alice_id));

        // Same connection, different subject.
        state
            .handle_message(
                &mut ctx,
                ClientMessage::Authenticate {
                    token: token_for("bob", "Bob"),
                },
                &tx,
            )
            .await;

        assert_ne!(ctx.profile.as_ref().unwrap().id, alice_id);
        assert!(ctx.session_id.is_none());
        let session = arc.read().await;
        // Alice's binding is gone but her seat survives for her own
        // reconnect.
        assert!(!session.is_connected(alice_id));
        assert!(session.engine.has_player(alice_id));
    }

    #[tokio::test]
    async fn test_started_game_broadcasts_turn_deadline() {
        let state = test_state();
        let (mut alice, alice_tx, mut alice_rx) = authed_ctx(&state, "alice", "Alice").await;
        let (mut bob, bob_tx, _bob_rx) = authed_ctx(&state, "bob", "Bob").await;

        state
            .handle_message(
                &mut alice,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &alice_tx,
            )
            .await;
        state
            .handle_message(
                &mut bob,
                ClientMessage::QuickMatch {
                    kind: GameKind::Ludo,
                },
                &bob_tx,
            )
            .await;
        state
            .handle_message(&mut alice, ClientMessage::StartGame, &alice_tx)
            .await;

        let msg = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameStarted { .. })
        })
        .await;
        let ServerMessage::GameStarted { turn_deadline, .. } = msg else {
            unreachable!();
        };
        assert!(turn_deadline.is_some());

        // Every subsequent state push carries the re-armed deadline.
        state
            .handle_message(&mut alice, ClientMessage::RollDice, &alice_tx)
            .await;
        let msg = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::GameState { .. })
        })
        .await;
        let ServerMessage::GameState { turn_deadline, .. } = msg else {
            unreachable!();
        };
        assert!(turn_deadline.is_some());
    }
}
