//! WebSocket Game Server
//!
//! Async WebSocket server for turn-based tables.
//! Handles registration, token reattach, action routing and turn timers.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::player::PlayerId;
use crate::game::state::MatchConfig;
use crate::network::auth::{issue_token, validate_token, AuthConfig, AuthError};
use crate::network::protocol::{
    ActionResult, ClientMessage, ErrorCode, Registration, ServerError, ServerMessage,
};
use crate::network::session::{
    MatchSession, PlayerAction, SessionConfig, SessionError, SessionId, SessionManager,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent this long are dropped.
    pub idle_timeout: Duration,
    /// Settings for every new table.
    pub session: SessionConfig,
    /// Token settings.
    pub auth: AuthConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            session: SessionConfig::default(),
            auth: AuthConfig::ephemeral(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `POWERGRID_*` and `AUTH_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self { auth: AuthConfig::from_env(), ..Self::default() };
        let defaults = MatchConfig::default();

        if let Some(addr) = env_parse("POWERGRID_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse("POWERGRID_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse("POWERGRID_TURN_TIMEOUT_SECS") {
            config.session.turn_timeout = Duration::from_secs(secs);
        }
        config.session.match_config = MatchConfig {
            starting_money: env_parse("POWERGRID_STARTING_MONEY").unwrap_or(defaults.starting_money),
            min_players: env_parse("POWERGRID_MIN_PLAYERS").unwrap_or(defaults.min_players),
            max_players: env_parse("POWERGRID_MAX_PLAYERS").unwrap_or(defaults.max_players),
        };
        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Token error.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after register or auth).
    player_id: Option<PlayerId>,
    /// Table the player sits at.
    session_id: Option<SessionId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Outbound channel of this connection.
    sender: mpsc::Sender<ServerMessage>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions: Arc::new(SessionManager::new()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let timer_sessions = self.sessions.clone();
        let cleanup_clients = self.clients.clone();
        let cleanup_sessions = self.sessions.clone();
        let idle_timeout = self.config.idle_timeout;

        let timer_handle = tokio::spawn(async move {
            Self::run_turn_timer_loop(timer_sessions).await;
        });
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_sessions, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_connection(stream);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        timer_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Tell an over-limit client why it is being dropped.
    fn reject_connection(stream: TcpStream) {
        tokio::spawn(async move {
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            let msg = ServerMessage::Error(ServerError::new(
                ErrorCode::ServerOverloaded,
                "connection limit reached",
            ));
            if let Ok(text) = msg.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            Self::connect_client(&clients, addr, msg_tx.clone()).await;

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            format!("invalid message: {e}"),
                                        ))).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &sessions,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                    ErrorCode::InvalidInput,
                                    "binary frames are not supported",
                                ))).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            sender_task.abort();
            Self::disconnect_client(&clients, &sessions, addr).await;
            info!("Client {} cleaned up", addr);
        });
    }

    async fn connect_client(clients: &Clients, addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) {
        let now = Instant::now();
        clients.write().await.insert(addr, ConnectedClient {
            player_id: None,
            session_id: None,
            connected_at: now,
            last_activity: now,
            sender,
        });
    }

    /// Drop a connection. Its seat stays for a token reattach.
    async fn disconnect_client(clients: &Clients, sessions: &Arc<SessionManager>, addr: SocketAddr) {
        let Some(client) = clients.write().await.remove(&addr) else {
            return;
        };
        let Some(player_id) = client.player_id else {
            return;
        };
        // The player may already have reattached on another socket
        let detached = match sessions.get_player_session(&player_id).await {
            Some(session) => session.write().await.detach_connection(&player_id, &client.sender),
            None => true,
        };
        if !detached {
            return;
        }
        sessions.unregister_player(&player_id).await;
        debug!(
            player = %player_id,
            connected_for = ?client.connected_at.elapsed(),
            "Seat detached"
        );
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.last_activity = Instant::now();
            }
        }
        debug!(%addr, ?msg, "Client message");

        match msg {
            ClientMessage::Register { player_name } => {
                Self::handle_register(addr, &player_name, clients, sessions, config, sender).await;
            }
            ClientMessage::Auth { token } => {
                Self::handle_auth(addr, &token, clients, sessions, config, sender).await;
            }
            ClientMessage::StartMatch => {
                Self::handle_start(addr, clients, sessions, sender).await;
            }
            ClientMessage::Bid(req) => {
                let action = if req.is_pass() {
                    PlayerAction::Pass
                } else {
                    PlayerAction::Bid {
                        plant: req.powerplant_id,
                        bid: req.amount(),
                        discard: req.trash_id,
                    }
                };
                Self::handle_action(addr, action, clients, sessions, sender).await;
            }
            ClientMessage::Pass => {
                Self::handle_action(addr, PlayerAction::Pass, clients, sessions, sender).await;
            }
            ClientMessage::Build { path } => {
                Self::handle_action(addr, PlayerAction::Build { path }, clients, sessions, sender).await;
            }
            ClientMessage::EndTurn => {
                Self::handle_action(addr, PlayerAction::EndTurn, clients, sessions, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0),
                }).await;
            }
            ClientMessage::Leave => {
                Self::handle_leave(addr, clients, sessions, sender).await;
            }
            query => {
                Self::handle_query(addr, &query, clients, sessions, sender).await;
            }
        }
    }

    /// Player and table bound to a connection, or an error sent back.
    async fn bound_session(
        addr: SocketAddr,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<(PlayerId, Arc<RwLock<MatchSession>>)> {
        let binding = {
            let clients = clients.read().await;
            clients.get(&addr).and_then(|c| c.player_id.zip(c.session_id))
        };
        let Some((player_id, session_id)) = binding else {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::NotInMatch,
                "register or authenticate first",
            ))).await;
            return None;
        };

        match sessions.get_session(&session_id).await {
            Some(session) => Some((player_id, session)),
            None => {
                let _ = sender.send(ServerMessage::Error(ServerError::new(
                    ErrorCode::MatchNotFound,
                    "session no longer exists",
                ))).await;
                None
            }
        }
    }

    async fn bind_client(clients: &Clients, addr: SocketAddr, player_id: PlayerId, session_id: SessionId) {
        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&addr) {
            client.player_id = Some(player_id);
            client.session_id = Some(session_id);
        }
    }

    /// Handle registration into the open lobby.
    async fn handle_register(
        addr: SocketAddr,
        player_name: &str,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let already_bound = clients
            .read()
            .await
            .get(&addr)
            .is_some_and(|c| c.player_id.is_some());
        if already_bound {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::AlreadyInMatch,
                "this connection already holds a seat",
            ))).await;
            return;
        }
        let name = player_name.trim();
        if name.is_empty() {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::InvalidInput,
                "player_name must not be empty",
            ))).await;
            return;
        }

        let player_id = PlayerId::random();
        let session_id = sessions.open_lobby(config.session.clone()).await;
        let token = match issue_token(&player_id, &session_id, &config.auth) {
            Ok(token) => token,
            Err(e) => {
                error!("Token issue failed: {}", e);
                let _ = sender.send(ServerMessage::Error(ServerError::new(
                    ErrorCode::InternalError,
                    "could not issue a token",
                ))).await;
                return;
            }
        };
        let Some(session) = sessions.get_session(&session_id).await else {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::MatchNotFound,
                "lobby closed",
            ))).await;
            return;
        };

        let seated = {
            let mut s = session.write().await;
            s.register_player(player_id, name, Some(sender.clone()))
                .map(|assigned| (assigned, s.take_events()))
        };
        let (assigned, events) = match seated {
            Ok(seated) => seated,
            Err(e) => {
                let _ = sender.send(ServerMessage::Result(ActionResult::failure(e.to_string()))).await;
                return;
            }
        };

        sessions.register_player(player_id, session_id).await;
        Self::bind_client(clients, addr, player_id, session_id).await;
        info!(%addr, player = %player_id, name = %assigned, "Registered");

        let _ = sender.send(ServerMessage::Registered(Registration {
            player_id: player_id.to_uuid_string(),
            player_name: assigned,
            token,
            session_id: hex::encode(session_id),
        })).await;
        session.read().await.broadcast_events(events).await;
    }

    /// Handle token reattach.
    async fn handle_auth(
        addr: SocketAddr,
        token: &str,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let claims = match validate_token(token, &config.auth) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(%addr, error = %e, "Token rejected");
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    _ => ErrorCode::AuthFailed,
                };
                let _ = sender.send(ServerMessage::Error(ServerError::new(code, e.to_string()))).await;
                return;
            }
        };
        let (Some(player_id), Some(session_id)) = (claims.player_id(), claims.session_id()) else {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::AuthFailed,
                "token is missing its player or session",
            ))).await;
            return;
        };
        let bound = clients.read().await.get(&addr).and_then(|c| c.player_id);
        if bound.is_some_and(|current| current != player_id) {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::AlreadyInMatch,
                "this connection already holds another seat",
            ))).await;
            return;
        }
        let Some(session) = sessions.get_session(&session_id).await else {
            let _ = sender.send(ServerMessage::Error(ServerError::new(
                ErrorCode::MatchNotFound,
                "session no longer exists",
            ))).await;
            return;
        };

        let attached = {
            let mut s = session.write().await;
            s.attach(&player_id, sender.clone())
                .map(|()| (s.player_name(&player_id).unwrap_or_default().to_string(), s.turn_info()))
        };
        let (player_name, turn) = match attached {
            Ok(attached) => attached,
            Err(e) => {
                let _ = sender.send(ServerMessage::Error(ServerError::new(
                    ErrorCode::MatchNotFound,
                    e.to_string(),
                ))).await;
                return;
            }
        };

        sessions.register_player(player_id, session_id).await;
        Self::bind_client(clients, addr, player_id, session_id).await;
        info!(%addr, player = %player_id, "Reattached");

        let _ = sender.send(ServerMessage::Authenticated {
            player_id: player_id.to_uuid_string(),
            player_name,
        }).await;
        let _ = sender.send(ServerMessage::TurnInfo(turn)).await;
    }

    /// Start the caller's table.
    async fn handle_start(
        addr: SocketAddr,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((_, session)) = Self::bound_session(addr, clients, sessions, sender).await else {
            return;
        };
        let (result, events) = {
            let mut s = session.write().await;
            let result = s.start_match();
            (result, s.take_events())
        };
        let _ = sender.send(ServerMessage::Result(ActionResult::from(result))).await;
        session.read().await.broadcast_events(events).await;
    }

    /// Route one game action through the table's write lock.
    async fn handle_action(
        addr: SocketAddr,
        action: PlayerAction,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((player_id, session)) = Self::bound_session(addr, clients, sessions, sender).await else {
            return;
        };
        let (result, events) = {
            let mut s = session.write().await;
            let result = s.apply(player_id, action);
            (result, s.take_events())
        };
        let _ = sender.send(ServerMessage::Result(ActionResult::from(result))).await;
        session.read().await.broadcast_events(events).await;
    }

    /// Answer a read-only view request.
    async fn handle_query(
        addr: SocketAddr,
        query: &ClientMessage,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((player_id, session)) = Self::bound_session(addr, clients, sessions, sender).await else {
            return;
        };
        let reply = {
            let s = session.read().await;
            match query {
                ClientMessage::TurnInfo => Some(ServerMessage::TurnInfo(s.turn_info())),
                ClientMessage::Auction => Some(ServerMessage::Auction(s.auction_view())),
                ClientMessage::Market => Some(ServerMessage::Market(s.market_view())),
                ClientMessage::PlayerInfo => Some(ServerMessage::PlayerInfo { players: s.players_view() }),
                ClientMessage::MyInfo => s.my_info(&player_id).map(ServerMessage::MyInfo),
                ClientMessage::Resources => Some(ServerMessage::Resources(s.resources_view())),
                _ => None,
            }
        };

        let reply = reply.unwrap_or_else(|| {
            ServerMessage::Error(ServerError::new(ErrorCode::InvalidInput, "unsupported query"))
        });
        let _ = sender.send(reply).await;
    }

    /// Handle player leave.
    async fn handle_leave(
        addr: SocketAddr,
        clients: &Clients,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some((player_id, session)) = Self::bound_session(addr, clients, sessions, sender).await else {
            return;
        };
        if session.write().await.detach_connection(&player_id, sender) {
            sessions.unregister_player(&player_id).await;
        }

        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.player_id = None;
                client.session_id = None;
            }
        }
        let _ = sender.send(ServerMessage::Result(ActionResult::success())).await;
    }

    /// Run the turn timer loop.
    async fn run_turn_timer_loop(sessions: Arc<SessionManager>) {
        let mut interval = interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            Self::check_turn_timeouts(&sessions, Instant::now()).await;
        }
    }

    /// Skip every seat whose timer has run out. Returns how many were skipped.
    async fn check_turn_timeouts(sessions: &Arc<SessionManager>, now: Instant) -> usize {
        let mut skipped = 0;

        for session in sessions.all_sessions().await {
            let events = {
                let mut s = session.write().await;
                if s.check_turn_timeout(now).is_none() {
                    continue;
                }
                skipped += 1;
                s.take_events()
            };
            session.read().await.broadcast_events(events).await;
        }

        skipped
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(clients: Clients, sessions: Arc<SessionManager>, idle_timeout: Duration) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let to_remove: Vec<_> = {
                let clients = clients.read().await;
                clients.iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in to_remove {
                Self::disconnect_client(&clients, &sessions, addr).await;
                info!("Removed idle client {}", addr);
            }

            // Cleanup closed sessions
            sessions.cleanup().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}
