//! Match Session Management
//!
//! Manages the lifecycle of a table from lobby to close. Each session owns
//! one `MatchState`, the outbound channel of every seated player, and the
//! turn timer that forces play forward when a seat goes quiet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::game::events::GameEvent;
use crate::game::market::{Market, PlantId};
use crate::game::player::{Player, PlayerId};
use crate::game::state::{ActionError, MatchConfig, MatchState};
use crate::network::protocol::{
    AuctionView, MarketView, PlayerView, PrivatePlayerView, ResourcesView,
    ServerMessage, TurnInfoView,
};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting registrations.
    Lobby,
    /// Match in progress.
    Playing,
    /// Session closed.
    Closed,
}

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Player is connected.
    Connected,
    /// Player disconnected, seat kept for a token reconnect.
    Disconnected {
        /// When disconnection occurred.
        since: Instant,
    },
}

/// Configuration for a match session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Table rules.
    pub match_config: MatchConfig,
    /// How long a seat may stay unchanged before it is skipped.
    pub turn_timeout: Duration,
    /// Start the match as soon as the table is full.
    pub auto_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            match_config: MatchConfig::default(),
            turn_timeout: Duration::from_secs(60),
            auto_start: true,
        }
    }
}

/// A player seated in a session.
#[derive(Debug)]
pub struct SessionPlayer {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Connection state (for reconnection support).
    pub connection_state: ConnectionState,
    /// Message channel to this player.
    pub sender: Option<mpsc::Sender<ServerMessage>>,
}

impl SessionPlayer {
    /// Check if player is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected) && self.sender.is_some()
    }
}

/// A game action, already resolved to the acting player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    /// Open or raise.
    Bid {
        /// Plant
        plant: PlantId,
        /// Amount
        bid: u32,
        /// Plant to drop on winning
        discard: Option<PlantId>,
    },
    /// Decline to open, or leave the auction.
    Pass,
    /// Build along a path.
    Build {
        /// Owned city first, target last
        path: Vec<String>,
    },
    /// Finish a non-auction turn.
    EndTurn,
}

/// A match session.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Current state.
    pub state: SessionState,
    /// Session configuration.
    pub config: SessionConfig,
    /// Seated players.
    players: BTreeMap<PlayerId, SessionPlayer>,
    /// The engine.
    game: MatchState,
    /// When session was created.
    created_at: Instant,
    /// Turn timer, restarted by every accepted action.
    turn_started_at: Instant,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<GameEvent>,
}

impl MatchSession {
    /// Create a new session.
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let game = MatchState::new(id, config.match_config.clone());
        let now = Instant::now();

        Self {
            id,
            state: SessionState::Lobby,
            config,
            players: BTreeMap::new(),
            game,
            created_at: now,
            turn_started_at: now,
            event_tx,
        }
    }

    // -------------------------------------------------------------------------
    // Seats and connections
    // -------------------------------------------------------------------------

    /// Seat a player. Returns the unique name assigned.
    pub fn register_player(
        &mut self,
        player_id: PlayerId,
        name: &str,
        sender: Option<mpsc::Sender<ServerMessage>>,
    ) -> Result<String, SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::MatchInProgress);
        }
        if self.players.contains_key(&player_id) {
            return Err(SessionError::AlreadyInSession);
        }
        if self.is_full() {
            return Err(SessionError::SessionFull);
        }

        let assigned = self.game.add_player(player_id, name)?;
        self.players.insert(player_id, SessionPlayer {
            player_id,
            connection_state: ConnectionState::Connected,
            sender,
        });

        if self.config.auto_start && self.is_full() {
            if let Err(e) = self.start_match() {
                warn!(error = %e, "Full table could not start");
            }
        }
        Ok(assigned)
    }

    /// Is every seat taken?
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.config.match_config.max_players
    }

    /// Does this lobby still take registrations?
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Lobby && !self.is_full()
    }

    /// Rebind a seat to a new connection.
    pub fn attach(
        &mut self,
        player_id: &PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }
        let player = self.players.get_mut(player_id).ok_or(SessionError::PlayerNotFound)?;
        player.connection_state = ConnectionState::Connected;
        player.sender = Some(sender);
        debug!(player = %player_id, "Connection attached");
        Ok(())
    }

    /// Mark a seat disconnected. The seat stays; timeouts keep play moving.
    pub fn detach(&mut self, player_id: &PlayerId) -> bool {
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };
        player.connection_state = ConnectionState::Disconnected { since: Instant::now() };
        player.sender = None;

        if self.players.values().all(|p| !p.is_connected()) {
            info!(session = %hex::encode(&self.id[..4]), "Last connection left, closing session");
            self.state = SessionState::Closed;
        }
        true
    }

    /// Detach only if `sender` is still the seat's live connection.
    ///
    /// A socket that closes after its player reattached elsewhere is ignored.
    pub fn detach_connection(
        &mut self,
        player_id: &PlayerId,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> bool {
        let live = self
            .players
            .get(player_id)
            .and_then(|p| p.sender.as_ref())
            .is_some_and(|current| current.same_channel(sender));
        if !live {
            debug!(player = %player_id, "Stale connection closed, seat kept");
            return false;
        }
        self.detach(player_id)
    }

    /// Is this player seated here?
    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains_key(player_id)
    }

    /// Is this seat connected?
    pub fn is_connected(&self, player_id: &PlayerId) -> bool {
        self.players.get(player_id).is_some_and(SessionPlayer::is_connected)
    }

    /// Get player count.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    // -------------------------------------------------------------------------
    // Play
    // -------------------------------------------------------------------------

    /// Start the match.
    pub fn start_match(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::MatchInProgress);
        }
        self.game.start_match()?;
        self.state = SessionState::Playing;
        self.restart_turn_timer(Instant::now());
        info!(
            session = %hex::encode(&self.id[..4]),
            players = self.players.len(),
            "Session playing"
        );
        Ok(())
    }

    /// Apply one player action to the engine.
    pub fn apply(&mut self, player_id: PlayerId, action: PlayerAction) -> Result<(), SessionError> {
        self.apply_at(player_id, action, Instant::now())
    }

    /// Apply an action received at `now`.
    pub fn apply_at(
        &mut self,
        player_id: PlayerId,
        action: PlayerAction,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::MatchNotInProgress);
        }
        if !self.players.contains_key(&player_id) {
            return Err(SessionError::PlayerNotFound);
        }

        let result = match &action {
            PlayerAction::Bid { plant, bid, discard } => {
                self.game.auction_bid(player_id, *bid, *plant, *discard)
            }
            PlayerAction::Pass => self.game.auction_pass(player_id),
            PlayerAction::Build { path } => self.game.build_generator(player_id, path).map(|_| ()),
            PlayerAction::EndTurn => self.game.end_turn(player_id),
        };

        if let Err(e) = &result {
            warn!(player = %player_id, ?action, error = %e, "Action rejected");
        }
        result?;

        self.restart_turn_timer(now);
        Ok(())
    }

    /// Skip the seat if the turn timer ran out. Returns the skipped player.
    ///
    /// Mid-phase an open auction is left alone and only the seat moves.
    /// Skipping the last auction seat settles it for the leader.
    pub fn check_turn_timeout(&mut self, now: Instant) -> Option<PlayerId> {
        if self.state != SessionState::Playing {
            return None;
        }
        if now.saturating_duration_since(self.turn_started_at) < self.config.turn_timeout {
            return None;
        }
        let skipped = self.game.resolve_turn();
        self.restart_turn_timer(now);
        skipped
    }

    fn restart_turn_timer(&mut self, now: Instant) {
        self.turn_started_at = now;
    }

    /// Drain engine events, forwarding each to event subscribers.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        let events = self.game.take_events();
        for event in &events {
            let _ = self.event_tx.send(event.clone());
        }
        events
    }

    /// Subscribe to match events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast a message to all connected players.
    pub async fn broadcast(&self, message: ServerMessage) {
        for player in self.players.values() {
            if let (true, Some(sender)) = (player.is_connected(), &player.sender) {
                let _ = sender.send(message.clone()).await;
            }
        }
    }

    /// Send drained events to the table, followed by a fresh turn view.
    pub async fn broadcast_events(&self, events: Vec<GameEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            self.broadcast(ServerMessage::Event(event)).await;
        }
        self.broadcast(ServerMessage::TurnInfo(self.turn_info())).await;
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    fn name_of(&self, id: &PlayerId) -> String {
        self.game.player_name(id).map(str::to_string).unwrap_or_else(|| id.to_string())
    }

    fn names(&self, ids: &[PlayerId]) -> Vec<String> {
        ids.iter().map(|id| self.name_of(id)).collect()
    }

    fn player_view(&self, player: &Player) -> PlayerView {
        PlayerView {
            name: player.name.clone(),
            money: player.money,
            powerplants: player.plants.clone(),
            cities: self.game.cities_of(&player.id),
            can_bid: player.can_bid,
        }
    }

    /// Round, phase and seat.
    pub fn turn_info(&self) -> TurnInfoView {
        TurnInfoView {
            round: self.game.round,
            phase: self.game.phase,
            current_player: self.game.current_player_id().map(|id| self.name_of(&id)),
            player_order: self.names(&self.game.player_order),
            state_hash: hex::encode(self.game.compute_hash()),
        }
    }

    /// The open auction.
    pub fn auction_view(&self) -> AuctionView {
        let auction = &self.game.auction;
        AuctionView {
            auction_in_progress: auction.in_progress,
            powerplant: auction
                .plant_under_auction
                .and_then(|id| self.game.market.offered(id).copied()),
            current_bid: auction.current_bid,
            leading_bidder: auction.leading_bidder.map(|id| self.name_of(&id)),
            eligible_bidders: self.names(&auction.eligible_bidders),
            next_bidder: auction.next_bidder().map(|id| self.name_of(&id)),
        }
    }

    /// Plant market.
    pub fn market_view(&self) -> MarketView {
        MarketView {
            current_market: self.game.market.currently_available().to_vec(),
            futures_market: self.game.market.futures().to_vec(),
        }
    }

    /// Every player, in seating order once the match has started.
    pub fn players_view(&self) -> Vec<PlayerView> {
        let order = if self.game.player_order.is_empty() {
            self.game.players.ids()
        } else {
            self.game.player_order.clone()
        };
        order
            .iter()
            .filter_map(|id| self.game.players.get(id))
            .map(|p| self.player_view(p))
            .collect()
    }

    /// A player's own view.
    pub fn my_info(&self, player_id: &PlayerId) -> Option<PrivatePlayerView> {
        let player = self.game.players.get(player_id)?;
        Some(PrivatePlayerView {
            player_id: player_id.to_uuid_string(),
            info: self.player_view(player),
            max_plants: self.game.config.max_plants(self.game.player_count()),
            your_turn: self.game.current_player_id() == Some(*player_id),
        })
    }

    /// Fuel buckets.
    pub fn resources_view(&self) -> ResourcesView {
        ResourcesView { buckets: self.game.resources.snapshot() }
    }

    /// Assigned name of a seated player.
    pub fn player_name(&self, player_id: &PlayerId) -> Option<&str> {
        self.game.player_name(player_id)
    }

    /// Read access to the engine.
    pub fn game(&self) -> &MatchState {
        &self.game
    }

    /// Get session state.
    pub fn get_state(&self) -> SessionState {
        self.state
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Session is full.
    #[error("Session is full")]
    SessionFull,

    /// Player already in session.
    #[error("Already in session")]
    AlreadyInSession,

    /// Match is in progress.
    #[error("Match in progress")]
    MatchInProgress,

    /// Match not in progress.
    #[error("Match not in progress")]
    MatchNotInProgress,

    /// Session closed.
    #[error("Session closed")]
    SessionClosed,

    /// Player not found.
    #[error("Player not found")]
    PlayerNotFound,

    /// The engine rejected the action.
    #[error(transparent)]
    Action(#[from] ActionError),
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all active sessions.
pub struct SessionManager {
    /// Active sessions.
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<MatchSession>>>>,
    /// Player to session mapping.
    player_sessions: RwLock<BTreeMap<PlayerId, SessionId>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            player_sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a new session.
    pub async fn create_session(&self, config: SessionConfig) -> SessionId {
        let id = uuid::Uuid::new_v4().into_bytes();
        let session = MatchSession::new(id, config);

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(RwLock::new(session)));

        info!(session = %hex::encode(&id[..4]), "Session created");
        id
    }

    /// A lobby with a free seat, creating one if none is open.
    pub async fn open_lobby(&self, config: SessionConfig) -> SessionId {
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.read().await.is_open() {
                    return *id;
                }
            }
        }
        self.create_session(config).await
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// All sessions.
    pub async fn all_sessions(&self) -> Vec<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Get session for a player.
    pub async fn get_player_session(&self, player_id: &PlayerId) -> Option<Arc<RwLock<MatchSession>>> {
        let player_sessions = self.player_sessions.read().await;
        if let Some(session_id) = player_sessions.get(player_id) {
            self.get_session(session_id).await
        } else {
            None
        }
    }

    /// Register player in a session.
    pub async fn register_player(&self, player_id: PlayerId, session_id: SessionId) {
        let mut player_sessions = self.player_sessions.write().await;
        player_sessions.insert(player_id, session_id);
    }

    /// Unregister player from session.
    pub async fn unregister_player(&self, player_id: &PlayerId) {
        let mut player_sessions = self.player_sessions.write().await;
        player_sessions.remove(player_id);
    }

    /// Remove a session.
    pub async fn remove_session(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Cleanup closed sessions and their player mappings.
    pub async fn cleanup(&self) {
        let mut to_remove = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.read().await.state == SessionState::Closed {
                    to_remove.push(*id);
                }
            }
        }

        for id in &to_remove {
            self.remove_session(id).await;
        }

        if !to_remove.is_empty() {
            let mut player_sessions = self.player_sessions.write().await;
            player_sessions.retain(|_, session| !to_remove.contains(session));
            debug!(removed = to_remove.len(), "Closed sessions cleaned up");
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
