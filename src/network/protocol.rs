//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`. Queries mirror what a
//! turn-based client polls for: whose turn it is, the open auction, the plant
//! market, the table and its own holdings, and fuel prices.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::events::GameEvent;
use crate::game::market::{PlantId, PowerPlant};
use crate::game::phase::Phase;
use crate::game::resources::{Bucket, ResourceType};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the open lobby under a display name.
    Register {
        /// Requested name; made unique by the server.
        player_name: String,
    },

    /// Reattach a connection with a token from `registered`.
    Auth {
        /// Player token.
        token: String,
    },

    /// Start the match this player is seated in.
    StartMatch,

    /// Round, phase and current seat.
    TurnInfo,

    /// The open auction, if any.
    Auction,

    /// Current offer and futures.
    Market,

    /// Public view of every player.
    PlayerInfo,

    /// Own holdings.
    MyInfo,

    /// Fuel buckets.
    Resources,

    /// Open or raise; a negative bid passes.
    Bid(BidRequest),

    /// Decline to open, or leave the auction.
    Pass,

    /// Build a generator at the end of `path`.
    Build {
        /// Owned city first, target last.
        path: Vec<String>,
    },

    /// Finish the turn outside the auction.
    EndTurn,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },

    /// Leave the match.
    Leave,
}

/// Bid request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRequest {
    /// Plant to bid on.
    pub powerplant_id: PlantId,
    /// Amount; any negative value is a pass.
    pub bid: i64,
    /// Plant to drop if this bid wins while at the plant limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash_id: Option<PlantId>,
}

impl BidRequest {
    /// Negative bids pass.
    pub fn is_pass(&self) -> bool {
        self.bid < 0
    }

    /// Bid as money. Values past `u32::MAX` saturate and fail the money check.
    pub fn amount(&self) -> u32 {
        u32::try_from(self.bid.max(0)).unwrap_or(u32::MAX)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration accepted.
    Registered(Registration),

    /// Token accepted, connection reattached.
    Authenticated {
        /// Player id (UUID)
        player_id: String,
        /// Display name
        player_name: String,
    },

    /// Outcome of a game action.
    Result(ActionResult),

    /// Answer to `turn_info`; also pushed after every change.
    TurnInfo(TurnInfoView),

    /// Answer to `auction`.
    Auction(AuctionView),

    /// Answer to `market`.
    Market(MarketView),

    /// Answer to `player_info`.
    PlayerInfo {
        /// Seating order
        players: Vec<PlayerView>,
    },

    /// Answer to `my_info`.
    MyInfo(PrivatePlayerView),

    /// Answer to `resources`.
    Resources(ResourcesView),

    /// Game event notification.
    Event(GameEvent),

    /// Pong response.
    Pong {
        /// Echoed client clock
        timestamp: u64,
        /// Server clock, unix millis
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why
        reason: String,
    },
}

/// Registration details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Player id (UUID).
    pub player_id: String,
    /// Unique name actually assigned.
    pub player_name: String,
    /// Token for reconnecting.
    pub token: String,
    /// Match session (hex).
    pub session_id: String,
}

/// Action status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Applied
    Success,
    /// Rejected, nothing changed
    Failure,
}

/// Outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Applied or rejected.
    pub status: ResultStatus,
    /// Rejection reason, empty on success.
    pub msg: String,
}

impl ActionResult {
    /// Applied.
    pub fn success() -> Self {
        Self { status: ResultStatus::Success, msg: String::new() }
    }

    /// Rejected with a reason.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self { status: ResultStatus::Failure, msg: msg.into() }
    }

    /// Did the action apply?
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for ActionResult {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInfoView {
    /// Round, 0 before the match starts.
    pub round: u32,
    /// Current phase.
    pub phase: Phase,
    /// Name of the seat to act.
    pub current_player: Option<String>,
    /// Seating by name.
    pub player_order: Vec<String>,
    /// Hex state fingerprint.
    pub state_hash: String,
}

/// The auction as seen by every player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionView {
    /// An auction is open.
    pub auction_in_progress: bool,
    /// Plant on the block.
    pub powerplant: Option<PowerPlant>,
    /// High bid.
    pub current_bid: u32,
    /// Name of the high bidder.
    pub leading_bidder: Option<String>,
    /// Names still able to raise.
    pub eligible_bidders: Vec<String>,
    /// Name the rotation points at.
    pub next_bidder: Option<String>,
}

/// Plant market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketView {
    /// Buyable now.
    pub current_market: Vec<PowerPlant>,
    /// Displayed, not yet buyable.
    pub futures_market: Vec<PowerPlant>,
}

/// Public player information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Display name.
    pub name: String,
    /// Money.
    pub money: u32,
    /// Owned plants.
    pub powerplants: Vec<PowerPlant>,
    /// Cities built in.
    pub cities: usize,
    /// Still able to buy a plant this round.
    pub can_bid: bool,
}

/// A player's own view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivatePlayerView {
    /// Player id (UUID).
    pub player_id: String,
    /// Public fields.
    pub info: PlayerView,
    /// Plant limit at this table.
    pub max_plants: usize,
    /// Is it this player's turn.
    pub your_turn: bool,
}

/// Fuel buckets by resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesView {
    /// Cheapest tier first.
    pub buckets: BTreeMap<ResourceType, Vec<Bucket>>,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Token failed validation.
    AuthFailed,
    /// Token has expired.
    TokenExpired,
    /// Message could not be parsed.
    InvalidInput,
    /// Session is gone.
    MatchNotFound,
    /// Connection already holds a seat.
    AlreadyInMatch,
    /// Connection holds no seat.
    NotInMatch,
    /// Too many connections.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Does this message change the game?
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            ClientMessage::Bid(_) | ClientMessage::Pass | ClientMessage::Build { .. } | ClientMessage::EndTurn
        )
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::GameEventData;
    use crate::game::player::PlayerId;

    #[test]
    fn test_bid_wire_shape() {
        let msg = ClientMessage::from_json(
            r#"{"type":"bid","powerplant_id":13,"bid":15}"#,
        ).unwrap();

        let ClientMessage::Bid(req) = &msg else {
            panic!("Wrong message type");
        };
        assert_eq!(req.powerplant_id, 13);
        assert_eq!(req.amount(), 15);
        assert_eq!(req.trash_id, None);
        assert!(!req.is_pass());
        assert!(msg.is_action());
    }

    #[test]
    fn test_negative_bid_is_pass() {
        let req = BidRequest { powerplant_id: 3, bid: -1, trash_id: None };
        assert!(req.is_pass());
        assert_eq!(req.amount(), 0);

        let huge = BidRequest { powerplant_id: 3, bid: i64::MAX, trash_id: None };
        assert_eq!(huge.amount(), u32::MAX);
    }

    #[test]
    fn test_unit_queries_parse() {
        for (json, expected) in [
            (r#"{"type":"turn_info"}"#, ClientMessage::TurnInfo),
            (r#"{"type":"my_info"}"#, ClientMessage::MyInfo),
            (r#"{"type":"end_turn"}"#, ClientMessage::EndTurn),
            (r#"{"type":"start_match"}"#, ClientMessage::StartMatch),
        ] {
            assert_eq!(ClientMessage::from_json(json).unwrap(), expected);
        }
        assert!(!ClientMessage::Market.is_action());
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_build_message() {
        let msg = ClientMessage::Build { path: vec!["Berlin".into(), "Magdeburg".into()] };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"build""#));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_result_status_uppercase() {
        let ok: ActionResult = Ok::<(), String>(()).into();
        let failed: ActionResult = Err::<(), _>("bid must exceed 10").into();

        let json = ServerMessage::Result(failed.clone()).to_json().unwrap();
        assert!(json.contains(r#""status":"FAILURE""#));
        assert!(json.contains("bid must exceed 10"));
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }

    #[test]
    fn test_turn_info_phase_name() {
        let msg = ServerMessage::TurnInfo(TurnInfoView {
            round: 2,
            phase: Phase::BuildGenerators,
            current_player: Some("alice".into()),
            player_order: vec!["alice".into(), "bob".into()],
            state_hash: "00".repeat(32),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""phase":"BUILD_GENERATORS""#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_event_is_wrapped() {
        let event = GameEvent::new(1, 4, GameEventData::AuctionWon {
            player_id: PlayerId::new([9; 16]),
            plant: 13,
            price: 15,
        });
        let json = ServerMessage::Event(event.clone()).to_json().unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""kind":"auction_won""#));

        let ServerMessage::Event(parsed) = ServerMessage::from_json(&json).unwrap() else {
            panic!("Wrong message type");
        };
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_resources_keyed_by_name() {
        let market = crate::game::resources::ResourceMarket::standard();
        let msg = ServerMessage::Resources(ResourcesView { buckets: market.snapshot() });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""COAL""#));
        assert!(json.contains(r#""URANIUM""#));
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::Error(ServerError::new(ErrorCode::NotInMatch, "register first"));
        let json = msg.to_json().unwrap();
        assert!(json.contains("not_in_match"));
    }
}
