//! Network Layer
//!
//! WebSocket server for turn-based multiplayer tables.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod auth;
pub mod protocol;
pub mod session;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, issue_token, validate_token};
pub use protocol::{
    ClientMessage, ServerMessage, BidRequest, ActionResult, ResultStatus,
    TurnInfoView, AuctionView, MarketView, PlayerView, PrivatePlayerView, ResourcesView,
    ServerError, ErrorCode,
};
pub use session::{
    MatchSession, SessionId, SessionState, SessionManager, SessionConfig, PlayerAction, SessionError,
};
pub use server::{GameServer, ServerConfig, GameServerError};
