//! Game Logic Module
//!
//! The turn/phase engine and the collaborators it drives. Everything here is
//! synchronous and deterministic for a given seed.
//!
//! ## Module Structure
//!
//! - `player`: Player ids and the registry
//! - `phase`: Phase enum and transition table
//! - `order`: Seating algorithm
//! - `auction`: Transient bidding state
//! - `state`: The match engine
//! - `market`: Power plant market contract and deck
//! - `board`: City board contract and sample region
//! - `resources`: Fuel price buckets
//! - `events`: Game events for broadcast
//! - `bot`: Scripted players for demos and benchmarks

pub mod player;
pub mod phase;
pub mod order;
pub mod auction;
pub mod state;
pub mod market;
pub mod board;
pub mod resources;
pub mod events;
pub mod bot;

// Re-export key types
pub use player::{Player, PlayerId, PlayerRegistry};
pub use phase::{Phase, PhaseError};
pub use auction::AuctionState;
pub use state::{ActionError, MatchConfig, MatchState, PurchaseError};
pub use market::{Market, PlantId, PlantMarket, PowerPlant};
pub use board::{Board, CityBoard, CityId};
pub use resources::{ResourceMarket, ResourceType};
pub use events::{GameEvent, GameEventData};
