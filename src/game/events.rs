//! Game Events
//!
//! Everything the engine changes is also recorded as an event, drained by
//! the session and broadcast to the match.

use serde::{Serialize, Deserialize};

use crate::game::market::PlantId;
use crate::game::phase::Phase;
use crate::game::player::PlayerId;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// Player joined the lobby
    PlayerRegistered {
        player_id: PlayerId,
        name: String,
    },

    /// Seating for the round was computed
    OrderDetermined {
        order: Vec<PlayerId>,
    },

    /// Phase boundary crossed
    PhaseChanged {
        old_phase: Phase,
        new_phase: Phase,
        order_reversed: bool,
    },

    /// Next seat within the same phase
    TurnAdvanced {
        player_id: PlayerId,
    },

    /// Seat skipped after the turn timer ran out
    TurnTimedOut {
        player_id: PlayerId,
        phase: Phase,
    },

    /// Auction opened on a plant
    AuctionOpened {
        player_id: PlayerId,
        plant: PlantId,
        bid: u32,
        bidders: Vec<PlayerId>,
    },

    /// High bid raised
    BidRaised {
        player_id: PlayerId,
        plant: PlantId,
        bid: u32,
    },

    /// Bidder dropped out of the open auction
    BidderPassed {
        player_id: PlayerId,
        plant: PlantId,
    },

    /// Seat declined to open an auction this round
    OpeningPassed {
        player_id: PlayerId,
    },

    /// Plant awarded
    AuctionWon {
        player_id: PlayerId,
        plant: PlantId,
        price: u32,
    },

    /// Winner dropped a plant to stay within the limit
    PlantDiscarded {
        player_id: PlayerId,
        plant: PlantId,
    },

    /// Generator built at the end of a path
    GeneratorBuilt {
        player_id: PlayerId,
        city: String,
        cost: u32,
        cities_owned: usize,
    },

    /// Market discarded low plants
    PlantsTrashed {
        plants: Vec<PlantId>,
    },

    /// Seat finished a non-auction turn
    TurnEnded {
        player_id: PlayerId,
        phase: Phase,
    },
}

/// A game event stamped with its round and sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Round when the event occurred
    pub round: u32,

    /// Monotonic per match
    pub seq: u64,

    /// Player involved
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(round: u32, seq: u64, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::PlayerRegistered { player_id, .. }
            | GameEventData::TurnAdvanced { player_id }
            | GameEventData::TurnTimedOut { player_id, .. }
            | GameEventData::AuctionOpened { player_id, .. }
            | GameEventData::BidRaised { player_id, .. }
            | GameEventData::BidderPassed { player_id, .. }
            | GameEventData::OpeningPassed { player_id }
            | GameEventData::AuctionWon { player_id, .. }
            | GameEventData::PlantDiscarded { player_id, .. }
            | GameEventData::GeneratorBuilt { player_id, .. }
            | GameEventData::TurnEnded { player_id, .. } => Some(*player_id),
            GameEventData::OrderDetermined { .. }
            | GameEventData::PhaseChanged { .. }
            | GameEventData::PlantsTrashed { .. } => None,
        };

        Self {
            round,
            seq,
            player_id,
            data,
        }
    }
}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq.cmp(&other.seq)
    }
}
