//! Power Plant Market
//!
//! The engine only buys from the current offer and asks the market to trash
//! its cheapest plants; the deck and refill rule live behind [`Market`].

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::resources::ResourceType::{self, Clean, Coal, Garbage, Hybrid, Oil, Uranium};

/// A plant is identified by its market cost, which is also its rank.
pub type PlantId = u32;

/// Number of plants on display (current offer + futures).
pub const VISIBLE_PLANTS: usize = 8;

/// Number of displayed plants that can be bought right now.
pub const CURRENT_MARKET_SIZE: usize = 4;

// =============================================================================
// POWER PLANT
// =============================================================================

/// An acquirable power plant card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowerPlant {
    /// Minimum opening bid; doubles as the plant id.
    pub market_cost: PlantId,
    /// Fuel it burns.
    pub resource_type: ResourceType,
    /// Fuel units per run.
    pub resource_cost: u32,
    /// Cities it can power per run.
    pub generators: u32,
}

impl PowerPlant {
    /// Create a plant.
    pub const fn new(
        market_cost: PlantId,
        resource_type: ResourceType,
        resource_cost: u32,
        generators: u32,
    ) -> Self {
        Self { market_cost, resource_type, resource_cost, generators }
    }

    /// Plant id (its market cost).
    #[inline]
    pub fn id(&self) -> PlantId {
        self.market_cost
    }
}

/// The standard deck, ascending.
pub const STANDARD_PLANTS: [PowerPlant; 42] = [
    PowerPlant::new(3, Oil, 2, 1),
    PowerPlant::new(4, Coal, 2, 1),
    PowerPlant::new(5, Hybrid, 2, 1),
    PowerPlant::new(6, Garbage, 1, 1),
    PowerPlant::new(7, Oil, 3, 2),
    PowerPlant::new(8, Coal, 3, 2),
    PowerPlant::new(9, Oil, 1, 1),
    PowerPlant::new(10, Coal, 2, 2),
    PowerPlant::new(11, Uranium, 1, 2),
    PowerPlant::new(12, Hybrid, 2, 2),
    PowerPlant::new(13, Clean, 0, 1),
    PowerPlant::new(14, Garbage, 2, 2),
    PowerPlant::new(15, Coal, 2, 3),
    PowerPlant::new(16, Oil, 2, 3),
    PowerPlant::new(17, Uranium, 1, 2),
    PowerPlant::new(18, Clean, 0, 2),
    PowerPlant::new(19, Garbage, 2, 3),
    PowerPlant::new(20, Coal, 3, 5),
    PowerPlant::new(21, Hybrid, 2, 4),
    PowerPlant::new(22, Clean, 0, 2),
    PowerPlant::new(23, Uranium, 1, 3),
    PowerPlant::new(24, Garbage, 2, 4),
    PowerPlant::new(25, Coal, 2, 5),
    PowerPlant::new(26, Oil, 2, 5),
    PowerPlant::new(27, Clean, 0, 3),
    PowerPlant::new(28, Uranium, 1, 4),
    PowerPlant::new(29, Hybrid, 1, 4),
    PowerPlant::new(30, Garbage, 3, 6),
    PowerPlant::new(31, Coal, 3, 6),
    PowerPlant::new(32, Oil, 3, 6),
    PowerPlant::new(33, Clean, 0, 4),
    PowerPlant::new(34, Uranium, 1, 5),
    PowerPlant::new(35, Oil, 1, 5),
    PowerPlant::new(36, Coal, 3, 7),
    PowerPlant::new(37, Clean, 0, 4),
    PowerPlant::new(38, Garbage, 3, 7),
    PowerPlant::new(39, Uranium, 1, 6),
    PowerPlant::new(40, Oil, 2, 6),
    PowerPlant::new(42, Coal, 2, 6),
    PowerPlant::new(44, Clean, 0, 5),
    PowerPlant::new(46, Hybrid, 3, 7),
    PowerPlant::new(50, Clean, 0, 6),
];

// =============================================================================
// MARKET CONTRACT
// =============================================================================

/// Market errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Plant is not in the current offer.
    #[error("power plant {0} is not currently offered")]
    NotOffered(PlantId),
}

/// What the engine needs from the plant market.
pub trait Market {
    /// Plants that can be bought now, ascending by market cost.
    fn currently_available(&self) -> &[PowerPlant];

    /// Displayed plants that are not yet buyable, ascending.
    fn futures(&self) -> &[PowerPlant];

    /// Remove a plant from the current offer and return it.
    fn buy(&mut self, plant: PlantId) -> Result<PowerPlant, MarketError>;

    /// Discard every offered plant numbered at or below `threshold`.
    /// Returns the discarded ids, lowest first.
    fn trash_low_powerplants(&mut self, threshold: usize) -> Vec<PlantId>;

    /// Look up a plant in the current offer.
    fn offered(&self, plant: PlantId) -> Option<&PowerPlant> {
        self.currently_available().iter().find(|p| p.market_cost == plant)
    }
}

// =============================================================================
// REFERENCE MARKET
// =============================================================================

/// Eight visible plants over a draw deck.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlantMarket {
    visible: Vec<PowerPlant>,
    deck: Vec<PowerPlant>,
}

impl PlantMarket {
    /// Build a market from a display and a deck (top of deck = last element).
    pub fn from_parts(mut visible: Vec<PowerPlant>, deck: Vec<PowerPlant>) -> Self {
        visible.sort_by_key(|p| p.market_cost);
        let mut market = Self { visible, deck };
        market.refill();
        market
    }

    /// Standard setup: plants 3-10 on display, the rest shuffled with `seed`.
    pub fn standard(seed: u64) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let (visible, rest) = STANDARD_PLANTS.split_at(VISIBLE_PLANTS);
        let mut deck = rest.to_vec();
        rng.shuffle(&mut deck);
        Self::from_parts(visible.to_vec(), deck)
    }

    /// Plants left in the draw deck.
    pub fn deck_size(&self) -> usize {
        self.deck.len()
    }

    fn split_point(&self) -> usize {
        self.visible.len().min(CURRENT_MARKET_SIZE)
    }

    fn refill(&mut self) {
        while self.visible.len() < VISIBLE_PLANTS {
            match self.deck.pop() {
                Some(plant) => self.visible.push(plant),
                None => break,
            }
        }
        self.visible.sort_by_key(|p| p.market_cost);
    }
}

impl Market for PlantMarket {
    fn currently_available(&self) -> &[PowerPlant] {
        &self.visible[..self.split_point()]
    }

    fn futures(&self) -> &[PowerPlant] {
        &self.visible[self.split_point()..]
    }

    fn buy(&mut self, plant: PlantId) -> Result<PowerPlant, MarketError> {
        let idx = self
            .currently_available()
            .iter()
            .position(|p| p.market_cost == plant)
            .ok_or(MarketError::NotOffered(plant))?;
        let bought = self.visible.remove(idx);
        self.refill();
        Ok(bought)
    }

    fn trash_low_powerplants(&mut self, threshold: usize) -> Vec<PlantId> {
        let mut trashed = Vec::new();
        // Refills can surface another low plant, so re-check after each draw
        while let Some(lowest) = self.visible.first() {
            if lowest.market_cost as usize > threshold {
                break;
            }
            trashed.push(self.visible.remove(0).market_cost);
            self.refill();
        }
        trashed
    }
}

// =============================================================================
// TESTS
// =============================================================================
