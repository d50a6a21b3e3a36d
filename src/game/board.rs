//! City Board
//!
//! Sole authority on build legality and price. The engine asks for a quote,
//! then commits; it never checks adjacency itself.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::player::PlayerId;

/// Cities are addressed by name.
pub type CityId = String;

/// Price of the first, second and third generator slot in a city.
pub const SLOT_COSTS: [u32; 3] = [10, 15, 20];

/// Board errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// No city named.
    #[error("build path is empty")]
    EmptyPath,
    /// City not on the map.
    #[error("unknown city: {0}")]
    UnknownCity(String),
    /// Consecutive path cities are not adjacent.
    #[error("{from} is not connected to {to}")]
    NotConnected {
        /// Hop start
        from: String,
        /// Hop end
        to: String,
    },
    /// Path must begin in the player's network.
    #[error("path must start from a city you own, not {0}")]
    MustStartFromOwnedCity(String),
    /// Player already has a generator there.
    #[error("already built in {0}")]
    AlreadyBuilt(String),
    /// Every slot open in this step is taken.
    #[error("{0} has no free slot")]
    CityFull(String),
}

/// What the engine needs from the map.
pub trait Board {
    /// Cities the player has built in.
    fn num_cities(&self, player: &PlayerId) -> usize;

    /// Price a build along `path` (owned city first, target last) without committing.
    fn price_build(&self, player: &PlayerId, path: &[CityId]) -> Result<u32, BoardError>;

    /// Validate, price and commit a build. Returns the cost.
    fn player_purchase(&mut self, player: &PlayerId, path: &[CityId]) -> Result<u32, BoardError>;
}

// =============================================================================
// REFERENCE BOARD
// =============================================================================

/// Weighted city graph with per-city generator slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CityBoard {
    cities: BTreeMap<CityId, Vec<PlayerId>>,
    connections: BTreeMap<(CityId, CityId), u32>,
    max_occupants: usize,
}

impl CityBoard {
    /// Empty board; `max_occupants` is the number of open slots per city.
    pub fn new(max_occupants: usize) -> Self {
        Self {
            cities: BTreeMap::new(),
            connections: BTreeMap::new(),
            max_occupants: max_occupants.clamp(1, SLOT_COSTS.len()),
        }
    }

    /// Add a city.
    pub fn add_city(&mut self, name: &str) {
        self.cities.entry(name.to_string()).or_default();
    }

    /// Connect two cities (undirected).
    pub fn connect(&mut self, a: &str, b: &str, cost: u32) {
        self.add_city(a);
        self.add_city(b);
        self.connections.insert(edge_key(a, b), cost);
    }

    /// Cost of the direct connection, if any.
    pub fn connection_cost(&self, a: &str, b: &str) -> Option<u32> {
        self.connections.get(&edge_key(a, b)).copied()
    }

    /// Players built in a city.
    pub fn owners(&self, city: &str) -> &[PlayerId] {
        self.cities.get(city).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cities the player has built in, sorted.
    pub fn cities_of(&self, player: &PlayerId) -> Vec<&str> {
        self.cities
            .iter()
            .filter(|(_, owners)| owners.contains(player))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Open slots per city.
    pub fn max_occupants(&self) -> usize {
        self.max_occupants
    }

    /// Direct neighbours of a city with their connection cost.
    pub fn neighbors(&self, city: &str) -> Vec<(&str, u32)> {
        self.connections
            .iter()
            .filter_map(|((a, b), &cost)| {
                if a == city {
                    Some((b.as_str(), cost))
                } else if b == city {
                    Some((a.as_str(), cost))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Cheapest single-hop build for a player, with its price.
    ///
    /// A player with no cities is offered the cheapest free city anywhere.
    pub fn cheapest_expansion(&self, player: &PlayerId) -> Option<(Vec<CityId>, u32)> {
        let owned = self.cities_of(player);
        let candidates: Vec<Vec<CityId>> = if owned.is_empty() {
            self.cities.keys().map(|c| vec![c.clone()]).collect()
        } else {
            owned
                .iter()
                .flat_map(|from| {
                    self.neighbors(from)
                        .into_iter()
                        .map(|(to, _)| vec![from.to_string(), to.to_string()])
                })
                .collect()
        };

        candidates
            .into_iter()
            .filter_map(|path| self.price_build(player, &path).ok().map(|cost| (path, cost)))
            .min_by_key(|(_, cost)| *cost)
    }

    /// Small bundled region used by the server and demo.
    pub fn sample_region() -> Self {
        let mut board = Self::new(1);
        for (a, b, cost) in [
            ("Hamburg", "Bremen", 11),
            ("Hamburg", "Hannover", 17),
            ("Hamburg", "Berlin", 24),
            ("Bremen", "Hannover", 10),
            ("Hannover", "Kassel", 15),
            ("Hannover", "Magdeburg", 15),
            ("Berlin", "Magdeburg", 10),
            ("Magdeburg", "Leipzig", 10),
            ("Leipzig", "Dresden", 13),
            ("Berlin", "Dresden", 19),
            ("Kassel", "Leipzig", 20),
        ] {
            board.connect(a, b, cost);
        }
        board
    }
}

impl Board for CityBoard {
    fn num_cities(&self, player: &PlayerId) -> usize {
        self.cities.values().filter(|owners| owners.contains(player)).count()
    }

    fn price_build(&self, player: &PlayerId, path: &[CityId]) -> Result<u32, BoardError> {
        let target = path.last().ok_or(BoardError::EmptyPath)?;
        for city in path {
            if !self.cities.contains_key(city) {
                return Err(BoardError::UnknownCity(city.clone()));
            }
        }

        let occupants = self.owners(target);
        if occupants.contains(player) {
            return Err(BoardError::AlreadyBuilt(target.clone()));
        }
        if occupants.len() >= self.max_occupants {
            return Err(BoardError::CityFull(target.clone()));
        }

        // First build may go anywhere; afterwards the network must be extended
        let start = &path[0];
        let networked = self.num_cities(player) > 0;
        if networked && (path.len() < 2 || !self.owners(start).contains(player)) {
            return Err(BoardError::MustStartFromOwnedCity(start.clone()));
        }
        if !networked && path.len() > 1 {
            return Err(BoardError::MustStartFromOwnedCity(start.clone()));
        }

        let mut cost = 0;
        for hop in path.windows(2) {
            cost += self.connection_cost(&hop[0], &hop[1]).ok_or_else(|| {
                BoardError::NotConnected { from: hop[0].clone(), to: hop[1].clone() }
            })?;
        }
        let slot = SLOT_COSTS.get(occupants.len()).copied().unwrap_or(SLOT_COSTS[2]);

        Ok(cost + slot)
    }

    fn player_purchase(&mut self, player: &PlayerId, path: &[CityId]) -> Result<u32, BoardError> {
        let cost = self.price_build(player, path)?;
        if let Some(target) = path.last() {
            self.cities.entry(target.clone()).or_default().push(*player);
        }
        Ok(cost)
    }
}

fn edge_key(a: &str, b: &str) -> (CityId, CityId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
