//! Player Registry
//!
//! Players keyed by stable id. BTreeMap keeps iteration (and therefore
//! seed derivation and tie-breaks) deterministic.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::market::{PlantId, PowerPlant};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
/// Serialized as a hyphenated UUID string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.to_uuid_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_uuid_str(&s).ok_or_else(|| format!("invalid player id: {s}"))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// One seat at the table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Stable id
    pub id: PlayerId,
    /// Display name, unique within the match
    pub name: String,
    /// Money on hand
    pub money: u32,
    /// Owned power plants, in acquisition order
    pub plants: Vec<PowerPlant>,
    /// False once the player has bought a plant (or declined) this round
    pub can_bid: bool,
}

impl Player {
    /// Create a player with starting money.
    pub fn new(id: PlayerId, name: String, money: u32) -> Self {
        Self {
            id,
            name,
            money,
            plants: Vec::new(),
            can_bid: true,
        }
    }

    /// Highest-numbered plant owned, the player-order tie-break.
    pub fn highest_powerplant(&self) -> Option<PlantId> {
        self.plants.iter().map(|p| p.market_cost).max()
    }

    /// Does the player own this plant?
    pub fn owns_plant(&self, plant: PlantId) -> bool {
        self.plants.iter().any(|p| p.market_cost == plant)
    }

    /// Number of plants owned.
    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    /// Can the player pay `amount`?
    #[inline]
    pub fn can_afford(&self, amount: u32) -> bool {
        self.money >= amount
    }

    /// Remove an owned plant, returning it.
    pub fn trash_powerplant(&mut self, plant: PlantId) -> Option<PowerPlant> {
        let idx = self.plants.iter().position(|p| p.market_cost == plant)?;
        Some(self.plants.remove(idx))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// All players of a match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// No players registered?
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Is this id registered?
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    /// Get a player by ID.
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Get a player mutably by ID.
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Players in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// All ids, sorted.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Resolve a display name collision by appending `!` until unique.
    pub fn unique_name(&self, name: &str) -> String {
        let mut candidate = name.to_string();
        while self.players.values().any(|p| p.name == candidate) {
            candidate.push('!');
        }
        candidate
    }

    /// Insert a player under a unique name. Returns the name actually used.
    ///
    /// Re-registering an id replaces nothing; callers check `contains` first.
    pub fn register(&mut self, id: PlayerId, name: &str, money: u32) -> String {
        let name = self.unique_name(name);
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, name.clone(), money));
        name
    }

    /// Players in `order` that may still bid this round.
    pub fn biddable(&self, order: &[PlayerId]) -> Vec<PlayerId> {
        order
            .iter()
            .filter(|id| self.players.get(id).is_some_and(|p| p.can_bid))
            .copied()
            .collect()
    }

    /// Re-enable bidding for everyone (start of round).
    pub fn reset_bidding(&mut self) {
        for player in self.players.values_mut() {
            player.can_bid = true;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
