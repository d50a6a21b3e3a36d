//! Auction Sub-Protocol State
//!
//! One auction value per match, reset in place between plants. Bidders may
//! act in any order once the auction is open; the cursor only records whose
//! turn the rotation suggests next.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use crate::game::market::PlantId;
use crate::game::player::PlayerId;

/// Transient bidding state for the plant currently on the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    /// An auction is open
    pub in_progress: bool,
    /// Players still allowed to raise, in seating order
    pub eligible_bidders: Vec<PlayerId>,
    /// Highest bid so far
    pub current_bid: u32,
    /// Holder of the highest bid
    pub leading_bidder: Option<PlayerId>,
    /// Plant being auctioned
    pub plant_under_auction: Option<PlantId>,
    /// Plant the leader will drop on winning
    pub pending_discard: Option<PlantId>,
    /// Index into `eligible_bidders` of the next bidder in rotation
    pub bidder_cursor: usize,
}

impl AuctionState {
    /// Closed auction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the auction, keeping the allocation.
    pub fn reset(&mut self) {
        self.in_progress = false;
        self.eligible_bidders.clear();
        self.current_bid = 0;
        self.leading_bidder = None;
        self.plant_under_auction = None;
        self.pending_discard = None;
        self.bidder_cursor = 0;
    }

    /// Open an auction. `bidders` must contain the opener.
    pub fn open(
        &mut self,
        opener: PlayerId,
        bidders: Vec<PlayerId>,
        bid: u32,
        plant: PlantId,
        discard: Option<PlantId>,
    ) {
        self.eligible_bidders = bidders;
        self.in_progress = true;
        self.plant_under_auction = Some(plant);
        self.record_bid(opener, bid, discard);
    }

    /// Record a higher bid from an eligible bidder.
    pub fn raise(&mut self, bidder: PlayerId, bid: u32, discard: Option<PlantId>) {
        self.record_bid(bidder, bid, discard);
    }

    fn record_bid(&mut self, bidder: PlayerId, bid: u32, discard: Option<PlantId>) {
        self.current_bid = bid;
        self.leading_bidder = Some(bidder);
        self.pending_discard = discard;
        if let Some(pos) = self.position(&bidder) {
            self.bidder_cursor = (pos + 1) % self.eligible_bidders.len();
        }
    }

    fn position(&self, player: &PlayerId) -> Option<usize> {
        self.eligible_bidders.iter().position(|p| p == player)
    }

    /// May this player still raise?
    pub fn is_eligible(&self, player: &PlayerId) -> bool {
        self.in_progress && self.position(player).is_some()
    }

    /// Is this player holding the high bid?
    pub fn is_leader(&self, player: &PlayerId) -> bool {
        self.leading_bidder.as_ref() == Some(player)
    }

    /// Drop a bidder. Returns false if they were not eligible.
    pub fn remove_bidder(&mut self, player: &PlayerId) -> bool {
        let Some(pos) = self.position(player) else {
            return false;
        };
        self.eligible_bidders.remove(pos);
        if pos < self.bidder_cursor {
            self.bidder_cursor -= 1;
        }
        if self.bidder_cursor >= self.eligible_bidders.len() {
            self.bidder_cursor = 0;
        }
        true
    }

    /// Next bidder in rotation.
    pub fn next_bidder(&self) -> Option<PlayerId> {
        self.eligible_bidders.get(self.bidder_cursor).copied()
    }

    /// Feed into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bool(self.in_progress);
        hasher.update_u32(self.eligible_bidders.len() as u32);
        for bidder in &self.eligible_bidders {
            hasher.update_uuid(bidder.as_bytes());
        }
        hasher.update_u32(self.current_bid);
        hasher.update_bool(self.leading_bidder.is_some());
        if let Some(leader) = &self.leading_bidder {
            hasher.update_uuid(leader.as_bytes());
        }
        hasher.update_opt_u32(self.plant_under_auction);
        hasher.update_opt_u32(self.pending_discard);
        hasher.update_u32(self.bidder_cursor as u32);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    #[test]
    fn test_open_moves_cursor_past_opener() {
        let mut auction = AuctionState::new();
        auction.open(id(2), vec![id(1), id(2), id(3)], 5, 5, None);

        assert!(auction.in_progress);
        assert!(auction.is_leader(&id(2)));
        assert_eq!(auction.next_bidder(), Some(id(3)));
    }

    #[test]
    fn test_cursor_wraps_and_survives_removal() {
        let mut auction = AuctionState::new();
        auction.open(id(1), vec![id(1), id(2), id(3)], 3, 3, None);
        auction.raise(id(3), 4, Some(4));
        assert_eq!(auction.next_bidder(), Some(id(1)));
        assert_eq!(auction.pending_discard, Some(4));

        assert!(auction.remove_bidder(&id(2)));
        assert_eq!(auction.next_bidder(), Some(id(1)));
        assert!(!auction.remove_bidder(&id(2)));
    }

    #[test]
    fn test_eligible_set_only_shrinks() {
        let mut auction = AuctionState::new();
        auction.open(id(1), vec![id(1), id(2), id(3), id(4)], 3, 3, None);
        let mut last = auction.eligible_bidders.len();

        for (bidder, bid) in [(id(2), 4), (id(3), 5), (id(1), 6)] {
            auction.raise(bidder, bid, None);
            assert_eq!(auction.eligible_bidders.len(), last);
        }
        for passer in [id(4), id(2), id(3)] {
            auction.remove_bidder(&passer);
            assert!(auction.eligible_bidders.len() < last);
            last = auction.eligible_bidders.len();
        }
        assert_eq!(auction.eligible_bidders, vec![id(1)]);
    }

    #[test]
    fn test_reset_clears_in_place() {
        let mut auction = AuctionState::new();
        auction.open(id(1), vec![id(1), id(2)], 7, 7, Some(3));
        auction.reset();

        assert_eq!(auction, AuctionState::default());
        assert!(!auction.is_eligible(&id(1)));
        assert!(auction.eligible_bidders.is_empty());
    }
}
