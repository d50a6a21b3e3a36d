//! Match State
//!
//! The turn/phase engine. A plain synchronous value: every operation either
//! rejects without touching anything or applies its whole effect, then may
//! advance the seat and phase. Callers serialize access per match.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::{derive_match_seed, DeterministicRng};
use crate::game::auction::AuctionState;
use crate::game::board::{Board, BoardError, CityBoard, CityId};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::market::{Market, MarketError, PlantId, PlantMarket, PowerPlant};
use crate::game::order::{first_round_order, ranked_order};
use crate::game::phase::{transition_between, OrderEffect, Phase, Transition};
use crate::game::player::{PlayerId, PlayerRegistry};
use crate::game::resources::ResourceMarket;

// =============================================================================
// CONFIG
// =============================================================================

/// Per-match rules that vary by table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Money each player starts with
    pub starting_money: u32,
    /// Players required to start
    pub min_players: usize,
    /// Seats at the table
    pub max_players: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            starting_money: 50,
            min_players: 2,
            max_players: 6,
        }
    }
}

impl MatchConfig {
    /// Plants a player may hold: 4 at a two-player table, 3 otherwise.
    pub fn max_plants(&self, player_count: usize) -> usize {
        if player_count == 2 { 4 } else { 3 }
    }
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug)]
pub struct MatchState<M: Market = PlantMarket, B: Board = CityBoard> {
    /// Match identifier
    pub match_id: [u8; 16],

    /// Seed the RNG was derived from
    pub rng_seed: u64,

    /// Deterministic RNG
    pub rng: DeterministicRng,

    /// Round number, 1-based once started
    pub round: u32,

    /// Current phase
    pub phase: Phase,

    /// Index into `player_order` of the seat to act
    pub current_player: usize,

    /// Seating for the current phase
    pub player_order: Vec<PlayerId>,

    /// All players
    pub players: PlayerRegistry,

    /// The match's single auction value
    pub auction: AuctionState,

    /// Plant market
    pub market: M,

    /// City board
    pub board: B,

    /// Fuel market
    pub resources: ResourceMarket,

    /// Table rules
    pub config: MatchConfig,

    /// Has `start_match` succeeded
    pub started: bool,

    pending_events: Vec<GameEvent>,
    event_seq: u64,
}

impl MatchState {
    /// New lobby with the standard market and the sample board.
    pub fn new(match_id: [u8; 16], config: MatchConfig) -> Self {
        let deck_seed = derive_match_seed(&match_id, &[]);
        Self::with_collaborators(
            match_id,
            config,
            PlantMarket::standard(deck_seed),
            CityBoard::sample_region(),
        )
    }
}

impl<M: Market, B: Board> MatchState<M, B> {
    /// New lobby over the given market and board.
    pub fn with_collaborators(match_id: [u8; 16], config: MatchConfig, market: M, board: B) -> Self {
        Self {
            match_id,
            rng_seed: 0,
            rng: DeterministicRng::new(0),
            round: 0,
            phase: Phase::DeterminePlayerOrder,
            current_player: 0,
            player_order: Vec::new(),
            players: PlayerRegistry::new(),
            auction: AuctionState::new(),
            market,
            board,
            resources: ResourceMarket::standard(),
            config,
            started: false,
            pending_events: Vec::new(),
            event_seq: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Registration and queries
    // -------------------------------------------------------------------------

    /// Register a player before the match starts. Returns the unique name used.
    pub fn add_player(&mut self, id: PlayerId, name: &str) -> Result<String, ActionError> {
        if self.started {
            return Err(ActionError::MatchAlreadyStarted);
        }
        if self.players.contains(&id) {
            return Err(ActionError::InvalidAction(format!("player {id} is already registered")));
        }
        if self.players.len() >= self.config.max_players {
            return Err(ActionError::MatchFull);
        }

        let name = self.players.register(id, name, self.config.starting_money);
        info!(player = %id, name = %name, "Player registered");
        self.push_event(GameEventData::PlayerRegistered { player_id: id, name: name.clone() });
        Ok(name)
    }

    /// Display name of a player.
    pub fn player_name(&self, id: &PlayerId) -> Option<&str> {
        self.players.get(id).map(|p| p.name.as_str())
    }

    /// Can the player pay `amount`? Unknown players cannot.
    pub fn player_can_afford(&self, id: &PlayerId, amount: u32) -> bool {
        self.players.get(id).is_some_and(|p| p.can_afford(amount))
    }

    /// Player whose turn it is.
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.player_order.get(self.current_player).copied()
    }

    /// Cities a player has built in.
    pub fn cities_of(&self, id: &PlayerId) -> usize {
        self.board.num_cities(id)
    }

    /// Number of registered players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    // -------------------------------------------------------------------------
    // Phase state machine
    // -------------------------------------------------------------------------

    /// Seed the RNG from the roster and enter the first auction.
    pub fn start_match(&mut self) -> Result<(), ActionError> {
        if self.started {
            return Err(ActionError::MatchAlreadyStarted);
        }
        if self.players.len() < self.config.min_players {
            return Err(ActionError::NotEnoughPlayers);
        }

        let roster: Vec<[u8; 16]> = self.players.ids().iter().map(|id| id.0).collect();
        self.rng_seed = derive_match_seed(&self.match_id, &roster);
        self.rng = DeterministicRng::new(self.rng_seed);
        self.started = true;
        self.round = 1;
        self.phase = Phase::DeterminePlayerOrder;
        self.current_player = 0;

        info!(
            match_id = %hex::encode(&self.match_id[..4]),
            players = roster.len(),
            "Match started"
        );
        self.step_phase();
        Ok(())
    }

    /// Move to the next seat, or to the next phase after the last seat.
    pub fn advance(&mut self) {
        if self.current_player + 1 < self.player_order.len() {
            self.current_player += 1;
            if let Some(next) = self.current_player_id() {
                debug!(player = %next, phase = %self.phase, "Turn advanced");
                self.push_event(GameEventData::TurnAdvanced { player_id: next });
            }
            return;
        }

        self.current_player = 0;
        if self.phase == Phase::Auction {
            self.settle_open_auction();
        }
        self.step_phase();
    }

    /// Forced advance after a turn timeout. Returns the seat that was skipped.
    pub fn resolve_turn(&mut self) -> Option<PlayerId> {
        if !self.started {
            return None;
        }
        let skipped = self.current_player_id()?;
        warn!(player = %skipped, phase = %self.phase, round = self.round, "Turn timed out");
        self.push_event(GameEventData::TurnTimedOut { player_id: skipped, phase: self.phase });
        self.advance();
        Some(skipped)
    }

    /// Leave the current phase along its table edge.
    fn step_phase(&mut self) {
        match transition_between(self.phase, self.phase.next()) {
            Ok(transition) => self.apply_transition(transition),
            Err(e) => error!(error = %e, "Phase cycle left the table"),
        }
    }

    /// An auction still open when the phase ends goes to its leader at the current bid.
    fn settle_open_auction(&mut self) {
        if !self.auction.in_progress {
            return;
        }
        if let (Some(winner), Some(plant)) = (self.auction.leading_bidder, self.auction.plant_under_auction) {
            match self.market.buy(plant) {
                Ok(bought) => {
                    let (price, discard) = (self.auction.current_bid, self.auction.pending_discard);
                    debug!(player = %winner, plant, price, "Open auction settled at phase end");
                    self.grant_plant(winner, bought, price, discard);
                }
                Err(e) => warn!(plant, error = %e, "Open auction dropped at phase end"),
            }
        }
        self.auction.reset();
    }

    fn apply_transition(&mut self, transition: Transition) {
        debug_assert_eq!(transition.from, self.phase);

        match transition.order {
            OrderEffect::Keep => {}
            OrderEffect::Reverse => self.player_order.reverse(),
            OrderEffect::Recompute => self.determine_player_order(),
        }

        let old_phase = self.phase;
        self.phase = transition.to;
        self.current_player = 0;

        info!(round = self.round, from = %old_phase, to = %self.phase, "Phase changed");
        self.push_event(GameEventData::PhaseChanged {
            old_phase,
            new_phase: self.phase,
            order_reversed: transition.order == OrderEffect::Reverse,
        });

        // Determining order is instantaneous: start the round and move on
        if self.phase == Phase::DeterminePlayerOrder {
            self.begin_round();
            self.step_phase();
        }
    }

    fn begin_round(&mut self) {
        self.round += 1;
        self.players.reset_bidding();
        self.auction.reset();
    }

    fn determine_player_order(&mut self) {
        self.player_order = if self.round <= 1 {
            first_round_order(&self.players.ids(), &mut self.rng)
        } else {
            let board = &self.board;
            ranked_order(&self.players, |id| board.num_cities(id))
        };
        self.push_event(GameEventData::OrderDetermined { order: self.player_order.clone() });
    }

    fn require_phase(&self, phase: Phase) -> Result<(), ActionError> {
        if !self.started {
            return Err(ActionError::MatchNotStarted);
        }
        if self.phase != phase {
            return Err(ActionError::InvalidAction(format!(
                "not allowed during {}",
                self.phase
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Auction
    // -------------------------------------------------------------------------

    /// Open an auction, or raise the one in progress.
    ///
    /// With a single player left able to bid, opening wins the plant outright.
    pub fn auction_bid(
        &mut self,
        player: PlayerId,
        bid: u32,
        plant: PlantId,
        discard: Option<PlantId>,
    ) -> Result<(), ActionError> {
        self.require_phase(Phase::Auction)?;
        let bidder = self.players.get(&player).ok_or(ActionError::UnknownPlayer(player))?;

        if !bidder.can_bid {
            return Err(ActionError::InvalidAction(format!(
                "{} already bought a plant this round",
                bidder.name
            )));
        }
        if !bidder.can_afford(bid) {
            return Err(ActionError::InvalidAction(format!(
                "bid {bid} exceeds {}'s money ({})",
                bidder.name, bidder.money
            )));
        }
        let limit = self.config.max_plants(self.players.len());
        match discard {
            None if bidder.plant_count() >= limit => {
                return Err(ActionError::InvalidAction(format!(
                    "holding {limit} plants, a plant to discard must be named"
                )));
            }
            Some(trash) if !bidder.owns_plant(trash) => {
                return Err(ActionError::InvalidAction(format!(
                    "cannot discard plant {trash}: not owned"
                )));
            }
            _ => {}
        }

        if self.auction.in_progress {
            if !self.auction.is_eligible(&player) {
                return Err(ActionError::InvalidAction("already passed on this auction".into()));
            }
            if self.auction.plant_under_auction != Some(plant) {
                return Err(ActionError::InvalidAction(format!(
                    "plant {plant} is not under auction"
                )));
            }
            if bid <= self.auction.current_bid {
                return Err(ActionError::InvalidAction(format!(
                    "bid must exceed {}",
                    self.auction.current_bid
                )));
            }

            self.auction.raise(player, bid, discard);
            debug!(player = %player, plant, bid, "Bid raised");
            self.push_event(GameEventData::BidRaised { player_id: player, plant, bid });
            return Ok(());
        }

        if self.current_player_id() != Some(player) {
            return Err(ActionError::ProtocolViolation(
                "only the current seat may open an auction".into(),
            ));
        }
        if self.market.offered(plant).is_none() {
            return Err(MarketError::NotOffered(plant).into());
        }

        let bidders = self.players.biddable(&self.player_order);
        if bidders.len() == 1 {
            // Nobody left to bid against
            let bought = self.buy_from_market(plant)?;
            self.grant_plant(player, bought, bid, discard);
            self.auction.reset();
            self.advance();
            return Ok(());
        }

        info!(player = %player, plant, bid, bidders = bidders.len(), "Auction opened");
        self.push_event(GameEventData::AuctionOpened {
            player_id: player,
            plant,
            bid,
            bidders: bidders.clone(),
        });
        self.auction.open(player, bidders, bid, plant, discard);
        Ok(())
    }

    /// Drop out of the open auction, or decline to open one.
    pub fn auction_pass(&mut self, player: PlayerId) -> Result<(), ActionError> {
        self.require_phase(Phase::Auction)?;
        if !self.players.contains(&player) {
            return Err(ActionError::UnknownPlayer(player));
        }

        if !self.auction.in_progress {
            if self.current_player_id() != Some(player) {
                return Err(ActionError::ProtocolViolation(
                    "no auction is open and it is not your turn".into(),
                ));
            }
            if let Some(p) = self.players.get_mut(&player) {
                p.can_bid = false;
            }
            debug!(player = %player, "Declined to open an auction");
            self.push_event(GameEventData::OpeningPassed { player_id: player });
            self.advance();
            return Ok(());
        }

        if !self.auction.is_eligible(&player) {
            return Err(ActionError::InvalidAction("already passed on this auction".into()));
        }
        if self.auction.is_leader(&player) {
            return Err(ActionError::InvalidAction("the leading bidder cannot pass".into()));
        }
        let plant = self
            .auction
            .plant_under_auction
            .ok_or_else(|| ActionError::ProtocolViolation("auction has no plant".into()))?;

        if self.auction.eligible_bidders.len() > 2 {
            self.auction.remove_bidder(&player);
            self.push_event(GameEventData::BidderPassed { player_id: player, plant });
            return Ok(());
        }

        // This pass leaves a single bidder: the leader wins
        let winner = self
            .auction
            .leading_bidder
            .ok_or_else(|| ActionError::ProtocolViolation("auction has no leader".into()))?;
        let bought = self.buy_from_market(plant)?;

        self.auction.remove_bidder(&player);
        self.push_event(GameEventData::BidderPassed { player_id: player, plant });
        let (price, discard) = (self.auction.current_bid, self.auction.pending_discard);
        self.grant_plant(winner, bought, price, discard);
        self.auction.reset();

        // A win out of turn leaves the initiative with the current seat
        if self.current_player_id() == Some(winner) {
            self.advance();
        }
        Ok(())
    }

    fn buy_from_market(&mut self, plant: PlantId) -> Result<PowerPlant, ActionError> {
        self.market.buy(plant).map_err(ActionError::from)
    }

    fn grant_plant(&mut self, winner: PlayerId, plant: PowerPlant, price: u32, discard: Option<PlantId>) {
        let Some(p) = self.players.get_mut(&winner) else {
            return;
        };
        p.money = p.money.saturating_sub(price);
        let discarded = discard.and_then(|trash| p.trash_powerplant(trash));
        p.plants.push(plant);
        p.can_bid = false;

        info!(player = %winner, plant = plant.market_cost, price, "Auction won");
        self.push_event(GameEventData::AuctionWon {
            player_id: winner,
            plant: plant.market_cost,
            price,
        });
        if let Some(old) = discarded {
            self.push_event(GameEventData::PlantDiscarded {
                player_id: winner,
                plant: old.market_cost,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------------

    /// Build a generator at the end of `path`. Returns the cost paid.
    pub fn build_generator(&mut self, player: PlayerId, path: &[CityId]) -> Result<u32, ActionError> {
        self.require_phase(Phase::BuildGenerators)?;
        let money = self
            .players
            .get(&player)
            .map(|p| p.money)
            .ok_or(ActionError::UnknownPlayer(player))?;
        if self.current_player_id() != Some(player) {
            return Err(ActionError::InvalidAction("not your turn to build".into()));
        }

        let quote = self.board.price_build(&player, path)?;
        if quote > money {
            return Err(PurchaseError::Unaffordable { cost: quote, money }.into());
        }
        let cost = self.board.player_purchase(&player, path)?;
        if let Some(p) = self.players.get_mut(&player) {
            p.money = p.money.saturating_sub(cost);
        }

        let cities_owned = self.board.num_cities(&player);
        let city = path.last().cloned().unwrap_or_default();
        info!(player = %player, city = %city, cost, cities_owned, "Generator built");
        self.push_event(GameEventData::GeneratorBuilt {
            player_id: player,
            city,
            cost,
            cities_owned,
        });

        let cheapest = self.market.currently_available().first().map(|p| p.market_cost as usize);
        if cheapest.is_some_and(|threshold| cities_owned >= threshold) {
            let trashed = self.market.trash_low_powerplants(cities_owned);
            if !trashed.is_empty() {
                info!(?trashed, "Low plants trashed");
                self.push_event(GameEventData::PlantsTrashed { plants: trashed });
            }
        }

        Ok(cost)
    }

    /// Current seat finishes its turn outside the auction.
    pub fn end_turn(&mut self, player: PlayerId) -> Result<(), ActionError> {
        if !self.started {
            return Err(ActionError::MatchNotStarted);
        }
        if matches!(self.phase, Phase::Auction | Phase::DeterminePlayerOrder) {
            return Err(ActionError::InvalidAction(format!(
                "cannot end turn during {}; bid or pass instead",
                self.phase
            )));
        }
        if !self.players.contains(&player) {
            return Err(ActionError::UnknownPlayer(player));
        }
        if self.current_player_id() != Some(player) {
            return Err(ActionError::InvalidAction("not your turn".into()));
        }

        self.push_event(GameEventData::TurnEnded { player_id: player, phase: self.phase });
        self.advance();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Hashing and events
    // -------------------------------------------------------------------------

    /// Compute a fingerprint of the observable state.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.round, self.rng_seed, |hasher| {
            hasher.update_bool(self.started);
            hasher.update_u8(self.phase.as_u8());
            hasher.update_u32(self.current_player as u32);

            hasher.update_u32(self.player_order.len() as u32);
            for id in &self.player_order {
                hasher.update_uuid(id.as_bytes());
            }

            for player in self.players.iter() {
                hasher.update_uuid(player.id.as_bytes());
                hasher.update_str(&player.name);
                hasher.update_u32(player.money);
                hasher.update_bool(player.can_bid);
                hasher.update_u32(self.board.num_cities(&player.id) as u32);
                hasher.update_u32(player.plants.len() as u32);
                for plant in &player.plants {
                    hasher.update_u32(plant.market_cost);
                }
            }

            self.auction.hash_into(hasher);

            for plant in self.market.currently_available().iter().chain(self.market.futures()) {
                hasher.update_u32(plant.market_cost);
            }
        })
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn push_event(&mut self, data: GameEventData) {
        self.event_seq += 1;
        self.pending_events.push(GameEvent::new(self.round, self.event_seq, data));
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A collaborator refused a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// Plant market said no
    #[error(transparent)]
    Market(#[from] MarketError),
    /// Board said no
    #[error(transparent)]
    Board(#[from] BoardError),
    /// Price exceeds the player's money
    #[error("costs {cost}, only {money} available")]
    Unaffordable {
        /// Quoted price
        cost: u32,
        /// Money on hand
        money: u32,
    },
}

/// Rejected engine operation. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The player may not do this now
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Market or board rejected the purchase
    #[error("illegal purchase: {0}")]
    IllegalPurchase(#[from] PurchaseError),

    /// Auction action out of protocol
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No such player in this match
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Action before `start_match`
    #[error("match has not started")]
    MatchNotStarted,

    /// Lobby action after `start_match`
    #[error("match already started")]
    MatchAlreadyStarted,

    /// Below the minimum player count
    #[error("not enough players to start")]
    NotEnoughPlayers,

    /// No seat left
    #[error("match is full")]
    MatchFull,
}

impl From<MarketError> for ActionError {
    fn from(err: MarketError) -> Self {
        ActionError::IllegalPurchase(PurchaseError::Market(err))
    }
}

impl From<BoardError> for ActionError {
    fn from(err: BoardError) -> Self {
        ActionError::IllegalPurchase(PurchaseError::Board(err))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::resources::ResourceType;

    fn id(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn plant(cost: u32) -> PowerPlant {
        PowerPlant::new(cost, ResourceType::Coal, 2, 1)
    }

    fn lobby(n: u8) -> MatchState {
        let mut state = MatchState::new([7; 16], MatchConfig::default());
        for i in 1..=n {
            state.add_player(id(i), &format!("p{i}")).unwrap();
        }
        state
    }

    fn started(n: u8) -> MatchState {
        let mut state = lobby(n);
        state.start_match().unwrap();
        state.take_events();
        state
    }

    fn seat(state: &MatchState, i: usize) -> PlayerId {
        state.player_order[i]
    }

    /// Pass or end turn with whoever is seated until `phase` is reached.
    fn drive_to<M: Market, B: Board>(state: &mut MatchState<M, B>, phase: Phase) {
        while state.phase != phase {
            let current = state.current_player_id().unwrap();
            if state.phase == Phase::Auction {
                state.auction_pass(current).unwrap();
            } else {
                state.end_turn(current).unwrap();
            }
        }
    }

    #[test]
    fn test_lobby_rules() {
        let mut state = lobby(1);
        assert_eq!(state.start_match(), Err(ActionError::NotEnoughPlayers));
        assert_eq!(state.add_player(id(1), "again"), Err(ActionError::InvalidAction(
            format!("player {} is already registered", id(1))
        )));
        assert_eq!(state.add_player(id(2), "p1").unwrap(), "p1!");

        state.start_match().unwrap();
        assert_eq!(state.add_player(id(3), "late"), Err(ActionError::MatchAlreadyStarted));
        assert_eq!(state.start_match(), Err(ActionError::MatchAlreadyStarted));
    }

    #[test]
    fn test_match_full() {
        let mut state = lobby(6);
        assert_eq!(state.add_player(id(9), "seventh"), Err(ActionError::MatchFull));
    }

    #[test]
    fn test_start_enters_first_auction() {
        let state = started(3);
        assert!(state.started);
        assert_eq!(state.round, 1);
        assert_eq!(state.phase, Phase::Auction);
        assert_eq!(state.current_player, 0);

        let mut sorted = state.player_order.clone();
        sorted.sort();
        assert_eq!(sorted, state.players.ids());
    }

    #[test]
    fn test_same_roster_same_first_order() {
        let a = started(4);
        let b = started(4);
        assert_eq!(a.player_order, b.player_order);
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_actions_before_start() {
        let mut state = lobby(3);
        assert_eq!(state.auction_pass(id(1)), Err(ActionError::MatchNotStarted));
        assert_eq!(state.end_turn(id(1)), Err(ActionError::MatchNotStarted));
        assert_eq!(state.resolve_turn(), None);
    }

    // -------------------------------------------------------------------------
    // Phase cycle
    // -------------------------------------------------------------------------

    #[test]
    fn test_full_cycle_reverses_exactly_twice() {
        let mut state = started(3);
        let auction_order = state.player_order.clone();

        drive_to(&mut state, Phase::BuyResources);
        let mut reversed = auction_order.clone();
        reversed.reverse();
        assert_eq!(state.player_order, reversed);

        drive_to(&mut state, Phase::BuildGenerators);
        assert_eq!(state.player_order, reversed);

        drive_to(&mut state, Phase::Bureaucracy);
        assert_eq!(state.player_order, auction_order);

        for i in 0..3 {
            state.end_turn(seat(&state, i)).unwrap();
        }
        // Order determination is instantaneous; the next auction is already open for bids
        assert_eq!(state.phase, Phase::Auction);
        assert_eq!(state.round, 2);
        assert!(state.players.iter().all(|p| p.can_bid));
        assert!(!state.auction.in_progress);

        let changes: Vec<_> = state
            .take_events()
            .into_iter()
            .filter_map(|e| match e.data {
                GameEventData::PhaseChanged { old_phase, new_phase, order_reversed } => {
                    Some((old_phase, new_phase, order_reversed))
                }
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![
            (Phase::Auction, Phase::BuyResources, true),
            (Phase::BuyResources, Phase::BuildGenerators, false),
            (Phase::BuildGenerators, Phase::Bureaucracy, true),
            (Phase::Bureaucracy, Phase::DeterminePlayerOrder, false),
            (Phase::DeterminePlayerOrder, Phase::Auction, false),
        ]);
    }

    #[test]
    fn test_bureaucracy_waits_for_every_seat() {
        let mut state = started(3);
        drive_to(&mut state, Phase::Bureaucracy);

        for i in 0..3 {
            assert_eq!(state.phase, Phase::Bureaucracy);
            assert_eq!(state.current_player, i);
            state.end_turn(seat(&state, i)).unwrap();
        }
        assert_eq!(state.phase, Phase::Auction);
        assert_eq!(state.round, 2);
    }

    #[test]
    fn test_resolve_turn_twice_advances_two_seats() {
        let mut state = started(3);
        let first = seat(&state, 0);
        let second = seat(&state, 1);

        assert_eq!(state.resolve_turn(), Some(first));
        assert_eq!(state.current_player, 1);
        assert_eq!(state.resolve_turn(), Some(second));
        assert_eq!(state.current_player, 2);
        assert_eq!(state.phase, Phase::Auction);

        let timeouts = state
            .take_events()
            .iter()
            .filter(|e| matches!(e.data, GameEventData::TurnTimedOut { .. }))
            .count();
        assert_eq!(timeouts, 2);
    }

    #[test]
    fn test_timeouts_out_of_auction_settle_the_open_bid() {
        let mut state = started(3);
        let opener = seat(&state, 0);
        state.auction_bid(opener, 3, 3, None).unwrap();
        let raiser = seat(&state, 1);
        state.auction_bid(raiser, 5, 3, None).unwrap();

        for _ in 0..3 {
            state.resolve_turn();
        }

        assert_eq!(state.phase, Phase::BuyResources);
        assert!(!state.auction.in_progress);
        assert_eq!(state.auction, AuctionState::default());
        let winner = state.players.get(&raiser).unwrap();
        assert!(winner.owns_plant(3));
        assert_eq!(winner.money, 45);
        assert!(!winner.can_bid);
        assert!(state.market.offered(3).is_none());
        assert!(state.players.get(&opener).unwrap().plants.is_empty());
        assert!(state
            .take_events()
            .iter()
            .any(|e| matches!(e.data, GameEventData::AuctionWon { player_id, plant: 3, price: 5 } if player_id == raiser)));
    }

    #[test]
    fn test_auction_actions_rejected_after_the_phase_ends() {
        let mut state = started(2);
        let opener = seat(&state, 0);
        state.auction_bid(opener, 4, 4, None).unwrap();
        state.resolve_turn();
        state.resolve_turn();

        assert_eq!(state.phase, Phase::BuyResources);
        assert!(state.players.get(&opener).unwrap().owns_plant(4));
        let other = seat(&state, 0);
        assert!(matches!(state.auction_pass(other), Err(ActionError::InvalidAction(_))));
        assert!(matches!(state.auction_bid(other, 9, 5, None), Err(ActionError::InvalidAction(_))));
    }

    #[test]
    fn test_end_turn_rules() {
        let mut state = started(3);
        let current = seat(&state, 0);
        assert!(matches!(state.end_turn(current), Err(ActionError::InvalidAction(_))));

        drive_to(&mut state, Phase::BuyResources);
        let waiting = seat(&state, 1);
        assert!(matches!(state.end_turn(waiting), Err(ActionError::InvalidAction(_))));
        assert_eq!(state.end_turn(id(42)), Err(ActionError::UnknownPlayer(id(42))));
        state.end_turn(seat(&state, 0)).unwrap();
        assert_eq!(state.current_player, 1);
    }

    #[test]
    fn test_second_round_is_ranked() {
        let mut state = started(3);
        drive_to(&mut state, Phase::BuildGenerators);
        let builder = seat(&state, 1);
        state.end_turn(seat(&state, 0)).unwrap();
        state.build_generator(builder, &["Kassel".to_string()]).unwrap();
        drive_to(&mut state, Phase::Auction);

        assert_eq!(state.round, 2);
        assert_eq!(seat(&state, 0), builder);
        let rest: Vec<_> = state.player_order[1..].to_vec();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted, "tied players keep registry order");
    }

    // -------------------------------------------------------------------------
    // Auction scenarios
    // -------------------------------------------------------------------------

    #[test]
    fn test_two_passes_award_the_leader() {
        let mut state = started(3);
        let (a, b, c) = (seat(&state, 0), seat(&state, 1), seat(&state, 2));

        state.auction_bid(a, 4, 4, None).unwrap();
        assert_eq!(state.auction.eligible_bidders, vec![a, b, c]);
        state.auction_pass(b).unwrap();
        assert!(state.auction.in_progress);
        state.auction_pass(c).unwrap();

        let winner = state.players.get(&a).unwrap();
        assert_eq!(winner.money, 46);
        assert_eq!(winner.plants.iter().map(|p| p.market_cost).collect::<Vec<_>>(), vec![4]);
        assert!(!winner.can_bid);
        assert!(!state.auction.in_progress);
        // Winner held the seat, so play moves on
        assert_eq!(state.current_player, 1);

        let wins = state
            .take_events()
            .into_iter()
            .filter(|e| matches!(e.data, GameEventData::AuctionWon { .. }))
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_out_of_turn_win_keeps_initiative() {
        let mut state = started(3);
        let (a, b, c) = (seat(&state, 0), seat(&state, 1), seat(&state, 2));

        state.auction_bid(a, 3, 3, None).unwrap();
        state.auction_bid(b, 5, 3, None).unwrap();
        state.auction_pass(a).unwrap();
        state.auction_pass(c).unwrap();

        assert_eq!(state.players.get(&b).unwrap().money, 45);
        assert_eq!(state.players.get(&a).unwrap().money, 50);
        assert_eq!(state.current_player_id(), Some(a));
        assert!(state.players.get(&a).unwrap().can_bid);

        // The seat opens again; the winner is out of this round's bidding
        state.auction_bid(a, 4, 4, None).unwrap();
        assert_eq!(state.auction.eligible_bidders, vec![a, c]);
    }

    #[test]
    fn test_sole_bidder_wins_immediately() {
        let market = PlantMarket::from_parts((10..=17).map(plant).collect(), vec![]);
        let mut state = MatchState::with_collaborators(
            [1; 16],
            MatchConfig::default(),
            market,
            CityBoard::sample_region(),
        );
        for i in 1..=3 {
            state.add_player(id(i), "p").unwrap();
        }
        state.start_match().unwrap();
        let opener = seat(&state, 0);
        for other in [seat(&state, 1), seat(&state, 2)] {
            state.players.get_mut(&other).unwrap().can_bid = false;
        }

        state.auction_bid(opener, 10, 13, None).unwrap();

        let p = state.players.get(&opener).unwrap();
        assert_eq!(p.money, 40);
        assert!(p.owns_plant(13));
        assert!(!state.auction.in_progress);
        assert!(state.auction.eligible_bidders.is_empty());
        assert_eq!(state.current_player, 1);
    }

    #[test]
    fn test_winner_discards_pending_plant() {
        let mut state = started(3);
        let (a, b, c) = (seat(&state, 0), seat(&state, 1), seat(&state, 2));
        state.players.get_mut(&a).unwrap().plants.push(plant(4));

        state.auction_bid(a, 5, 5, Some(4)).unwrap();
        state.auction_pass(b).unwrap();
        state.auction_pass(c).unwrap();

        let p = state.players.get(&a).unwrap();
        assert!(!p.owns_plant(4));
        assert!(p.owns_plant(5));
        assert_eq!(p.plant_count(), 1);
    }

    #[test]
    fn test_player_who_cannot_bid_is_rejected() {
        let mut state = started(3);
        let a = seat(&state, 0);
        state.players.get_mut(&a).unwrap().can_bid = false;
        let before = state.auction.clone();
        let hash = state.compute_hash();

        let result = state.auction_bid(a, 5, 5, None);
        assert!(matches!(result, Err(ActionError::InvalidAction(_))));
        assert_eq!(state.auction, before);
        assert_eq!(state.compute_hash(), hash);
    }

    #[test]
    fn test_opening_rules() {
        let mut state = started(3);
        let (a, b) = (seat(&state, 0), seat(&state, 1));

        assert!(matches!(state.auction_bid(b, 5, 5, None), Err(ActionError::ProtocolViolation(_))));
        assert!(matches!(state.auction_pass(b), Err(ActionError::ProtocolViolation(_))));
        assert_eq!(
            state.auction_bid(a, 9, 9, None),
            Err(ActionError::IllegalPurchase(PurchaseError::Market(MarketError::NotOffered(9))))
        );
        assert!(matches!(state.auction_bid(a, 51, 5, None), Err(ActionError::InvalidAction(_))));
        assert_eq!(state.auction_bid(id(42), 5, 5, None), Err(ActionError::UnknownPlayer(id(42))));
        assert!(!state.auction.in_progress);
    }

    #[test]
    fn test_raise_rules() {
        let mut state = started(3);
        let (a, b, c) = (seat(&state, 0), seat(&state, 1), seat(&state, 2));
        state.auction_bid(a, 5, 5, None).unwrap();

        assert!(matches!(state.auction_bid(b, 5, 5, None), Err(ActionError::InvalidAction(_))));
        assert!(matches!(state.auction_bid(b, 6, 6, None), Err(ActionError::InvalidAction(_))));
        assert!(matches!(state.auction_pass(a), Err(ActionError::InvalidAction(_))));

        state.auction_pass(c).unwrap();
        assert!(matches!(state.auction_bid(c, 9, 5, None), Err(ActionError::InvalidAction(_))));
        assert!(matches!(state.auction_pass(c), Err(ActionError::InvalidAction(_))));

        state.auction_bid(b, 6, 5, None).unwrap();
        assert_eq!(state.auction.current_bid, 6);
        assert!(state.auction.is_leader(&b));
    }

    #[test]
    fn test_plant_limit_requires_discard() {
        let mut state = started(3);
        let a = seat(&state, 0);
        state.players.get_mut(&a).unwrap().plants = vec![plant(20), plant(21), plant(22)];

        assert!(matches!(state.auction_bid(a, 5, 5, None), Err(ActionError::InvalidAction(_))));
        assert!(matches!(state.auction_bid(a, 5, 5, Some(4)), Err(ActionError::InvalidAction(_))));
        state.auction_bid(a, 5, 5, Some(20)).unwrap();
        assert_eq!(state.auction.pending_discard, Some(20));
    }

    #[test]
    fn test_two_player_limit_is_four() {
        let config = MatchConfig::default();
        assert_eq!(config.max_plants(2), 4);
        assert_eq!(config.max_plants(3), 3);

        let mut state = started(2);
        let a = seat(&state, 0);
        state.players.get_mut(&a).unwrap().plants = vec![plant(20), plant(21), plant(22)];
        state.auction_bid(a, 5, 5, None).unwrap();
    }

    // -------------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------------

    #[test]
    fn test_build_debits_and_checks_turn() {
        let mut state = started(3);
        drive_to(&mut state, Phase::BuildGenerators);
        let (a, b) = (seat(&state, 0), seat(&state, 1));

        assert!(matches!(
            state.build_generator(b, &["Berlin".to_string()]),
            Err(ActionError::InvalidAction(_))
        ));
        assert_eq!(state.build_generator(a, &["Berlin".to_string()]), Ok(10));
        assert_eq!(state.players.get(&a).unwrap().money, 40);
        assert_eq!(state.cities_of(&a), 1);

        let path = vec!["Berlin".to_string(), "Magdeburg".to_string()];
        assert_eq!(state.build_generator(a, &path), Ok(20));
        assert_eq!(state.players.get(&a).unwrap().money, 20);
    }

    #[test]
    fn test_unaffordable_build_leaves_board_untouched() {
        let mut state = started(3);
        drive_to(&mut state, Phase::BuildGenerators);
        let a = seat(&state, 0);
        state.players.get_mut(&a).unwrap().money = 5;

        assert_eq!(
            state.build_generator(a, &["Berlin".to_string()]),
            Err(ActionError::IllegalPurchase(PurchaseError::Unaffordable { cost: 10, money: 5 }))
        );
        assert_eq!(state.cities_of(&a), 0);
        assert_eq!(state.players.get(&a).unwrap().money, 5);
    }

    #[test]
    fn test_board_rejection_propagates() {
        let mut state = started(3);
        drive_to(&mut state, Phase::BuildGenerators);
        let a = seat(&state, 0);

        assert_eq!(
            state.build_generator(a, &["Atlantis".to_string()]),
            Err(ActionError::IllegalPurchase(PurchaseError::Board(BoardError::UnknownCity(
                "Atlantis".into()
            ))))
        );
        assert_eq!(state.players.get(&a).unwrap().money, 50);
    }

    #[test]
    fn test_build_trashes_low_plants() {
        let mut visible = vec![plant(1)];
        visible.extend((9..=15).map(plant));
        let market = PlantMarket::from_parts(visible, vec![plant(20)]);
        let mut state = MatchState::with_collaborators(
            [2; 16],
            MatchConfig::default(),
            market,
            CityBoard::sample_region(),
        );
        state.add_player(id(1), "a").unwrap();
        state.add_player(id(2), "b").unwrap();
        state.start_match().unwrap();
        drive_to(&mut state, Phase::BuildGenerators);
        state.take_events();

        let a = state.current_player_id().unwrap();
        state.build_generator(a, &["Hamburg".to_string()]).unwrap();

        assert_eq!(state.market.currently_available().first().map(|p| p.market_cost), Some(9));
        assert!(state.take_events().iter().any(|e| {
            e.data == GameEventData::PlantsTrashed { plants: vec![1] }
        }));
    }

    #[test]
    fn test_queries() {
        let state = started(2);
        assert_eq!(state.player_name(&id(1)), Some("p1"));
        assert_eq!(state.player_name(&id(9)), None);
        assert!(state.player_can_afford(&id(1), 50));
        assert!(!state.player_can_afford(&id(1), 51));
        assert!(!state.player_can_afford(&id(9), 0));
        assert_eq!(state.player_count(), 2);
    }
}
