//! Scripted Players
//!
//! A return-on-investment bidder used by the demo match and the benchmark.
//! It only ever proposes moves the engine accepts, so a table of bots plays
//! every phase to completion without timeouts.

use tracing::debug;

use crate::game::board::CityId;
use crate::game::market::{Market, PlantId, PowerPlant};
use crate::game::phase::Phase;
use crate::game::player::PlayerId;
use crate::game::resources::ResourceMarket;
use crate::game::state::{ActionError, MatchState};

/// Income by number of cities powered.
pub const PAYOUT: [u32; 21] = [
    10, 22, 33, 44, 54, 64, 73, 82, 90, 98, 105, 112, 118, 124, 129, 134, 138, 142, 145, 148, 150,
];

/// Income over price for buying `plant` at `price` and fuelling it twice.
///
/// Zero when the fuel cannot be bought at all.
pub fn plant_roi(plant: &PowerPlant, price: u32, resources: &ResourceMarket) -> f64 {
    let Some(fuel) = resources.cost_for(plant.resource_type, plant.resource_cost * 2) else {
        return 0.0;
    };
    let powered = (plant.generators as usize).min(PAYOUT.len() - 1);
    let income = PAYOUT[powered] * 2;
    income as f64 / (price + fuel).max(1) as f64
}

/// A move proposed for one player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotMove {
    /// Open or raise
    Bid {
        /// Plant to bid on
        plant: PlantId,
        /// Amount
        bid: u32,
        /// Plant dropped on winning
        discard: Option<PlantId>,
    },
    /// Decline to open, or leave the auction
    Pass,
    /// Build along a path
    Build(Vec<CityId>),
    /// Finish the turn
    EndTurn,
}

/// Who the table is waiting on: the rotation inside an open auction,
/// otherwise the current seat.
pub fn next_actor(state: &MatchState) -> Option<PlayerId> {
    if !state.auction.in_progress {
        return state.current_player_id();
    }
    let bidders = &state.auction.eligible_bidders;
    (0..bidders.len())
        .map(|i| bidders[(state.auction.bidder_cursor + i) % bidders.len()])
        .find(|id| !state.auction.is_leader(id))
}

/// Choose a move for `player`, or `None` when it is not their move.
pub fn choose_move(state: &MatchState, player: PlayerId) -> Option<BotMove> {
    let me = state.players.get(&player)?;
    let limit = state.config.max_plants(state.player_count());
    let discard = if me.plant_count() >= limit {
        me.plants.iter().map(|p| p.market_cost).min()
    } else {
        None
    };

    match state.phase {
        Phase::Auction if state.auction.in_progress => {
            if !state.auction.is_eligible(&player) || state.auction.is_leader(&player) {
                return None;
            }
            let id = state.auction.plant_under_auction?;
            let on_block = *state.market.offered(id)?;
            let raise = state.auction.current_bid + 1;
            if !me.can_afford(raise) {
                return Some(BotMove::Pass);
            }

            let worth = plant_roi(&on_block, raise, &state.resources);
            let alternative = state
                .market
                .currently_available()
                .iter()
                .chain(state.market.futures().first())
                .filter(|p| p.market_cost != id)
                .map(|p| plant_roi(p, p.market_cost, &state.resources))
                .fold(0.0, f64::max);

            if worth >= alternative {
                Some(BotMove::Bid { plant: id, bid: raise, discard })
            } else {
                Some(BotMove::Pass)
            }
        }
        Phase::Auction => {
            if state.current_player_id() != Some(player) {
                return None;
            }
            if !me.can_bid {
                return Some(BotMove::Pass);
            }
            let best = state
                .market
                .currently_available()
                .iter()
                .filter(|p| me.can_afford(p.market_cost))
                .map(|p| (p, plant_roi(p, p.market_cost, &state.resources)))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best {
                Some((plant, _)) => Some(BotMove::Bid {
                    plant: plant.market_cost,
                    bid: plant.market_cost,
                    discard,
                }),
                None => Some(BotMove::Pass),
            }
        }
        Phase::BuildGenerators => {
            if state.current_player_id() != Some(player) {
                return None;
            }
            // One city per round number keeps each build turn finite
            let wants_more = state.cities_of(&player) < state.round as usize;
            match state.board.cheapest_expansion(&player) {
                Some((path, cost)) if wants_more && me.can_afford(cost) => Some(BotMove::Build(path)),
                _ => Some(BotMove::EndTurn),
            }
        }
        Phase::BuyResources | Phase::Bureaucracy => {
            (state.current_player_id() == Some(player)).then_some(BotMove::EndTurn)
        }
        Phase::DeterminePlayerOrder => None,
    }
}

/// Apply one move through the engine.
pub fn apply_move(state: &mut MatchState, player: PlayerId, mv: BotMove) -> Result<(), ActionError> {
    debug!(player = %player, ?mv, "Bot move");
    match mv {
        BotMove::Bid { plant, bid, discard } => state.auction_bid(player, bid, plant, discard),
        BotMove::Pass => state.auction_pass(player),
        BotMove::Build(path) => state.build_generator(player, &path).map(|_| ()),
        BotMove::EndTurn => state.end_turn(player),
    }
}

/// Play until `rounds` full rounds have finished. Returns the number of moves made.
pub fn play_rounds(state: &mut MatchState, rounds: u32) -> Result<usize, ActionError> {
    if !state.started {
        return Err(ActionError::MatchNotStarted);
    }
    let last_round = state.round + rounds;
    let mut moves = 0;

    while state.round < last_round {
        let actor = next_actor(state)
            .ok_or_else(|| ActionError::ProtocolViolation("nobody can act".into()))?;
        match choose_move(state, actor) {
            Some(mv) => apply_move(state, actor, mv)?,
            None => {
                state.resolve_turn();
            }
        }
        moves += 1;
    }

    Ok(moves)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::resources::ResourceType;
    use crate::game::state::MatchConfig;

    fn table(n: u8) -> MatchState {
        let mut state = MatchState::new([3; 16], MatchConfig::default());
        for i in 1..=n {
            state.add_player(PlayerId::new([i; 16]), &format!("bot{i}")).unwrap();
        }
        state.start_match().unwrap();
        state
    }

    #[test]
    fn test_roi_prefers_cheap_fuel() {
        let resources = ResourceMarket::standard();
        let coal = PowerPlant::new(4, ResourceType::Coal, 2, 1);
        let clean = PowerPlant::new(13, ResourceType::Clean, 0, 1);

        // 44 income over 4 + (1+1+1+2) coal
        assert!((plant_roi(&coal, 4, &resources) - 44.0 / 9.0).abs() < 1e-9);
        assert!((plant_roi(&clean, 13, &resources) - 44.0 / 13.0).abs() < 1e-9);
        assert!(plant_roi(&coal, 4, &resources) > plant_roi(&coal, 10, &resources));
    }

    #[test]
    fn test_roi_zero_without_supply() {
        let resources = ResourceMarket::standard();
        let hungry = PowerPlant::new(11, ResourceType::Uranium, 20, 2);
        assert_eq!(plant_roi(&hungry, 11, &resources), 0.0);
    }

    #[test]
    fn test_only_the_expected_player_gets_a_move() {
        let state = table(3);
        let current = state.current_player_id().unwrap();
        let waiting = state.player_order[1];

        assert!(matches!(choose_move(&state, current), Some(BotMove::Bid { .. })));
        assert_eq!(choose_move(&state, waiting), None);
        assert_eq!(next_actor(&state), Some(current));
    }

    #[test]
    fn test_bots_play_three_rounds() {
        let mut state = table(4);
        let moves = play_rounds(&mut state, 3).unwrap();

        assert!(moves > 0);
        assert_eq!(state.round, 4);
        assert_eq!(state.phase, Phase::Auction);
        assert!(state.players.iter().all(|p| p.plant_count() <= 3));
        assert!(state
            .take_events()
            .iter()
            .all(|e| !matches!(e.data, crate::game::GameEventData::TurnTimedOut { .. })));
    }

    #[test]
    fn test_bot_tables_replay_identically() {
        let mut a = table(3);
        let mut b = table(3);
        play_rounds(&mut a, 2).unwrap();
        play_rounds(&mut b, 2).unwrap();
        assert_eq!(a.compute_hash(), b.compute_hash());
    }
}
