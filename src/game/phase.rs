//! Phase State Machine
//!
//! Five phases, cyclic, no terminal state. Every legal edge and its effect on
//! seating order lives in [`TRANSITIONS`]; anything else is rejected.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Round phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Seating is (re)computed
    DeterminePlayerOrder,
    /// Power plant auctions
    Auction,
    /// Fuel purchases, reverse order
    BuyResources,
    /// City expansion
    BuildGenerators,
    /// Power generation and payout, reverse order
    Bureaucracy,
}

impl Phase {
    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Phase::DeterminePlayerOrder => "DETERMINE_PLAYER_ORDER",
            Phase::Auction => "AUCTION",
            Phase::BuyResources => "BUY_RESOURCES",
            Phase::BuildGenerators => "BUILD_GENERATORS",
            Phase::Bureaucracy => "BUREAUCRACY",
        }
    }

    /// The phase that follows in the cycle.
    pub fn next(self) -> Phase {
        match self {
            Phase::DeterminePlayerOrder => Phase::Auction,
            Phase::Auction => Phase::BuyResources,
            Phase::BuyResources => Phase::BuildGenerators,
            Phase::BuildGenerators => Phase::Bureaucracy,
            Phase::Bureaucracy => Phase::DeterminePlayerOrder,
        }
    }

    /// Stable index used in state hashing.
    pub fn as_u8(self) -> u8 {
        match self {
            Phase::DeterminePlayerOrder => 0,
            Phase::Auction => 1,
            Phase::BuyResources => 2,
            Phase::BuildGenerators => 3,
            Phase::Bureaucracy => 4,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a transition does to the seating order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEffect {
    /// Leave the order as is
    Keep,
    /// Snake: last to act goes first
    Reverse,
    /// Run the player-order algorithm
    Recompute,
}

/// One edge of the phase cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Phase being left
    pub from: Phase,
    /// Phase being entered
    pub to: Phase,
    /// Seating change applied on the edge
    pub order: OrderEffect,
}

/// Every legal transition.
pub const TRANSITIONS: [Transition; 5] = [
    Transition {
        from: Phase::DeterminePlayerOrder,
        to: Phase::Auction,
        order: OrderEffect::Recompute,
    },
    Transition {
        from: Phase::Auction,
        to: Phase::BuyResources,
        order: OrderEffect::Reverse,
    },
    Transition {
        from: Phase::BuyResources,
        to: Phase::BuildGenerators,
        order: OrderEffect::Keep,
    },
    Transition {
        from: Phase::BuildGenerators,
        to: Phase::Bureaucracy,
        order: OrderEffect::Reverse,
    },
    Transition {
        from: Phase::Bureaucracy,
        to: Phase::DeterminePlayerOrder,
        order: OrderEffect::Keep,
    },
];

/// Look up an edge; fails for any pair not in the table.
pub fn transition_between(from: Phase, to: Phase) -> Result<Transition, PhaseError> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.to == to)
        .copied()
        .ok_or(PhaseError::IllegalTransition { from, to })
}

/// Phase errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// Edge not in the table.
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition {
        /// Phase being left
        from: Phase,
        /// Requested phase
        to: Phase,
    },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 5] = [
        Phase::DeterminePlayerOrder,
        Phase::Auction,
        Phase::BuyResources,
        Phase::BuildGenerators,
        Phase::Bureaucracy,
    ];

    #[test]
    fn test_cycle_visits_every_phase() {
        let mut phase = Phase::DeterminePlayerOrder;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(phase);
            phase = phase.next();
        }
        assert_eq!(seen, ALL);
        assert_eq!(phase, Phase::DeterminePlayerOrder);
    }

    #[test]
    fn test_exactly_two_reversals() {
        let reversals: Vec<_> = TRANSITIONS
            .iter()
            .filter(|t| t.order == OrderEffect::Reverse)
            .map(|t| t.from)
            .collect();
        assert_eq!(reversals, vec![Phase::Auction, Phase::BuildGenerators]);
    }

    #[test]
    fn test_every_next_phase_is_in_table() {
        for from in ALL {
            let t = transition_between(from, from.next()).unwrap();
            assert_eq!((t.from, t.to), (from, from.next()));
        }
    }

    #[test]
    fn test_buy_to_build_is_in_table() {
        let t = transition_between(Phase::BuyResources, Phase::BuildGenerators).unwrap();
        assert_eq!(t.order, OrderEffect::Keep);
    }

    #[test]
    fn test_skipping_is_rejected() {
        for from in ALL {
            for to in ALL {
                let legal = from.next() == to;
                assert_eq!(transition_between(from, to).is_ok(), legal, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&Phase::DeterminePlayerOrder).unwrap(),
            "\"DETERMINE_PLAYER_ORDER\""
        );
        for phase in ALL {
            assert_eq!(serde_json::to_string(&phase).unwrap(), format!("\"{}\"", phase.name()));
        }
    }
}
