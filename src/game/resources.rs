//! Resource Market
//!
//! Tiered price buckets for fuel. The engine never reads prices itself;
//! the lookup is exposed to clients deciding which plants are worth buying.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// Fuel a plant can burn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    /// Coal
    Coal,
    /// Oil
    Oil,
    /// Garbage
    Garbage,
    /// Uranium
    Uranium,
    /// Burns any mix of coal and oil
    Hybrid,
    /// Needs no fuel
    Clean,
}

impl ResourceType {
    /// Resources that have their own buckets.
    pub const STORED: [ResourceType; 4] = [
        ResourceType::Coal,
        ResourceType::Oil,
        ResourceType::Garbage,
        ResourceType::Uranium,
    ];
}

/// One price tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Price per unit in this tier.
    pub cost: u32,
    /// Units the tier holds when full.
    pub capacity: u32,
    /// Units currently for sale.
    pub current: u32,
}

/// Buckets for every stored resource, cheapest tier first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceMarket {
    buckets: BTreeMap<ResourceType, Vec<Bucket>>,
}

impl ResourceMarket {
    /// Starting supply.
    pub fn standard() -> Self {
        let tiers = |capacity: u32, stocked_from: u32| -> Vec<Bucket> {
            (1..=8)
                .map(|cost| Bucket {
                    cost,
                    capacity,
                    current: if cost >= stocked_from { capacity } else { 0 },
                })
                .collect()
        };

        let mut uranium = tiers(1, 14);
        uranium.extend([10, 12, 14, 16].into_iter().map(|cost| Bucket {
            cost,
            capacity: 1,
            current: if cost >= 14 { 1 } else { 0 },
        }));

        let mut buckets = BTreeMap::new();
        buckets.insert(ResourceType::Coal, tiers(3, 1));
        buckets.insert(ResourceType::Oil, tiers(3, 3));
        buckets.insert(ResourceType::Garbage, tiers(3, 7));
        buckets.insert(ResourceType::Uranium, uranium);

        Self { buckets }
    }

    /// Buckets for one resource; empty for hybrid and clean.
    pub fn buckets(&self, resource: ResourceType) -> &[Bucket] {
        self.buckets.get(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Units currently for sale.
    pub fn available(&self, resource: ResourceType) -> u32 {
        match resource {
            ResourceType::Hybrid => {
                self.available(ResourceType::Coal) + self.available(ResourceType::Oil)
            }
            _ => self.buckets(resource).iter().map(|b| b.current).sum(),
        }
    }

    /// Price of buying `amount` units cheapest-first, or `None` if supply is short.
    ///
    /// Clean plants cost nothing; hybrid fuel takes the cheapest mix of coal and oil.
    pub fn cost_for(&self, resource: ResourceType, amount: u32) -> Option<u32> {
        match resource {
            ResourceType::Clean => Some(0),
            ResourceType::Hybrid => {
                let mut merged: Vec<Bucket> = self
                    .buckets(ResourceType::Coal)
                    .iter()
                    .chain(self.buckets(ResourceType::Oil))
                    .copied()
                    .collect();
                merged.sort_by_key(|b| b.cost);
                cheapest_first(&merged, amount)
            }
            _ => cheapest_first(self.buckets(resource), amount),
        }
    }

    /// All buckets, for rendering.
    pub fn snapshot(&self) -> BTreeMap<ResourceType, Vec<Bucket>> {
        self.buckets.clone()
    }
}

impl Default for ResourceMarket {
    fn default() -> Self {
        Self::standard()
    }
}

fn cheapest_first(buckets: &[Bucket], amount: u32) -> Option<u32> {
    let mut remaining = amount;
    let mut total = 0;
    for bucket in buckets {
        if remaining == 0 {
            break;
        }
        let take = bucket.current.min(remaining);
        total += take * bucket.cost;
        remaining -= take;
    }
    (remaining == 0).then_some(total)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_supply() {
        let market = ResourceMarket::standard();
        assert_eq!(market.available(ResourceType::Coal), 24);
        assert_eq!(market.available(ResourceType::Oil), 18);
        assert_eq!(market.available(ResourceType::Garbage), 6);
        assert_eq!(market.available(ResourceType::Uranium), 2);
        assert_eq!(market.available(ResourceType::Hybrid), 42);
    }

    #[test]
    fn test_cost_spans_buckets() {
        let market = ResourceMarket::standard();
        // 3 coal at 1 + 1 coal at 2
        assert_eq!(market.cost_for(ResourceType::Coal, 4), Some(5));
        // Oil starts at the 3 bucket
        assert_eq!(market.cost_for(ResourceType::Oil, 2), Some(6));
    }

    #[test]
    fn test_short_supply() {
        let market = ResourceMarket::standard();
        assert_eq!(market.cost_for(ResourceType::Uranium, 2), Some(30));
        assert_eq!(market.cost_for(ResourceType::Uranium, 3), None);
    }

    #[test]
    fn test_clean_and_hybrid() {
        let market = ResourceMarket::standard();
        assert_eq!(market.cost_for(ResourceType::Clean, 10), Some(0));
        // Cheapest mix: coal at 1,1,1 then coal at 2,2,2 (oil starts at 3)
        assert_eq!(market.cost_for(ResourceType::Hybrid, 5), Some(3 + 4));
        assert!(market.buckets(ResourceType::Hybrid).is_empty());
    }
}
