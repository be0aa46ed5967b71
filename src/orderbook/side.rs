//! One side of an order book, grouped by price
//!
//! Uses a BTreeMap keyed by price so levels stay sorted after every change.
//! Bids iterate from the highest price, asks from the lowest.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::{DepthLevel, Side};
use crate::protocol::PriceLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Replace every level with the snapshot's. Repeated prices are merged and
    /// non-positive sizes skipped.
    pub fn reset(&mut self, snapshot: &[PriceLevel]) {
        self.levels.clear();
        for level in snapshot {
            self.add(level.price, level.size);
        }
    }

    /// Add resting size at a price, merging into an existing level
    pub fn add(&mut self, price: Decimal, size: Decimal) {
        let total = self.levels.get(&price).copied().unwrap_or(Decimal::ZERO) + size;
        if total > Decimal::ZERO {
            self.levels.insert(price, total);
        } else {
            self.levels.remove(&price);
        }
    }

    /// Take size away from the level at a price. The level is dropped once
    /// nothing is left.
    ///
    /// Returns false when there is no level at that price.
    pub fn remove(&mut self, price: Decimal, size: Decimal) -> bool {
        let Some(current) = self.levels.get_mut(&price) else {
            return false;
        };

        *current -= size;
        if *current <= Decimal::ZERO {
            self.levels.remove(&price);
        }
        true
    }

    pub fn size_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Levels in book order: best price first
    pub fn iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let to_level = |(price, size): (&Decimal, &Decimal)| PriceLevel::new(*price, *size);
        match self.side {
            Side::Bid => Box::new(self.levels.iter().rev().map(to_level)),
            Side::Ask => Box::new(self.levels.iter().map(to_level)),
        }
    }

    pub fn levels(&self) -> Vec<PriceLevel> {
        self.iter().collect()
    }

    pub fn best(&self) -> Option<PriceLevel> {
        self.iter().next()
    }

    /// Levels with the running total of size from the best price outwards,
    /// computed in one pass
    pub fn depth(&self) -> Vec<DepthLevel> {
        self.iter()
            .scan(Decimal::ZERO, |total, level| {
                *total += level.size;
                Some(DepthLevel {
                    price: level.price,
                    size: level.size,
                    total: *total,
                })
            })
            .collect()
    }

    pub fn total_size(&self) -> Decimal {
        self.levels.values().copied().sum()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
