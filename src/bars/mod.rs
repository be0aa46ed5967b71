//! OHLCV bars
//!
//! Historical bars come from the engine. The live bar is extended from the
//! matched-trade stream: a trade past the next boundary opens a new bar,
//! anything earlier updates the current one in place.

mod aggregator;
mod resolution;

pub use aggregator::BarAggregator;
pub use resolution::{Resolution, ResolutionUnit};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::BarPrices;

/// One OHLCV bar, prices in satoshis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Open time (epoch milliseconds)
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Number of trades
    pub volume: u64,
}

impl Bar {
    /// Bar opened by a single trade
    pub fn opened_by(time: i64, price: Decimal) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1,
        }
    }
}

impl From<BarPrices> for Bar {
    fn from(bar: BarPrices) -> Self {
        Self {
            time: bar.time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

/// Live bar of one stream
#[derive(Debug, Clone)]
pub struct BarState {
    last_bar: Option<Bar>,
    resolution: Resolution,
}

impl BarState {
    pub fn new(resolution: Resolution, last_bar: Option<Bar>) -> Self {
        Self {
            last_bar,
            resolution,
        }
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.last_bar.as_ref()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Fold one trade into the live bar and return the bar to emit
    pub fn apply_trade(&mut self, price: Decimal, executed_on: i64) -> Result<Bar> {
        let bar = match self.last_bar.take() {
            None => Bar::opened_by(executed_on, price),
            Some(last) => {
                let boundary = match self.resolution.next_bar_time(last.time) {
                    Ok(boundary) => boundary,
                    Err(e) => {
                        self.last_bar = Some(last);
                        return Err(e);
                    }
                };

                if executed_on >= boundary {
                    Bar {
                        time: boundary,
                        open: last.close,
                        high: last.close,
                        low: last.close,
                        close: price,
                        volume: 1,
                    }
                } else {
                    let mut bar = last;
                    bar.high = bar.high.max(price);
                    bar.low = bar.low.min(price);
                    bar.close = price;
                    bar.volume += 1;
                    bar
                }
            }
        };

        self.last_bar = Some(bar.clone());
        Ok(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const T0: i64 = 1_700_000_040_000;

    fn seeded() -> BarState {
        let last = Bar {
            time: T0,
            open: dec!(98),
            high: dec!(101),
            low: dec!(97),
            close: dec!(100),
            volume: 4,
        };
        BarState::new("1".parse().unwrap(), Some(last))
    }

    #[test]
    fn test_trade_past_boundary_opens_bar_at_previous_close() {
        let mut state = seeded();
        let bar = state.apply_trade(dec!(105), T0 + 61_000).unwrap();

        assert_eq!(
            bar,
            Bar {
                time: T0 + 60_000,
                open: dec!(100),
                high: dec!(100),
                low: dec!(100),
                close: dec!(105),
                volume: 1,
            }
        );
        assert_eq!(state.last_bar(), Some(&bar));
    }

    #[test]
    fn test_trade_inside_bar_updates_it() {
        let mut state = seeded();
        let bar = state.apply_trade(dec!(95), T0 + 10_000).unwrap();

        assert_eq!(bar.time, T0);
        assert_eq!(bar.open, dec!(98));
        assert_eq!(bar.high, dec!(101));
        assert_eq!(bar.low, dec!(95));
        assert_eq!(bar.close, dec!(95));
        assert_eq!(bar.volume, 5);

        let bar = state.apply_trade(dec!(110), T0 + 20_000).unwrap();
        assert_eq!(bar.high, dec!(110));
        assert_eq!(bar.low, dec!(95));
        assert_eq!(bar.volume, 6);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let mut state = seeded();
        let bar = state.apply_trade(dec!(100), T0 + 60_000).unwrap();
        assert_eq!(bar.time, T0 + 60_000);
        assert_eq!(bar.volume, 1);
    }

    #[test]
    fn test_first_trade_without_history_opens_bar() {
        let mut state = BarState::new("1D".parse().unwrap(), None);
        let bar = state.apply_trade(dec!(42), T0).unwrap();
        assert_eq!(bar, Bar::opened_by(T0, dec!(42)));

        let bar = state.apply_trade(dec!(43), T0 + 1_000).unwrap();
        assert_eq!(bar.time, T0);
        assert_eq!(bar.volume, 2);
    }
}
