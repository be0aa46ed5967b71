//! Satoshi amount helpers
//!
//! Prices and funds travel as integer satoshis. Display code works in whole
//! coins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::protocol::PriceLevel;

/// Satoshis per coin
pub const SATOSHIS_SCALE: i64 = 100_000_000;

fn scale() -> Decimal {
    Decimal::from(SATOSHIS_SCALE)
}

/// Convert satoshis into coins
pub fn to_coins(satoshis: Decimal) -> Decimal {
    satoshis / scale()
}

/// Convert coins into whole satoshis, truncating anything finer
pub fn to_satoshis(coins: Decimal) -> Decimal {
    (coins * scale()).trunc()
}

/// Coin value of a level: size times price
pub fn level_value(level: &PriceLevel) -> Decimal {
    to_coins(level.size) * to_coins(level.price)
}

/// Coin amount of a level: size divided by price. `None` for a zero price.
pub fn level_amount(level: &PriceLevel) -> Option<Decimal> {
    to_coins(level.size).checked_div(to_coins(level.price))
}

/// A book level in whole coins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinLevel {
    pub price: Decimal,
    /// Base coins the level buys or sells, `None` at a zero price
    pub amount: Option<Decimal>,
    /// Quote coins resting at the level
    pub value: Decimal,
}

impl From<&PriceLevel> for CoinLevel {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: to_coins(level.price),
            amount: level_amount(level),
            value: level_value(level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_coin_conversion() {
        assert_eq!(to_coins(dec!(150000000)), dec!(1.5));
        assert_eq!(to_coins(dec!(1)), dec!(0.00000001));
        assert_eq!(to_satoshis(dec!(0.000000015)), dec!(1));
        assert_eq!(to_satoshis(dec!(2)), dec!(200000000));
    }

    #[test]
    fn test_level_value_and_amount() {
        // 0.5 BTC of funds at 0.0002 per XSN
        let level = PriceLevel::new(dec!(20000), dec!(50000000));
        assert_eq!(level_value(&level), dec!(0.0001));
        assert_eq!(level_amount(&level), Some(dec!(2500)));

        let free = PriceLevel::new(dec!(0), dec!(1));
        assert_eq!(level_amount(&free), None);
    }

    #[test]
    fn test_coin_level() {
        let level = CoinLevel::from(&PriceLevel::new(dec!(20000), dec!(50000000)));
        assert_eq!(level.price, dec!(0.0002));
        assert_eq!(level.amount, Some(dec!(2500)));
        assert_eq!(level.value, dec!(0.0001));
    }
}
