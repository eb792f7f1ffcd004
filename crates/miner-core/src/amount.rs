//! Exact integer coin amounts.
//!
//! All reward accounting is done in atomic units (10^8 per coin) with
//! integer arithmetic, so splitting a gross reward never creates or
//! loses value and cumulative totals never drift.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// Atomic units per whole coin.
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// A non-negative coin amount in atomic units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Zero coins.
    pub const ZERO: Amount = Amount(0);
    /// The largest representable amount.
    pub const MAX: Amount = Amount(u64::MAX);

    /// Create an amount from raw atomic units.
    pub const fn from_units(units: u64) -> Self {
        Amount(units)
    }

    /// Create an amount from a whole-coin value, rounding up to the
    /// next atomic unit. Non-finite or negative inputs saturate to the
    /// nearest bound.
    pub fn from_coins_ceil(coins: f64) -> Self {
        if !coins.is_finite() || coins <= 0.0 {
            return if coins > 0.0 { Amount::MAX } else { Amount::ZERO };
        }
        let units = (coins * UNITS_PER_COIN as f64).ceil();
        if units >= u64::MAX as f64 {
            Amount::MAX
        } else {
            Amount(units as u64)
        }
    }

    /// Raw atomic units.
    pub const fn as_units(self) -> u64 {
        self.0
    }

    /// Whole-coin value, for display only.
    pub fn as_coins(self) -> f64 {
        self.0 as f64 / UNITS_PER_COIN as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// An exact integer percentage of this amount, truncated toward
    /// zero. The truncated remainder stays with the caller's balance,
    /// so `percent(p) + (self - percent(p)) == self` always holds.
    pub fn percent(self, pct: u8) -> Amount {
        debug_assert!(pct <= 100);
        Amount((self.0 as u128 * pct as u128 / 100) as u64)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }

    pub fn min(self, rhs: Amount) -> Amount {
        if self.0 <= rhs.0 {
            self
        } else {
            rhs
        }
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_COIN;
        let frac = self.0 % UNITS_PER_COIN;
        write!(f, "{}.{:08}", whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_conservative() {
        // fee + remainder must always reconstruct the gross amount
        for units in [0u64, 1, 9, 10, 99, 100, 12_345_678_901] {
            let gross = Amount::from_units(units);
            let fee = gross.percent(10);
            assert_eq!(fee + (gross - fee), gross);
        }
    }

    #[test]
    fn test_percent_exact_values() {
        assert_eq!(Amount::from_units(1000).percent(10), Amount::from_units(100));
        assert_eq!(Amount::from_units(9).percent(10), Amount::ZERO);
        assert_eq!(Amount::from_units(100).percent(0), Amount::ZERO);
        assert_eq!(Amount::from_units(100).percent(100), Amount::from_units(100));
    }

    #[test]
    fn test_from_coins_ceil() {
        assert_eq!(Amount::from_coins_ceil(1.0), Amount::from_units(UNITS_PER_COIN));
        assert_eq!(Amount::from_coins_ceil(0.0), Amount::ZERO);
        assert_eq!(Amount::from_coins_ceil(-5.0), Amount::ZERO);
        assert_eq!(Amount::from_coins_ceil(f64::INFINITY), Amount::MAX);
        // Rounds up so a target is never understated
        assert_eq!(
            Amount::from_coins_ceil(0.000000015),
            Amount::from_units(2)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_units(150_000_000).to_string(), "1.50000000");
        assert_eq!(Amount::from_units(1).to_string(), "0.00000001");
    }
}
