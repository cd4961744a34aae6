// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::iter::Sum;

/// Number of minimal chain units making up a single display unit.
pub const UNITS_PER_TOKEN: u64 = 1_000_000_000;

/// Amount of tokens, kept in the chain's minimal denomination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(u64);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub const fn from_minimal_units(amount: u64) -> Self {
        Balance(amount)
    }

    pub const fn from_whole_units(amount: u64) -> Self {
        Balance(amount.saturating_mul(UNITS_PER_TOKEN))
    }

    /// Converts a human-facing amount. Returns `None` for negative, non-finite or overflowing values.
    pub fn from_display(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let minimal = (amount * UNITS_PER_TOKEN as f64).round();
        if minimal > u64::MAX as f64 {
            return None;
        }
        Some(Balance(minimal as u64))
    }

    pub const fn minimal_units(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn saturating_add(self, other: Balance) -> Balance {
        Balance(self.0.saturating_add(other.0))
    }

    pub const fn saturating_sub(self, other: Balance) -> Balance {
        Balance(self.0.saturating_sub(other.0))
    }

    /// Number of `batch_size` display-unit batches needed to cover this balance, rounding up.
    pub fn batches_of(&self, batch_size: u64) -> u64 {
        let batch = batch_size.max(1).saturating_mul(UNITS_PER_TOKEN);
        self.0.div_ceil(batch)
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Balance>>(iter: I) -> Self {
        iter.fold(Balance::ZERO, Balance::saturating_add)
    }
}

// formatted in display units, without trailing zeroes, as expected by the wallet cli
impl Display for Balance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / UNITS_PER_TOKEN;
        let fraction = self.0 % UNITS_PER_TOKEN;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let fraction = format!("{fraction:09}");
        write!(f, "{whole}.{}", fraction.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_in_whole_units() {
        assert_eq!(Balance::from_minimal_units(1_101_000_000_000).to_string(), "1101");
        assert_eq!(Balance::from_minimal_units(12_500_000_000).to_string(), "12.5");
        assert_eq!(Balance::from_minimal_units(1).to_string(), "0.000000001");
        assert_eq!(Balance::ZERO.to_string(), "0");
    }

    #[test]
    fn converting_display_amounts() {
        assert_eq!(
            Balance::from_display(12.5),
            Some(Balance::from_minimal_units(12_500_000_000))
        );
        assert_eq!(Balance::from_display(100.0), Some(Balance::from_whole_units(100)));
        assert_eq!(Balance::from_display(-5.0), None);
        assert_eq!(Balance::from_display(f64::NAN), None);
        assert_eq!(Balance::from_display(f64::INFINITY), None);
        assert_eq!(Balance::from_display(1e30), None);
    }

    #[test]
    fn batching_rounds_up() {
        assert_eq!(Balance::from_whole_units(2101).batches_of(1000), 3);
        assert_eq!(Balance::from_whole_units(2000).batches_of(1000), 2);
        assert_eq!(Balance::from_whole_units(10).batches_of(1000), 1);
        assert_eq!(Balance::from_minimal_units(1).batches_of(1000), 1);
        assert_eq!(Balance::ZERO.batches_of(1000), 0);
    }

    #[test]
    fn summing_balances() {
        let total: Balance = [
            Balance::from_minimal_units(1_101_000_000_000),
            Balance::from_minimal_units(1_000_000_000_000),
        ]
        .into_iter()
        .sum();
        assert_eq!(total, Balance::from_whole_units(2101));
    }
}
