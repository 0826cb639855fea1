//! Standard baud rate table.
//!
//! Maps numeric baud rates to the device's native rate tokens and back.
//! The table is static and sorted by numeric rate; `token_from_rate`
//! binary-searches it, so the ordering is load-bearing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native rate enumerant understood by the comm device.
///
/// Only the tokens listed in [`RATE_TABLE`] have a numeric meaning; any
/// other value read back from a device is treated as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateToken(pub u32);

impl RateToken {
    pub const BPS_50: Self = Self(0);
    pub const BPS_75: Self = Self(1);
    pub const BPS_110: Self = Self(2);
    pub const BPS_134: Self = Self(3);
    pub const BPS_150: Self = Self(4);
    pub const BPS_300: Self = Self(5);
    pub const BPS_600: Self = Self(6);
    pub const BPS_1200: Self = Self(7);
    pub const BPS_1800: Self = Self(8);
    pub const BPS_2000: Self = Self(9);
    pub const BPS_2400: Self = Self(10);
    pub const BPS_3600: Self = Self(11);
    pub const BPS_4800: Self = Self(12);
    pub const BPS_7200: Self = Self(13);
    pub const BPS_9600: Self = Self(14);
    pub const BPS_19200: Self = Self(15);
    pub const BPS_38400: Self = Self(16);
    pub const BPS_57600: Self = Self(17);
    pub const BPS_115200: Self = Self(18);
    pub const BPS_230400: Self = Self(19);
    pub const BPS_460800: Self = Self(20);
    pub const BPS_576000: Self = Self(21);
    pub const BPS_921600: Self = Self(22);
    pub const BPS_4000000: Self = Self(23);
    pub const BPS_1152000: Self = Self(24);
    /// Vendor-specific rate programmed through a divisor; never in the table.
    pub const SPECIAL: Self = Self(0x8000_0000);
}

impl fmt::Display for RateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match rate_from_token(*self) {
            Some(rate) => write!(f, "{rate} bps"),
            None => write!(f, "token {:#x}", self.0),
        }
    }
}

/// One row of the rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateEntry {
    /// Numeric baud rate in bits per second.
    pub rate: u32,
    /// Native token for that rate.
    pub token: RateToken,
}

const fn entry(rate: u32, token: RateToken) -> RateEntry {
    RateEntry { rate, token }
}

/// Supported rates, ascending by `rate`, unique by `token`.
pub static RATE_TABLE: &[RateEntry] = &[
    entry(50, RateToken::BPS_50),
    entry(75, RateToken::BPS_75),
    entry(110, RateToken::BPS_110),
    entry(134, RateToken::BPS_134),
    entry(150, RateToken::BPS_150),
    entry(300, RateToken::BPS_300),
    entry(600, RateToken::BPS_600),
    entry(1200, RateToken::BPS_1200),
    entry(1800, RateToken::BPS_1800),
    entry(2000, RateToken::BPS_2000),
    entry(2400, RateToken::BPS_2400),
    entry(3600, RateToken::BPS_3600),
    entry(4800, RateToken::BPS_4800),
    entry(7200, RateToken::BPS_7200),
    entry(9600, RateToken::BPS_9600),
    entry(19200, RateToken::BPS_19200),
    entry(38400, RateToken::BPS_38400),
    entry(57600, RateToken::BPS_57600),
    entry(115200, RateToken::BPS_115200),
    entry(230400, RateToken::BPS_230400),
    entry(460800, RateToken::BPS_460800),
    entry(576000, RateToken::BPS_576000),
    entry(921600, RateToken::BPS_921600),
    entry(1152000, RateToken::BPS_1152000),
    entry(4000000, RateToken::BPS_4000000),
];

/// Convert a native token to its numeric rate.
///
/// Returns `None` if the token is not in the table.
pub fn rate_from_token(token: RateToken) -> Option<u32> {
    RATE_TABLE
        .iter()
        .find(|entry| entry.token == token)
        .map(|entry| entry.rate)
}

/// Convert a numeric rate to its native token.
///
/// Returns `None` for rates the device cannot be programmed with.
pub fn token_from_rate(rate: u32) -> Option<RateToken> {
    RATE_TABLE
        .binary_search_by_key(&rate, |entry| entry.rate)
        .ok()
        .map(|idx| RATE_TABLE[idx].token)
}

/// Iterate the supported numeric rates in ascending order.
pub fn standard_rates() -> impl Iterator<Item = u32> + Clone {
    RATE_TABLE.iter().map(|entry| entry.rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_sorted_by_rate() {
        assert!(RATE_TABLE.windows(2).all(|w| w[0].rate < w[1].rate));
    }

    #[test]
    fn test_tokens_unique() {
        let tokens: HashSet<_> = RATE_TABLE.iter().map(|e| e.token).collect();
        assert_eq!(tokens.len(), RATE_TABLE.len());
    }

    #[test]
    fn test_standard_rates_strictly_ascending() {
        let rates: Vec<u32> = standard_rates().collect();
        assert_eq!(rates.len(), RATE_TABLE.len());
        assert!(rates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rates.first(), Some(&50));
        assert_eq!(rates.last(), Some(&4000000));
    }

    #[test]
    fn test_standard_rates_restartable() {
        let iter = standard_rates();
        let first: Vec<u32> = iter.clone().collect();
        let second: Vec<u32> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip_every_rate() {
        for rate in standard_rates() {
            let token = token_from_rate(rate).expect("rate in table");
            assert_eq!(rate_from_token(token), Some(rate));
        }
    }

    #[test]
    fn test_round_trip_every_token() {
        for entry in RATE_TABLE {
            let rate = rate_from_token(entry.token).expect("token in table");
            assert_eq!(token_from_rate(rate), Some(entry.token));
        }
    }

    #[test]
    fn test_unknown_lookups() {
        assert_eq!(token_from_rate(0), None);
        assert_eq!(token_from_rate(14400), None);
        assert_eq!(token_from_rate(1843200), None);
        assert_eq!(rate_from_token(RateToken::SPECIAL), None);
        assert_eq!(rate_from_token(RateToken(999)), None);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(RateToken::BPS_9600.to_string(), "9600 bps");
        assert_eq!(RateToken(0x40).to_string(), "token 0x40");
    }

    proptest! {
        #[test]
        fn prop_unlisted_rates_have_no_token(rate in any::<u32>()) {
            let listed = standard_rates().any(|r| r == rate);
            prop_assert_eq!(token_from_rate(rate).is_some(), listed);
        }
    }
}
