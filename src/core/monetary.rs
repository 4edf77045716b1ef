//! Monetary units
//!
//! Values on the ledger are whole satoshis. A coin is 100,000,000 satoshis and
//! every mined block mints a fixed subsidy; there is no halving and no fee.

/// Number of satoshis in one coin
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/// Amount minted by every coinbase transaction (50 coins)
pub const SUBSIDY: u64 = 50 * SATOSHIS_PER_COIN;

pub mod conversions {
    use super::*;

    /// Convert coins to satoshis
    ///
    /// # Examples
    /// ```
    /// use ledger_chain::core::monetary::conversions::coins_to_satoshis;
    /// assert_eq!(coins_to_satoshis(1.0), 100_000_000);
    /// assert_eq!(coins_to_satoshis(0.5), 50_000_000);
    /// ```
    pub fn coins_to_satoshis(coins: f64) -> u64 {
        (coins * SATOSHIS_PER_COIN as f64) as u64
    }

    pub fn satoshis_to_coins(satoshis: u64) -> f64 {
        satoshis as f64 / SATOSHIS_PER_COIN as f64
    }

    /// Format satoshis as a human-readable string
    ///
    /// # Examples
    /// ```
    /// use ledger_chain::core::monetary::conversions::format_satoshis;
    /// assert_eq!(format_satoshis(100_000_000), "1.00000000 coins");
    /// ```
    pub fn format_satoshis(satoshis: u64) -> String {
        format!("{:.8} coins", satoshis_to_coins(satoshis))
    }
}

#[cfg(test)]
mod tests {
    use super::conversions::*;
    use super::*;

    #[test]
    fn test_subsidy_is_fifty_coins() {
        assert_eq!(SUBSIDY, 50 * SATOSHIS_PER_COIN);
        assert_eq!(format_satoshis(SUBSIDY), "50.00000000 coins");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(coins_to_satoshis(2.5), SATOSHIS_PER_COIN * 5 / 2);
        assert_eq!(satoshis_to_coins(SATOSHIS_PER_COIN / 2), 0.5);
        assert_eq!(format_satoshis(1_000), "0.00001000 coins");
    }
}
