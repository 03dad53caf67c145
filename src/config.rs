//! Runtime configuration knobs.
//!
//! Every limit and rate the core consults at runtime lives here, with
//! defaults suitable for tests. The composition root either deserializes a
//! [`CoreConfig`] from a config file or calls [`CoreConfig::from_env`] to
//! apply `EXCHANGE_*` environment overrides on top of the defaults.

use crate::money::{Money, Qty};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All environment-tunable parameters of the trading core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Per-user per-symbol position size cap.
    pub max_position_size: Qty,
    /// Global per-user notional cap across all positions.
    pub max_notional_per_user: Money,
    /// Maximum number of open positions per user.
    pub max_open_positions: usize,
    /// Per-product open interest cap (sum of long sizes).
    pub max_open_interest: Qty,
    /// Absolute bound for dynamic funding rates, parts per million.
    pub max_funding_rate_ppm: i64,
    /// Fraction of gross trade revenue contributed to the insurance fund,
    /// parts per million.
    pub insurance_contribution_ppm: i64,
    /// VAT rate applied to explicit fee revenue, parts per million.
    pub vat_rate_ppm: i64,
    /// Unhedged USD exposure threshold that triggers a hedge order.
    pub hedge_threshold_usd: f64,
    /// Interval between hedge checks, seconds.
    pub hedge_check_interval_secs: u64,
    /// Directory for the human-readable audit ledgers.
    pub ledger_dir: PathBuf,
    /// Directory for the accounting journal and other durable state.
    pub data_dir: PathBuf,

    /// Pre-trade band around the current market price, parts per million;
    /// limit orders further away are rejected.
    pub away_from_market_ppm: i64,
    /// Per-user daily realized loss cap.
    pub daily_loss_cap: Money,
    /// Per-user order submissions allowed per rate window; 0 disables.
    pub order_rate_limit: u32,
    /// Rate limit window, microseconds.
    pub order_rate_window_micros: u64,

    /// Circuit breaker band around the reference price, parts per million.
    pub breaker_band_ppm: i64,
    /// Cooldown before a limit-up/limit-down state clears, microseconds.
    pub breaker_cooldown_micros: u64,

    /// Postings between accounting reconciliation passes.
    pub reconcile_every: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_position_size: Qty::from_units(1_000),
            max_notional_per_user: Money::from_mnt(10_000_000_000),
            max_open_positions: 64,
            max_open_interest: Qty::from_units(100_000),
            max_funding_rate_ppm: 7_500,
            insurance_contribution_ppm: 100_000,
            vat_rate_ppm: 100_000,
            hedge_threshold_usd: 50_000.0,
            hedge_check_interval_secs: 60,
            ledger_dir: PathBuf::from("ledger"),
            data_dir: PathBuf::from("data"),
            away_from_market_ppm: 200_000,
            daily_loss_cap: Money::from_mnt(1_000_000_000),
            order_rate_limit: 0,
            order_rate_window_micros: 1_000_000,
            breaker_band_ppm: 20_000,
            breaker_cooldown_micros: 300_000_000,
            reconcile_every: 100,
        }
    }
}

impl CoreConfig {
    /// Build a config from defaults plus `EXCHANGE_*` environment overrides.
    ///
    /// Unparseable values are ignored in favor of the default; missing
    /// variables leave the default untouched.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_i64("EXCHANGE_MAX_POSITION_SIZE") {
            cfg.max_position_size = Qty::from_scaled(v.max(0) as u64);
        }
        if let Some(v) = env_i64("EXCHANGE_MAX_NOTIONAL_PER_USER") {
            cfg.max_notional_per_user = Money::from_micros(v);
        }
        if let Some(v) = env_i64("EXCHANGE_MAX_OPEN_POSITIONS") {
            cfg.max_open_positions = v.max(0) as usize;
        }
        if let Some(v) = env_i64("EXCHANGE_MAX_OPEN_INTEREST") {
            cfg.max_open_interest = Qty::from_scaled(v.max(0) as u64);
        }
        if let Some(v) = env_i64("EXCHANGE_MAX_FUNDING_RATE_PPM") {
            cfg.max_funding_rate_ppm = v;
        }
        if let Some(v) = env_i64("EXCHANGE_INSURANCE_CONTRIBUTION_PPM") {
            cfg.insurance_contribution_ppm = v;
        }
        if let Some(v) = env_i64("EXCHANGE_VAT_RATE_PPM") {
            cfg.vat_rate_ppm = v;
        }
        if let Some(v) = std::env::var("EXCHANGE_HEDGE_THRESHOLD_USD")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
        {
            cfg.hedge_threshold_usd = v;
        }
        if let Some(v) = env_i64("EXCHANGE_HEDGE_CHECK_INTERVAL_SECS") {
            cfg.hedge_check_interval_secs = v.max(0) as u64;
        }
        if let Ok(v) = std::env::var("EXCHANGE_LEDGER_DIR") {
            cfg.ledger_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EXCHANGE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_i64("EXCHANGE_DAILY_LOSS_CAP") {
            cfg.daily_loss_cap = Money::from_micros(v);
        }
        if let Some(v) = env_i64("EXCHANGE_ORDER_RATE_LIMIT") {
            cfg.order_rate_limit = v.max(0) as u32;
        }
        cfg
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|s| s.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = CoreConfig::default();
        assert!(cfg.insurance_contribution_ppm > 0);
        assert!(cfg.vat_rate_ppm > 0);
        assert!(cfg.breaker_band_ppm > 0);
        assert_eq!(cfg.order_rate_limit, 0);
    }

    #[test]
    fn test_serde_round_trip() {
        let cfg = CoreConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_open_positions, cfg.max_open_positions);
        assert_eq!(back.vat_rate_ppm, cfg.vat_rate_ppm);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: CoreConfig = serde_json::from_str(r#"{"vat_rate_ppm": 50000}"#).unwrap();
        assert_eq!(cfg.vat_rate_ppm, 50_000);
        assert_eq!(cfg.reconcile_every, CoreConfig::default().reconcile_every);
    }
}
