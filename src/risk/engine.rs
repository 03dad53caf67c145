//! Pre-trade risk checks.
//!
//! The risk engine gates price sanity, daily loss and submission rate.
//! Position-shaped limits (size, notional, open positions, open interest)
//! are enforced by the position manager, which owns the data they need;
//! both gates run before an order reaches the book.

use crate::config::CoreConfig;
use crate::error::{RejectReason, RiskBreach};
use crate::money::{Money, RATE_SCALE};
use crate::product::Product;
use crate::utils::utc_day;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

#[derive(Debug, Default)]
struct DailyLoss {
    day: u64,
    loss: Money,
}

/// Stateful pre-trade risk gate.
pub struct RiskEngine {
    config: CoreConfig,
    daily: HashMap<u64, DailyLoss>,
    submissions: HashMap<u64, VecDeque<u64>>,
}

impl RiskEngine {
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            daily: HashMap::new(),
            submissions: HashMap::new(),
        }
    }

    /// Run every pre-trade check for one submission. Records the
    /// submission against the rate window when it passes.
    pub fn pre_trade_check(
        &mut self,
        user: u64,
        product: &Product,
        limit_price: Option<u64>,
        ts: u64,
    ) -> Result<(), RejectReason> {
        if let Some(price) = limit_price {
            self.check_away_from_market(product, price)?;
        }
        self.check_daily_loss(user, ts)?;
        self.check_rate(user, ts)?;
        Ok(())
    }

    /// Reject limit prices further from the market reference than the
    /// configured band. The reference is the last trade price, falling
    /// back to the mark before the first trade.
    fn check_away_from_market(&self, product: &Product, price: u64) -> Result<(), RejectReason> {
        let reference = match product.last_price() {
            0 => product.mark_price(),
            last => last,
        };
        if reference == 0 {
            return Ok(());
        }
        let distance_ppm = ((price as i128 - reference as i128).unsigned_abs()
            * RATE_SCALE as u128)
            / reference as u128;
        if distance_ppm > self.config.away_from_market_ppm as u128 {
            trace!(price, reference, distance_ppm, "order too far from market");
            return Err(RejectReason::RiskBreach(RiskBreach::AwayFromMarket));
        }
        Ok(())
    }

    fn check_daily_loss(&self, user: u64, ts: u64) -> Result<(), RejectReason> {
        let capped = self
            .daily
            .get(&user)
            .is_some_and(|entry| entry.day == utc_day(ts) && entry.loss >= self.config.daily_loss_cap);
        if capped {
            return Err(RejectReason::RiskBreach(RiskBreach::DailyLossExceeded));
        }
        Ok(())
    }

    fn check_rate(&mut self, user: u64, ts: u64) -> Result<(), RejectReason> {
        if self.config.order_rate_limit == 0 {
            return Ok(());
        }
        let window = self.config.order_rate_window_micros;
        let recent = self.submissions.entry(user).or_default();
        while recent
            .front()
            .is_some_and(|front| ts.saturating_sub(*front) > window)
        {
            recent.pop_front();
        }
        if recent.len() >= self.config.order_rate_limit as usize {
            return Err(RejectReason::RiskBreach(RiskBreach::RateLimited));
        }
        recent.push_back(ts);
        Ok(())
    }

    /// Accumulate a realized loss into the user's daily counter. Profits
    /// do not offset losses; the counter resets at midnight UTC.
    pub fn record_realized(&mut self, user: u64, realized: Money, ts: u64) {
        if !realized.is_negative() {
            return;
        }
        let day = utc_day(ts);
        let entry = self.daily.entry(user).or_default();
        if entry.day != day {
            entry.day = day;
            entry.loss = Money::ZERO;
        }
        entry.loss += -realized;
    }

    /// The user's accumulated loss for the UTC day of `ts`.
    #[must_use]
    pub fn daily_loss(&self, user: u64, ts: u64) -> Money {
        self.daily
            .get(&user)
            .filter(|d| d.day == utc_day(ts))
            .map(|d| d.loss)
            .unwrap_or(Money::ZERO)
    }
}
