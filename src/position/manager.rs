//! The position and margin manager.
//!
//! Owns accounts, positions, per-symbol exposure and the insurance fund.
//! All mutation happens on the matcher thread; the accounting engine is
//! passed in explicitly so every economic effect lands in the journal in
//! the same call.
//!
//! Margin sufficiency is enforced before an order reaches the book. By the
//! time a fill arrives here the trade is final, so this module never
//! rejects a fill; it only settles it.

use super::account::{AccountView, UserAccount};
use super::exposure::Exposure;
use super::position::Position;
use crate::accounting::{AccountingEngine, EventKind, JournalError, Posting, paths};
use crate::config::CoreConfig;
use crate::error::{RejectReason, RiskBreach};
use crate::money::{Money, Qty, notional, signed_notional, weighted_entry_price};
use crate::product::{Product, ProductCatalog};
use tracing::{debug, trace, warn};

use std::collections::HashMap;

/// Monetary effects of settling one fill for one user.
#[derive(Debug, Clone, Default)]
pub struct FillSettlement {
    /// Realized P&L credited (or debited) to the balance.
    pub realized: Money,
    /// Margin newly locked for opened quantity.
    pub margin_locked: Money,
    /// Margin released for closed quantity.
    pub margin_released: Money,
    /// Quantity that reduced an existing position, `QTY_SCALE` units.
    pub closed_qty: u64,
    /// Quantity that opened or added to a position, `QTY_SCALE` units.
    pub opened_qty: u64,
}

/// Accounts, positions, exposure and the insurance fund.
pub struct PositionManager {
    accounts: HashMap<u64, UserAccount>,
    positions: HashMap<(u64, String), Position>,
    /// Resting-order margin reserves: order id to `(user, amount)`.
    order_reserves: HashMap<u64, (u64, Money)>,
    exposures: HashMap<String, Exposure>,
    insurance_fund: Money,
    config: CoreConfig,
}

impl PositionManager {
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            accounts: HashMap::new(),
            positions: HashMap::new(),
            order_reserves: HashMap::new(),
            exposures: HashMap::new(),
            insurance_fund: Money::ZERO,
            config,
        }
    }

    /// Current insurance fund balance.
    #[must_use]
    #[inline]
    pub fn insurance_fund(&self) -> Money {
        self.insurance_fund
    }

    /// The configuration this manager enforces.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn account_entry(&mut self, user: u64) -> &mut UserAccount {
        self.accounts
            .entry(user)
            .or_insert_with(|| UserAccount::new(user))
    }

    /// Borrow an account if it exists.
    #[must_use]
    pub fn account(&self, user: u64) -> Option<&UserAccount> {
        self.accounts.get(&user)
    }

    /// Borrow a position if it exists.
    #[must_use]
    pub fn position(&self, user: u64, symbol: &str) -> Option<&Position> {
        self.positions.get(&(user, symbol.to_string()))
    }

    /// All open positions of a user.
    #[must_use]
    pub fn user_positions(&self, user: u64) -> Vec<&Position> {
        let mut out: Vec<&Position> = self
            .positions
            .values()
            .filter(|p| p.user == user)
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// All open positions on a symbol.
    #[must_use]
    pub fn symbol_positions(&self, symbol: &str) -> Vec<&Position> {
        let mut out: Vec<&Position> = self
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .collect();
        out.sort_by_key(|p| p.user);
        out
    }

    /// Per-symbol exposure, if any position exists on the symbol.
    #[must_use]
    pub fn exposure(&self, symbol: &str) -> Option<&Exposure> {
        self.exposures.get(symbol)
    }

    /// All `(user, symbol)` position keys, sorted for deterministic walks.
    #[must_use]
    pub(super) fn position_keys(&self) -> Vec<(u64, String)> {
        let mut keys: Vec<(u64, String)> = self.positions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Users holding at least one open position.
    #[must_use]
    pub(super) fn user_positions_owners(&self) -> Vec<u64> {
        let mut users: Vec<u64> = self.positions.values().map(|p| p.user).collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    /// Adjust cash directly; the caller has already journaled the movement.
    pub(super) fn adjust_balance(&mut self, user: u64, delta: Money) {
        self.account_entry(user).balance += delta;
    }

    /// Sum of unrealized P&L across a user's positions at current marks.
    #[must_use]
    pub fn unrealized_total(&self, user: u64, catalog: &ProductCatalog) -> Money {
        self.positions
            .values()
            .filter(|p| p.user == user)
            .map(|p| {
                catalog
                    .get(&p.symbol)
                    .map(|prod| p.unrealized(prod.mark_price()))
                    .unwrap_or(Money::ZERO)
            })
            .sum()
    }

    /// Full account read-model with derived fields.
    #[must_use]
    pub fn account_view(&self, user: u64, catalog: &ProductCatalog) -> AccountView {
        let unrealized = self.unrealized_total(user, catalog);
        let open_positions = self.positions.values().filter(|p| p.user == user).count();
        match self.accounts.get(&user) {
            Some(acct) => AccountView {
                user,
                balance: acct.balance,
                unrealized,
                equity: acct.equity(unrealized),
                position_margin: acct.position_margin,
                order_margin: acct.order_margin,
                available: acct.available(unrealized),
                margin_ratio_ppm: acct.margin_ratio_ppm(unrealized),
                open_positions,
            },
            None => AccountView {
                user,
                balance: Money::ZERO,
                unrealized: Money::ZERO,
                equity: Money::ZERO,
                position_margin: Money::ZERO,
                order_margin: Money::ZERO,
                available: Money::ZERO,
                margin_ratio_ppm: None,
                open_positions: 0,
            },
        }
    }

    /// Credit a customer deposit.
    pub fn deposit(
        &mut self,
        user: u64,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<(), JournalError> {
        accounting.post_batch(
            ts,
            EventKind::Deposit,
            &[Posting::new(paths::CASH, paths::customer_balance(user), amount)],
            &format!("user-{user}"),
            "customer deposit",
        )?;
        self.account_entry(user).balance += amount;
        Ok(())
    }

    /// Debit a customer withdrawal after an availability check.
    pub fn withdraw(
        &mut self,
        user: u64,
        amount: Money,
        catalog: &ProductCatalog,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<(), RejectReason> {
        let unrealized = self.unrealized_total(user, catalog);
        let available = self
            .accounts
            .get(&user)
            .map(|a| a.available(unrealized))
            .unwrap_or(Money::ZERO);
        if available < amount {
            return Err(RejectReason::MarginInsufficient {
                required: amount,
                available,
            });
        }
        accounting
            .post_batch(
                ts,
                EventKind::Withdrawal,
                &[Posting::new(paths::customer_balance(user), paths::CASH, amount)],
                &format!("user-{user}"),
                "customer withdrawal",
            )
            .map_err(|_| RejectReason::IntakeStopped)?;
        self.account_entry(user).balance -= amount;
        Ok(())
    }

    /// Reserve initial margin for a resting order.
    ///
    /// Reserved on `|remaining| * price * initial_margin_rate` at submit;
    /// released proportionally as fills consume the remainder and fully on
    /// cancel.
    pub fn reserve_order_margin(
        &mut self,
        order_id: u64,
        user: u64,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<(), JournalError> {
        if amount.is_zero() {
            return Ok(());
        }
        accounting.post_batch(
            ts,
            EventKind::MarginLock,
            &[Posting::new(
                paths::customer_balance(user),
                paths::customer_margin(user),
                amount,
            )],
            &format!("order-{order_id}"),
            "order margin reserved",
        )?;
        self.account_entry(user).order_margin += amount;
        self.order_reserves.insert(order_id, (user, amount));
        Ok(())
    }

    /// Release part (or all) of an order's margin reserve.
    ///
    /// `amount = None` releases the whole remaining reserve (cancel path).
    pub fn release_order_margin(
        &mut self,
        order_id: u64,
        amount: Option<Money>,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<Money, JournalError> {
        let Some((user, reserved)) = self.order_reserves.get(&order_id).copied() else {
            return Ok(Money::ZERO);
        };
        let release = amount.unwrap_or(reserved).min(reserved);
        if release.is_zero() {
            return Ok(Money::ZERO);
        }
        accounting.post_batch(
            ts,
            EventKind::MarginRelease,
            &[Posting::new(
                paths::customer_margin(user),
                paths::customer_balance(user),
                release,
            )],
            &format!("order-{order_id}"),
            "order margin released",
        )?;
        self.account_entry(user).order_margin -= release;
        let remaining = reserved - release;
        if remaining.is_zero() {
            self.order_reserves.remove(&order_id);
        } else {
            self.order_reserves.insert(order_id, (user, remaining));
        }
        Ok(release)
    }

    /// Remaining reserve for an order, if any.
    #[must_use]
    pub fn order_reserve(&self, order_id: u64) -> Option<Money> {
        self.order_reserves.get(&order_id).map(|(_, m)| *m)
    }

    /// Hard position limits checked at submission time.
    pub fn check_limits(
        &self,
        user: u64,
        product: &Product,
        delta: i64,
        price: u64,
        catalog: &ProductCatalog,
    ) -> Result<(), RejectReason> {
        let symbol = product.symbol();
        let current = self
            .positions
            .get(&(user, symbol.to_string()))
            .map(|p| p.size)
            .unwrap_or(0);
        let projected = current.saturating_add(delta);

        if projected.unsigned_abs() > self.config.max_position_size.raw() {
            return Err(RejectReason::PositionLimit(RiskBreach::PositionCap));
        }

        // Global notional across all of the user's positions, at marks,
        // plus the incremental notional of this order.
        let mut total = Money::ZERO;
        for p in self.positions.values().filter(|p| p.user == user) {
            if let Some(prod) = catalog.get(&p.symbol) {
                total += signed_notional(prod.mark_price(), p.size).abs();
            }
        }
        total += notional(price, Qty::from_scaled(delta.unsigned_abs()));
        if total > self.config.max_notional_per_user {
            return Err(RejectReason::PositionLimit(RiskBreach::NotionalCap));
        }

        if current == 0 && delta != 0 {
            let open = self.positions.values().filter(|p| p.user == user).count();
            if open >= self.config.max_open_positions {
                return Err(RejectReason::PositionLimit(RiskBreach::OpenPositionsCap));
            }
        }

        // Open interest grows by the increase of this user's long size.
        let oi_increase = projected.max(0).saturating_sub(current.max(0));
        if oi_increase > 0 {
            let oi = self
                .exposures
                .get(symbol)
                .map(|e| e.long_interest)
                .unwrap_or(0);
            if oi.saturating_add(oi_increase as u64) > self.config.max_open_interest.raw() {
                return Err(RejectReason::OpenInterestLimit {
                    symbol: symbol.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Settle a signed size delta against the `(user, symbol)` position.
    ///
    /// `delta` is positive for buys, negative for sells, in `QTY_SCALE`
    /// units. Handles open, add, reduce and flip; realized P&L and margin
    /// movements are journaled in the same call.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_fill(
        &mut self,
        user: u64,
        product: &Product,
        delta: i64,
        price: u64,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<FillSettlement, JournalError> {
        debug_assert!(delta != 0, "zero-size fill");
        let symbol = product.symbol().to_string();
        let margin_ppm = product.def().initial_margin_ppm;
        let mut settlement = FillSettlement::default();

        let key = (user, symbol.clone());
        let old_size = self.positions.get(&key).map(|p| p.size).unwrap_or(0);

        let same_side = old_size == 0 || old_size.signum() == delta.signum();
        if same_side {
            self.open_or_add(&key, delta, price, margin_ppm, ts, accounting, reference, &mut settlement)?;
        } else {
            let close_qty = old_size.unsigned_abs().min(delta.unsigned_abs());
            self.reduce(&key, close_qty, price, ts, accounting, reference, &mut settlement)?;
            let flip = delta.unsigned_abs() - close_qty;
            if flip > 0 {
                let flip_delta = delta.signum() * flip as i64;
                self.open_or_add(&key, flip_delta, price, margin_ppm, ts, accounting, reference, &mut settlement)?;
            }
        }

        let new_size = self.positions.get(&key).map(|p| p.size).unwrap_or(0);
        self.update_exposure(&symbol, old_size, new_size);
        trace!(user, %symbol, delta, price, realized = %settlement.realized, "fill settled");
        Ok(settlement)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_or_add(
        &mut self,
        key: &(u64, String),
        delta: i64,
        price: u64,
        margin_ppm: i64,
        ts: u64,
        accounting: &mut AccountingEngine,
        reference: &str,
        settlement: &mut FillSettlement,
    ) -> Result<(), JournalError> {
        let qty = Qty::from_scaled(delta.unsigned_abs());
        let required = notional(price, qty).mul_ppm(margin_ppm);
        accounting.post_batch(
            ts,
            EventKind::MarginLock,
            &[Posting::new(
                paths::customer_balance(key.0),
                paths::customer_margin(key.0),
                required,
            )],
            reference,
            "position margin locked",
        )?;
        self.account_entry(key.0).position_margin += required;

        let position = self.positions.entry(key.clone()).or_insert_with(|| Position {
            user: key.0,
            symbol: key.1.clone(),
            size: 0,
            entry_price: price,
            margin: Money::ZERO,
            realized_pnl: Money::ZERO,
            opened_at: ts,
            updated_at: ts,
        });
        position.entry_price = weighted_entry_price(
            position.size.unsigned_abs(),
            position.entry_price,
            delta.unsigned_abs(),
            price,
        );
        position.size += delta;
        position.margin += required;
        position.updated_at = ts;

        settlement.margin_locked += required;
        settlement.opened_qty += delta.unsigned_abs();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn reduce(
        &mut self,
        key: &(u64, String),
        close_qty: u64,
        price: u64,
        ts: u64,
        accounting: &mut AccountingEngine,
        reference: &str,
        settlement: &mut FillSettlement,
    ) -> Result<(), JournalError> {
        let Some(position) = self.positions.get_mut(key) else {
            return Ok(());
        };
        let old_abs = position.size.unsigned_abs();
        let close_signed = position.size.signum() * close_qty as i64;
        let realized =
            signed_notional(price, close_signed) - signed_notional(position.entry_price, close_signed);
        // Proportional margin release: margin * close_qty / |old_size|.
        let release = if close_qty >= old_abs {
            position.margin
        } else {
            Money::from_micros(
                ((position.margin.as_micros() as i128 * close_qty as i128) / old_abs as i128) as i64,
            )
        };

        accounting.post_batch(
            ts,
            EventKind::MarginRelease,
            &[Posting::new(
                paths::customer_margin(key.0),
                paths::customer_balance(key.0),
                release,
            )],
            reference,
            "position margin released",
        )?;
        accounting.post_batch(
            ts,
            EventKind::RealizedPnl,
            &[Posting::new(
                paths::PNL_POOL,
                paths::customer_balance(key.0),
                realized,
            )],
            reference,
            "realized pnl",
        )?;

        position.size -= close_signed;
        position.margin -= release;
        position.realized_pnl += realized;
        position.updated_at = ts;
        let flat = position.size == 0;
        if flat {
            self.positions.remove(key);
        }

        let account = self.account_entry(key.0);
        account.position_margin -= release;
        account.balance += realized;

        settlement.realized += realized;
        settlement.margin_released += release;
        settlement.closed_qty += close_qty;
        Ok(())
    }

    /// Force-close `close_qty` of a position at `mark`. Liquidation and ADL
    /// path; settles exactly like a reducing fill.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn force_close(
        &mut self,
        user: u64,
        symbol: &str,
        close_qty: u64,
        mark: u64,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<FillSettlement, JournalError> {
        let key = (user, symbol.to_string());
        let old_size = self.positions.get(&key).map(|p| p.size).unwrap_or(0);
        if old_size == 0 || close_qty == 0 {
            return Ok(FillSettlement::default());
        }
        let mut settlement = FillSettlement::default();
        let close_qty = close_qty.min(old_size.unsigned_abs());
        self.reduce(&key, close_qty, mark, ts, accounting, reference, &mut settlement)?;
        let new_size = self.positions.get(&key).map(|p| p.size).unwrap_or(0);
        self.update_exposure(symbol, old_size, new_size);
        Ok(settlement)
    }

    fn update_exposure(&mut self, symbol: &str, old_size: i64, new_size: i64) {
        let (net, long_interest) = {
            let exposure = self
                .exposures
                .entry(symbol.to_string())
                .or_insert_with(|| Exposure::new(symbol));
            exposure.net = exposure.net - old_size + new_size;
            exposure.long_interest = exposure
                .long_interest
                .saturating_sub(old_size.max(0) as u64)
                .saturating_add(new_size.max(0) as u64);
            (exposure.net, exposure.long_interest)
        };
        let flat = self.positions.values().all(|p| p.symbol != symbol);
        if net == 0 && long_interest == 0 && flat {
            self.exposures.remove(symbol);
        }
    }

    /// Record an external hedge fill against a symbol's exposure.
    pub fn record_hedge(&mut self, symbol: &str, filled: i64) {
        let exposure = self
            .exposures
            .entry(symbol.to_string())
            .or_insert_with(|| Exposure::new(symbol));
        exposure.hedged += filled;
        debug!(%symbol, filled, hedged = exposure.hedged, "hedge recorded");
    }

    /// Transfer spot trade value from buyer to seller.
    pub fn settle_spot_trade(
        &mut self,
        buyer: u64,
        seller: u64,
        value: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<(), JournalError> {
        accounting.post_batch(
            ts,
            EventKind::Trade,
            &[Posting::new(
                paths::customer_balance(buyer),
                paths::customer_balance(seller),
                value,
            )],
            reference,
            "spot trade value",
        )?;
        self.account_entry(buyer).balance -= value;
        self.account_entry(seller).balance += value;
        Ok(())
    }

    /// Deduct a fee or markup from a user's cash into a revenue account.
    #[allow(clippy::too_many_arguments)]
    pub fn charge_fee(
        &mut self,
        user: u64,
        amount: Money,
        revenue_path: &str,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
        description: &str,
    ) -> Result<(), JournalError> {
        if amount.is_zero() {
            return Ok(());
        }
        accounting.post_batch(
            ts,
            EventKind::TradeFee,
            &[Posting::new(paths::customer_balance(user), revenue_path, amount)],
            reference,
            description,
        )?;
        self.account_entry(user).balance -= amount;
        Ok(())
    }

    /// Move `amount` of cash into the insurance fund earmark.
    pub fn contribute_to_insurance(
        &mut self,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<(), JournalError> {
        if amount.is_zero() {
            return Ok(());
        }
        accounting.post_batch(
            ts,
            EventKind::Adjustment,
            &[Posting::new(paths::INSURANCE_FUND, paths::CASH, amount)],
            reference,
            "insurance contribution",
        )?;
        self.insurance_fund += amount;
        Ok(())
    }

    /// Seed the insurance fund directly (startup / capital injection).
    pub fn seed_insurance_fund(
        &mut self,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<(), JournalError> {
        accounting.post_batch(
            ts,
            EventKind::Adjustment,
            &[Posting::new(paths::INSURANCE_FUND, "Equity:InsuranceCapital", amount)],
            "seed",
            "insurance fund seeded",
        )?;
        self.insurance_fund += amount;
        Ok(())
    }

    /// Drain up to `amount` from the insurance fund to cover a bankruptcy.
    /// Returns what was actually absorbed.
    pub(super) fn absorb_from_insurance(
        &mut self,
        user: u64,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<Money, JournalError> {
        let absorbed = amount.min(self.insurance_fund).max(Money::ZERO);
        if absorbed.is_zero() {
            return Ok(Money::ZERO);
        }
        // Two legs: zero the customer against the insurance expense, then
        // release the fund earmark back to cash.
        accounting.post_batch(
            ts,
            EventKind::Adjustment,
            &[
                Posting::new(paths::INSURANCE_EXPENSE, paths::customer_balance(user), absorbed),
                Posting::new(paths::CASH, paths::INSURANCE_FUND, absorbed),
            ],
            reference,
            "insurance absorbed bankruptcy",
        )?;
        self.insurance_fund -= absorbed;
        self.account_entry(user).balance += absorbed;
        warn!(user, %absorbed, fund = %self.insurance_fund, "insurance fund absorbed shortfall");
        Ok(absorbed)
    }

    /// Zero a bankrupt balance against the insurance expense without fund
    /// cover; the ADL pass claws the amount back from opposing winners.
    pub(super) fn socialize_shortfall(
        &mut self,
        user: u64,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<(), JournalError> {
        accounting.post_batch(
            ts,
            EventKind::Adjustment,
            &[Posting::new(
                paths::INSURANCE_EXPENSE,
                paths::customer_balance(user),
                amount,
            )],
            reference,
            "bankruptcy shortfall pending deleveraging",
        )?;
        self.account_entry(user).balance += amount;
        Ok(())
    }

    /// Claw back realized profit from an auto-deleveraged position owner.
    pub(super) fn claw_back(
        &mut self,
        user: u64,
        amount: Money,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<(), JournalError> {
        accounting.post_batch(
            ts,
            EventKind::Adjustment,
            &[Posting::new(
                paths::customer_balance(user),
                paths::INSURANCE_EXPENSE,
                amount,
            )],
            reference,
            "adl settlement",
        )?;
        self.account_entry(user).balance -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{FeeMode, FundingMode, ProductCategory, ProductDef};
    use tempfile::tempdir;

    fn catalog_with_perp() -> ProductCatalog {
        let catalog = ProductCatalog::new();
        catalog.load(ProductDef {
            symbol: "BTC-PERP".to_string(),
            category: ProductCategory::Perpetual,
            tick_size: 1,
            lot_size: Qty::from_scaled(1_000),
            min_order: Qty::from_scaled(1_000),
            max_order: Qty::from_units(1_000),
            min_notional: Money::from_mnt(1),
            initial_margin_ppm: 100_000,
            fee_mode: FeeMode::Spread { markup_ppm: 0 },
            funding_rate_ppm: 100,
            funding_mode: FundingMode::Static,
            reference_band_ppm: None,
            hedgeable: false,
            initial_mark_price: Money::from_mnt(1_000_000).as_micros() as u64,
        });
        catalog
    }

    fn setup() -> (ProductCatalog, PositionManager, AccountingEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let accounting =
            AccountingEngine::open(&dir.path().join("journal.log"), 1_000).unwrap();
        let manager = PositionManager::new(CoreConfig::default());
        (catalog_with_perp(), manager, accounting, dir)
    }

    #[test]
    fn test_open_long_locks_margin() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(100_000), &mut accounting, 1)
            .unwrap();
        let price = Money::from_mnt(1_000_000).as_micros() as u64;
        let s = manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), price, &mut accounting, 2, "t-1")
            .unwrap();
        assert_eq!(s.margin_locked, Money::from_mnt(100_000));
        let p = manager.position(1, "BTC-PERP").unwrap();
        assert_eq!(p.size, Qty::from_units(1).as_signed());
        assert_eq!(p.entry_price, price);
        let view = manager.account_view(1, &catalog);
        assert_eq!(view.balance, Money::from_mnt(100_000));
        assert_eq!(view.position_margin, Money::from_mnt(100_000));
        assert_eq!(view.available, Money::ZERO);
    }

    #[test]
    fn test_add_same_side_averages_entry() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(400_000), &mut accounting, 1)
            .unwrap();
        let p100 = Money::from_mnt(1_000_000).as_micros() as u64;
        let p120 = Money::from_mnt(1_200_000).as_micros() as u64;
        manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), p100, &mut accounting, 2, "t-1")
            .unwrap();
        manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), p120, &mut accounting, 3, "t-2")
            .unwrap();
        let p = manager.position(1, "BTC-PERP").unwrap();
        assert_eq!(p.size, Qty::from_units(2).as_signed());
        assert_eq!(p.entry_price, Money::from_mnt(1_100_000).as_micros() as u64);
        assert_eq!(p.margin, Money::from_mnt(220_000));
    }

    #[test]
    fn test_reduce_realizes_pnl_and_releases_margin() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(200_000), &mut accounting, 1)
            .unwrap();
        let entry = Money::from_mnt(1_000_000).as_micros() as u64;
        let exit = Money::from_mnt(1_100_000).as_micros() as u64;
        manager
            .apply_fill(1, &product, Qty::from_units(2).as_signed(), entry, &mut accounting, 2, "t-1")
            .unwrap();
        let s = manager
            .apply_fill(1, &product, -Qty::from_units(1).as_signed(), exit, &mut accounting, 3, "t-2")
            .unwrap();
        assert_eq!(s.realized, Money::from_mnt(100_000));
        assert_eq!(s.margin_released, Money::from_mnt(100_000));
        let p = manager.position(1, "BTC-PERP").unwrap();
        assert_eq!(p.size, Qty::from_units(1).as_signed());
        assert_eq!(p.margin, Money::from_mnt(100_000));
        let acct = manager.account(1).unwrap();
        assert_eq!(acct.balance, Money::from_mnt(300_000));
    }

    #[test]
    fn test_full_close_removes_position() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(100_000), &mut accounting, 1)
            .unwrap();
        let entry = Money::from_mnt(1_000_000).as_micros() as u64;
        manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), entry, &mut accounting, 2, "t-1")
            .unwrap();
        manager
            .apply_fill(1, &product, -Qty::from_units(1).as_signed(), entry, &mut accounting, 3, "t-2")
            .unwrap();
        assert!(manager.position(1, "BTC-PERP").is_none());
        let acct = manager.account(1).unwrap();
        assert_eq!(acct.position_margin, Money::ZERO);
        assert_eq!(acct.balance, Money::from_mnt(100_000));
        assert!(manager.exposure("BTC-PERP").is_none());
    }

    #[test]
    fn test_flip_reopens_remainder() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(500_000), &mut accounting, 1)
            .unwrap();
        let entry = Money::from_mnt(1_000_000).as_micros() as u64;
        manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), entry, &mut accounting, 2, "t-1")
            .unwrap();
        // Sell 3 at the same price: closes 1, opens short 2.
        let s = manager
            .apply_fill(1, &product, -Qty::from_units(3).as_signed(), entry, &mut accounting, 3, "t-2")
            .unwrap();
        assert_eq!(s.closed_qty, Qty::from_units(1).raw());
        assert_eq!(s.opened_qty, Qty::from_units(2).raw());
        let p = manager.position(1, "BTC-PERP").unwrap();
        assert_eq!(p.size, -Qty::from_units(2).as_signed());
        assert_eq!(p.entry_price, entry);
        assert_eq!(p.margin, Money::from_mnt(200_000));
        let exposure = manager.exposure("BTC-PERP").unwrap();
        assert_eq!(exposure.net, -Qty::from_units(2).as_signed());
        assert_eq!(exposure.long_interest, 0);
    }

    #[test]
    fn test_order_margin_reserve_release_round_trip() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        manager
            .deposit(1, Money::from_mnt(1_000), &mut accounting, 1)
            .unwrap();
        manager
            .reserve_order_margin(77, 1, Money::from_mnt(400), &mut accounting, 2)
            .unwrap();
        let view = manager.account_view(1, &catalog);
        assert_eq!(view.order_margin, Money::from_mnt(400));
        assert_eq!(view.available, Money::from_mnt(600));

        // Partial release on a partial fill.
        manager
            .release_order_margin(77, Some(Money::from_mnt(100)), &mut accounting, 3)
            .unwrap();
        assert_eq!(manager.order_reserve(77), Some(Money::from_mnt(300)));
        // Cancel releases the rest.
        manager
            .release_order_margin(77, None, &mut accounting, 4)
            .unwrap();
        assert_eq!(manager.order_reserve(77), None);
        let view = manager.account_view(1, &catalog);
        assert_eq!(view.available, Money::from_mnt(1_000));
        let (left, right) = accounting.identity_sums();
        assert_eq!(left, right);
    }

    #[test]
    fn test_position_cap_rejected() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        manager.config.max_position_size = Qty::from_units(5);
        let product = catalog.get("BTC-PERP").unwrap();
        manager
            .deposit(1, Money::from_mnt(10_000_000), &mut accounting, 1)
            .unwrap();
        let err = manager
            .check_limits(1, &product, Qty::from_units(6).as_signed(), product.mark_price(), &catalog)
            .unwrap_err();
        assert_eq!(err, RejectReason::PositionLimit(RiskBreach::PositionCap));
        assert!(
            manager
                .check_limits(1, &product, Qty::from_units(5).as_signed(), product.mark_price(), &catalog)
                .is_ok()
        );
    }

    #[test]
    fn test_open_interest_cap() {
        let (catalog, mut manager, mut accounting, _dir) = setup();
        manager.config.max_open_interest = Qty::from_units(1);
        let product = catalog.get("BTC-PERP").unwrap();
        let price = product.mark_price();
        manager
            .deposit(1, Money::from_mnt(1_000_000), &mut accounting, 1)
            .unwrap();
        manager
            .apply_fill(1, &product, Qty::from_units(1).as_signed(), price, &mut accounting, 2, "t-1")
            .unwrap();
        let err = manager
            .check_limits(2, &product, Qty::from_units(1).as_signed(), price, &catalog)
            .unwrap_err();
        assert!(matches!(err, RejectReason::OpenInterestLimit { .. }));
        // A short does not add open interest.
        assert!(
            manager
                .check_limits(2, &product, -Qty::from_units(1).as_signed(), price, &catalog)
                .is_ok()
        );
    }
}
