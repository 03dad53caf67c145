//! The matching engine core: submission gates, matching, settlement.
//!
//! `ExchangeCore` owns every mutable piece of the trading core (books,
//! positions, accounting, risk state, breakers) and is driven from a single
//! matcher thread (see the `ingress` module). Each submission runs the full
//! gate sequence, matches against the book, and settles every resulting
//! trade before the next command is taken: last price, breaker, position
//! or spot transfer, fees or spread, insurance contribution, VAT, journal
//! postings, stop re-evaluation.

use crate::accounting::{AccountingEngine, JournalError, paths};
use crate::config::CoreConfig;
use crate::error::RejectReason;
use crate::events::EventSinks;
use crate::feeds::{HedgeBackend, Quote, RateQuote};
use crate::ledger::{LedgerFiles, LedgerStream};
use crate::money::{Money, Qty, notional};
use crate::orderbook::{
    Bbo, DepthSnapshot, Order, OrderBook, OrderKind, OrderStatus, Side,
};
use crate::position::{
    AccountView, FundingEvent, LiquidationReport, PositionManager, plan_hedge,
};
use crate::product::{FeeMode, Product, ProductCatalog, ProductCategory};
use crate::risk::{BreakerState, CircuitBreaker, RiskEngine};
use crate::utils::current_time_micros;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// An executed trade, immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Trade {
    /// Monotonic trade id across the exchange.
    pub id: u64,
    /// Traded symbol.
    pub symbol: String,
    /// Execution price, micro-MNT.
    pub price: u64,
    /// Executed quantity.
    pub quantity: Qty,
    /// The aggressive (incoming) user.
    pub taker_user: u64,
    /// The passive (resting) user.
    pub maker_user: u64,
    /// Side of the taker.
    pub taker_side: Side,
    /// Execution timestamp, micros since epoch.
    pub ts: u64,
}

/// A new order submission.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Submitting user.
    pub user: u64,
    /// Target symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Order kind.
    pub kind: OrderKind,
    /// Limit price, micro-MNT; required for all price-bearing kinds.
    pub limit_price: Option<u64>,
    /// Stop trigger price; required for stop-limit orders.
    pub stop_price: Option<u64>,
    /// Order quantity.
    pub quantity: Qty,
    /// Optional caller reference echoed on events.
    pub client_ref: Option<String>,
}

/// The accepted-submission result.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Engine-assigned order id.
    pub order_id: u64,
    /// Final status after synchronous processing.
    pub status: OrderStatus,
    /// Quantity still open (resting or held).
    pub remaining: Qty,
    /// Trades generated by this submission, in execution order.
    pub trades: Vec<Trade>,
}

/// The whole trading core, owned and mutated by one matcher thread.
pub struct ExchangeCore {
    config: CoreConfig,
    catalog: Arc<ProductCatalog>,
    books: HashMap<String, OrderBook>,
    positions: PositionManager,
    accounting: AccountingEngine,
    risk: RiskEngine,
    breaker: CircuitBreaker,
    events: EventSinks,
    ledgers: LedgerFiles,
    /// Open order id to symbol, maintained for cancel and queries.
    order_symbols: HashMap<u64, String>,
    next_order_id: u64,
    next_trade_id: u64,
}

impl ExchangeCore {
    /// Assemble the core from its parts. Books and breakers are created
    /// for every product in the catalog.
    #[must_use]
    pub fn new(
        catalog: Arc<ProductCatalog>,
        config: CoreConfig,
        accounting: AccountingEngine,
        ledgers: LedgerFiles,
    ) -> Self {
        let mut books = HashMap::new();
        let mut breaker =
            CircuitBreaker::new(config.breaker_band_ppm, config.breaker_cooldown_micros);
        for symbol in catalog.symbols() {
            if let Some(product) = catalog.get(&symbol) {
                breaker.register(&symbol, product.mark_price());
            }
            books.insert(symbol.clone(), OrderBook::new(&symbol));
        }
        Self {
            positions: PositionManager::new(config.clone()),
            risk: RiskEngine::new(config.clone()),
            breaker,
            events: EventSinks::default(),
            ledgers,
            order_symbols: HashMap::new(),
            next_order_id: 1,
            next_trade_id: 1,
            books,
            catalog,
            config,
            accounting,
        }
    }

    /// Wire the post-commit event callbacks. The breaker change callback
    /// is forwarded into the circuit breaker.
    pub fn set_event_sinks(&mut self, sinks: EventSinks) {
        if let Some(listener) = sinks.on_circuit_breaker_change.clone() {
            self.breaker.set_listener(listener);
        }
        self.events = sinks;
    }

    /// Submit an order with the current wall-clock timestamp.
    pub fn submit(&mut self, request: OrderRequest) -> Result<SubmitAck, RejectReason> {
        self.submit_at(request, current_time_micros())
    }

    /// Submit an order at an explicit timestamp (deterministic tests and
    /// replay drivers).
    pub fn submit_at(
        &mut self,
        request: OrderRequest,
        ts: u64,
    ) -> Result<SubmitAck, RejectReason> {
        if self.accounting.is_poisoned() {
            return Err(RejectReason::IntakeStopped);
        }
        let product = self
            .catalog
            .get(&request.symbol)
            .ok_or_else(|| RejectReason::UnknownSymbol {
                symbol: request.symbol.clone(),
            })?;
        self.validate(&request, &product)?;

        // Clear expired breaker states, then gate the direction.
        let last = self.last_price_of(&request.symbol).unwrap_or(0);
        self.breaker.poll(&request.symbol, ts, last);
        self.breaker.check_order(&request.symbol, request.side)?;
        self.check_reference_band(&request, &product)?;
        self.risk
            .pre_trade_check(request.user, &product, request.limit_price, ts)?;
        if product.is_derivative() {
            let delta = request.side.sign() * request.quantity.as_signed();
            let reserve_price = self.reserve_price(&request, &product)?;
            self.positions
                .check_limits(request.user, &product, delta, reserve_price, &self.catalog)?;
        }
        self.check_margin(&request, &product)?;

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let mut order = Order {
            id: order_id,
            user: request.user,
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            quantity: request.quantity,
            remaining: request.quantity,
            status: OrderStatus::Working,
            client_ref: request.client_ref.clone(),
            triggered: false,
            created_ts: ts,
        };

        // Book-shape gates that need the live book.
        {
            let book = self.book(&request.symbol)?;
            match request.kind {
                OrderKind::FillOrKill => {
                    let available = book.available_to(request.side, request.limit_price);
                    if available < request.quantity {
                        return Err(RejectReason::UnfillableFillOrKill {
                            requested: request.quantity,
                            available,
                        });
                    }
                }
                OrderKind::PostOnly => {
                    let crossing = request
                        .limit_price
                        .and_then(|price| book.crossing_price(request.side, price));
                    if let Some(opposite) = crossing {
                        return Err(RejectReason::WouldCross {
                            opposite_price: opposite,
                        });
                    }
                }
                _ => {}
            }
        }

        // Reserve funds for anything that can rest, and for IOC/FOK takers
        // while they execute. Market orders settle against cash directly.
        self.reserve_for_order(&mut order, &product, ts)
            .map_err(|_| RejectReason::IntakeStopped)?;

        // Untriggered stops go to the holding area instead of matching.
        if order.kind == OrderKind::StopLimit {
            let stop = order.stop_price.unwrap_or(0);
            let triggered_now = match self.last_price_of(&order.symbol) {
                Some(last) => match order.side {
                    Side::Buy => last >= stop,
                    Side::Sell => last <= stop,
                },
                None => false,
            };
            if !triggered_now {
                self.order_symbols.insert(order_id, order.symbol.clone());
                self.events.emit_order(&order);
                let book = self.books.get_mut(&order.symbol).expect("book exists");
                book.hold_stop(order);
                return Ok(SubmitAck {
                    order_id,
                    status: OrderStatus::Working,
                    remaining: request.quantity,
                    trades: Vec::new(),
                });
            }
            order.triggered = true;
        }

        let trades = self
            .execute(&mut order, &product, ts)
            .map_err(|_| RejectReason::IntakeStopped)?;
        let ack = SubmitAck {
            order_id,
            status: order.status,
            remaining: order.remaining,
            trades,
        };
        self.run_stop_cascade(&request.symbol, ts)
            .map_err(|_| RejectReason::IntakeStopped)?;
        Ok(ack)
    }

    /// Static request validation against the product definition.
    fn validate(&self, request: &OrderRequest, product: &Product) -> Result<(), RejectReason> {
        if !product.is_active() {
            return Err(RejectReason::ProductNotActive {
                symbol: request.symbol.clone(),
            });
        }
        if request.quantity.is_zero() {
            return Err(RejectReason::Malformed {
                message: "zero quantity".to_string(),
            });
        }
        if request.kind.is_price_bearing() {
            let Some(price) = request.limit_price else {
                return Err(RejectReason::Malformed {
                    message: "limit price required".to_string(),
                });
            };
            if price == 0 {
                return Err(RejectReason::Malformed {
                    message: "zero limit price".to_string(),
                });
            }
            let tick = product.def().tick_size;
            if tick > 0 && price % tick != 0 {
                return Err(RejectReason::InvalidTick { price, tick });
            }
        }
        if request.kind == OrderKind::StopLimit && request.stop_price.is_none() {
            return Err(RejectReason::Malformed {
                message: "stop price required".to_string(),
            });
        }
        let lot = product.def().lot_size;
        if lot.raw() > 0 && request.quantity.raw() % lot.raw() != 0 {
            return Err(RejectReason::InvalidLot {
                qty: request.quantity,
                lot,
            });
        }
        let def = product.def();
        if request.quantity < def.min_order || request.quantity > def.max_order {
            return Err(RejectReason::SizeOutOfRange {
                qty: request.quantity,
                min: def.min_order,
                max: def.max_order,
            });
        }
        let reference = request.limit_price.unwrap_or_else(|| product.mark_price());
        let value = notional(reference, request.quantity);
        if value < def.min_notional {
            return Err(RejectReason::NotionalTooSmall {
                notional: value,
                min: def.min_notional,
            });
        }
        Ok(())
    }

    /// Band validation against the external reference (banded FX symbols).
    fn check_reference_band(
        &self,
        request: &OrderRequest,
        product: &Product,
    ) -> Result<(), RejectReason> {
        let Some(band_ppm) = product.def().reference_band_ppm else {
            return Ok(());
        };
        let Some(price) = request.limit_price else {
            return Ok(());
        };
        let reference = product.mark_price();
        if reference == 0 {
            return Ok(());
        }
        let band = (reference as i128 * band_ppm as i128 / crate::money::RATE_SCALE as i128) as u64;
        let lower = reference.saturating_sub(band);
        let upper = reference.saturating_add(band);
        if price < lower || price > upper {
            return Err(RejectReason::BandBreach { price, lower, upper });
        }
        Ok(())
    }

    /// The price margin and limit projections are computed against.
    fn reserve_price(
        &self,
        request: &OrderRequest,
        product: &Product,
    ) -> Result<u64, RejectReason> {
        if let Some(price) = request.limit_price {
            return Ok(price);
        }
        // Market order: use the best quote on the matching side, falling
        // back to the mark when the book is empty.
        let book = self.book(&request.symbol)?;
        let best = match request.side {
            Side::Buy => book.best_ask(),
            Side::Sell => book.best_bid(),
        };
        Ok(best.unwrap_or_else(|| product.mark_price()))
    }

    /// Margin (derivatives) or funds (spot buys) sufficiency pre-check.
    fn check_margin(&self, request: &OrderRequest, product: &Product) -> Result<(), RejectReason> {
        let price = self.reserve_price(request, product)?;
        let required = match product.category() {
            ProductCategory::Perpetual => {
                notional(price, request.quantity).mul_ppm(product.def().initial_margin_ppm)
            }
            ProductCategory::Spot | ProductCategory::Fx => {
                if request.side == Side::Buy {
                    notional(price, request.quantity)
                } else {
                    Money::ZERO
                }
            }
        };
        if required.is_zero() {
            return Ok(());
        }
        let view = self.positions.account_view(request.user, &self.catalog);
        if view.available < required {
            return Err(RejectReason::MarginInsufficient {
                required,
                available: view.available,
            });
        }
        Ok(())
    }

    /// Reserve margin (derivatives) or funds (spot buys) for a
    /// price-bearing order before it enters the matching path.
    fn reserve_for_order(
        &mut self,
        order: &mut Order,
        product: &Product,
        ts: u64,
    ) -> Result<(), JournalError> {
        let Some(price) = order.limit_price else {
            return Ok(());
        };
        let amount = match product.category() {
            ProductCategory::Perpetual => {
                notional(price, order.quantity).mul_ppm(product.def().initial_margin_ppm)
            }
            ProductCategory::Spot | ProductCategory::Fx => {
                if order.side == Side::Buy {
                    notional(price, order.quantity)
                } else {
                    Money::ZERO
                }
            }
        };
        if amount.is_zero() {
            return Ok(());
        }
        self.positions
            .reserve_order_margin(order.id, order.user, amount, &mut self.accounting, ts)?;
        self.ledgers.write(
            LedgerStream::Margin,
            &format!("reserve order={} user={} amount={}", order.id, order.user, amount),
        );
        Ok(())
    }

    /// Match the order and settle every fill. The taker's reserve is
    /// consumed proportionally; the remainder rests or is cancelled
    /// according to the order kind.
    fn execute(
        &mut self,
        order: &mut Order,
        product: &Product,
        ts: u64,
    ) -> Result<Vec<Trade>, JournalError> {
        let symbol = order.symbol.clone();
        let fills = {
            let book = self.books.get_mut(&symbol).expect("book exists");
            book.match_incoming(order)
        };

        let mut trades = Vec::with_capacity(fills.len());
        let mut taker_remaining_before = order.quantity;
        for fill in fills {
            let trade_id = self.next_trade_id;
            self.next_trade_id += 1;
            let trade = Trade {
                id: trade_id,
                symbol: symbol.clone(),
                price: fill.price,
                quantity: fill.quantity,
                taker_user: order.user,
                maker_user: fill.maker_user,
                taker_side: order.side,
                ts,
            };
            let reference = format!("trade-{trade_id}");

            product.set_last_price(fill.price);
            self.breaker.on_trade(&symbol, fill.price, ts);

            // Proportional reserve release for both participants.
            self.release_reserve_for_fill(order.id, fill.quantity, taker_remaining_before, ts)?;
            let maker_before = fill.maker_remaining.saturating_add(fill.quantity);
            self.release_reserve_for_fill(
                fill.maker_order_id,
                fill.quantity,
                maker_before,
                ts,
            )?;
            taker_remaining_before = taker_remaining_before.saturating_sub(fill.quantity);
            if fill.maker_done {
                self.order_symbols.remove(&fill.maker_order_id);
            }

            match product.category() {
                ProductCategory::Perpetual => {
                    let taker_delta = order.side.sign() * fill.quantity.as_signed();
                    let taker_settlement = self.positions.apply_fill(
                        order.user,
                        product,
                        taker_delta,
                        fill.price,
                        &mut self.accounting,
                        ts,
                        &reference,
                    )?;
                    let maker_settlement = self.positions.apply_fill(
                        fill.maker_user,
                        product,
                        -taker_delta,
                        fill.price,
                        &mut self.accounting,
                        ts,
                        &reference,
                    )?;
                    self.risk
                        .record_realized(order.user, taker_settlement.realized, ts);
                    self.risk
                        .record_realized(fill.maker_user, maker_settlement.realized, ts);
                }
                ProductCategory::Spot | ProductCategory::Fx => {
                    let (buyer, seller) = match order.side {
                        Side::Buy => (order.user, fill.maker_user),
                        Side::Sell => (fill.maker_user, order.user),
                    };
                    let value = notional(fill.price, fill.quantity);
                    self.positions.settle_spot_trade(
                        buyer,
                        seller,
                        value,
                        &mut self.accounting,
                        ts,
                        &reference,
                    )?;
                }
            }

            self.settle_revenue(&trade, product, &reference, ts)?;

            self.ledgers.write(
                LedgerStream::Trades,
                &format!(
                    "trade={} symbol={} price={} qty={} taker={} maker={}",
                    trade.id, trade.symbol, trade.price, trade.quantity, trade.taker_user,
                    trade.maker_user
                ),
            );
            self.events.emit_trade(&trade);
            trace!(trade = trade.id, %symbol, price = trade.price, "trade settled");
            trades.push(trade);
        }

        // Remainder disposition by kind.
        if !order.remaining.is_zero() {
            if order.kind.may_rest() {
                self.order_symbols.insert(order.id, symbol.clone());
                let book = self.books.get_mut(&symbol).expect("book exists");
                book.rest_order(order.clone());
            } else {
                // Market and IOC remainders are cancelled; any leftover
                // reserve goes back.
                self.positions
                    .release_order_margin(order.id, None, &mut self.accounting, ts)?;
                order.status = OrderStatus::Cancelled;
            }
        }
        self.events.emit_order(order);
        Ok(trades)
    }

    /// Release the slice of an order's reserve consumed by one fill.
    fn release_reserve_for_fill(
        &mut self,
        order_id: u64,
        fill_qty: Qty,
        remaining_before: Qty,
        ts: u64,
    ) -> Result<(), JournalError> {
        let Some(reserve) = self.positions.order_reserve(order_id) else {
            return Ok(());
        };
        let release = if fill_qty >= remaining_before || remaining_before.is_zero() {
            reserve
        } else {
            Money::from_micros(
                ((reserve.as_micros() as i128 * fill_qty.raw() as i128)
                    / remaining_before.raw() as i128) as i64,
            )
        };
        self.positions
            .release_order_margin(order_id, Some(release), &mut self.accounting, ts)?;
        Ok(())
    }

    /// Book the exchange's cut of one trade: spread markup or explicit
    /// fees, the insurance contribution, and VAT on explicit fees only.
    fn settle_revenue(
        &mut self,
        trade: &Trade,
        product: &Product,
        reference: &str,
        ts: u64,
    ) -> Result<(), JournalError> {
        let value = notional(trade.price, trade.quantity);
        let gross = match product.def().fee_mode {
            FeeMode::Spread { markup_ppm } => {
                let markup = value.mul_ppm(markup_ppm);
                if !markup.is_zero() {
                    // The aggressor crossed the spread and carries the markup.
                    self.positions.charge_fee(
                        trade.taker_user,
                        markup,
                        &paths::spread_revenue(&trade.symbol),
                        &mut self.accounting,
                        ts,
                        reference,
                        "spread markup",
                    )?;
                }
                markup
            }
            FeeMode::Explicit {
                maker_ppm,
                taker_ppm,
                min_fee,
            } => {
                let taker_fee = fee_with_floor(value, taker_ppm, min_fee);
                let maker_fee = fee_with_floor(value, maker_ppm, min_fee);
                if !taker_fee.is_zero() {
                    self.positions.charge_fee(
                        trade.taker_user,
                        taker_fee,
                        &paths::fee_revenue(&trade.symbol),
                        &mut self.accounting,
                        ts,
                        reference,
                        "taker fee",
                    )?;
                }
                if !maker_fee.is_zero() {
                    self.positions.charge_fee(
                        trade.maker_user,
                        maker_fee,
                        &paths::fee_revenue(&trade.symbol),
                        &mut self.accounting,
                        ts,
                        reference,
                        "maker fee",
                    )?;
                }
                let fees = taker_fee + maker_fee;
                // VAT accrues on explicit fee revenue only, never on spread.
                let vat = fees.mul_ppm(self.config.vat_rate_ppm);
                if !vat.is_zero() {
                    self.accounting.post_batch(
                        ts,
                        crate::accounting::EventKind::Adjustment,
                        &[crate::accounting::Posting::new(
                            paths::fee_revenue(&trade.symbol),
                            paths::VAT_PAYABLE,
                            vat,
                        )],
                        reference,
                        "vat accrual",
                    )?;
                }
                fees
            }
        };
        let contribution = gross.mul_ppm(self.config.insurance_contribution_ppm);
        self.positions
            .contribute_to_insurance(contribution, &mut self.accounting, ts, reference)?;
        Ok(())
    }

    /// Run triggered stops through the normal matching path until no stop
    /// fires. Each triggered stop may itself move the last price.
    fn run_stop_cascade(&mut self, symbol: &str, ts: u64) -> Result<(), JournalError> {
        let Some(product) = self.catalog.get(symbol) else {
            return Ok(());
        };
        loop {
            let Some(last) = self.last_price_of(symbol) else {
                return Ok(());
            };
            let triggered = {
                let book = self.books.get_mut(symbol).expect("book exists");
                book.take_triggered_stops(last)
            };
            if triggered.is_empty() {
                return Ok(());
            }
            for mut order in triggered {
                self.order_symbols.remove(&order.id);
                debug!(order = order.id, %symbol, "stop order entering matching path");
                self.execute(&mut order, &product, ts)?;
            }
        }
    }

    fn last_price_of(&self, symbol: &str) -> Option<u64> {
        self.books.get(symbol).and_then(|b| b.last_trade_price())
    }

    fn book(&self, symbol: &str) -> Result<&OrderBook, RejectReason> {
        self.books.get(symbol).ok_or_else(|| RejectReason::UnknownSymbol {
            symbol: symbol.to_string(),
        })
    }
}

/// Fee of `value` at `rate_ppm`, floored at `min_fee` when a fee applies.
fn fee_with_floor(value: Money, rate_ppm: i64, min_fee: Money) -> Money {
    if rate_ppm <= 0 {
        return Money::ZERO;
    }
    value.mul_ppm(rate_ppm).max(min_fee)
}

/// Cancel, modify and query surface.
impl ExchangeCore {
    /// Cancel an open order. Duplicate cancels and foreign orders return
    /// not-found.
    pub fn cancel(&mut self, user: u64, order_id: u64) -> Result<Order, RejectReason> {
        self.cancel_at(user, order_id, current_time_micros())
    }

    /// Cancel at an explicit timestamp.
    pub fn cancel_at(&mut self, user: u64, order_id: u64, ts: u64) -> Result<Order, RejectReason> {
        let symbol = self
            .order_symbols
            .get(&order_id)
            .cloned()
            .ok_or(RejectReason::NotFound { order_id })?;
        let book = self
            .books
            .get_mut(&symbol)
            .ok_or(RejectReason::NotFound { order_id })?;
        let owner = book.order(order_id).map(|o| o.user);
        if owner != Some(user) {
            return Err(RejectReason::NotFound { order_id });
        }
        let mut order = book
            .cancel(order_id)
            .ok_or(RejectReason::NotFound { order_id })?;
        self.order_symbols.remove(&order_id);
        self.positions
            .release_order_margin(order_id, None, &mut self.accounting, ts)
            .map_err(|_| RejectReason::IntakeStopped)?;
        order.status = OrderStatus::Cancelled;
        self.events.emit_order(&order);
        info!(order = order_id, user, %symbol, "order cancelled");
        Ok(order)
    }

    /// Atomic cancel and resubmit at a new price and quantity. The new
    /// order goes to the back of its level's queue.
    pub fn modify(
        &mut self,
        user: u64,
        order_id: u64,
        new_price: u64,
        new_quantity: Qty,
    ) -> Result<SubmitAck, RejectReason> {
        let ts = current_time_micros();
        let existing = self.cancel_at(user, order_id, ts)?;
        self.submit_at(
            OrderRequest {
                user,
                symbol: existing.symbol,
                side: existing.side,
                kind: existing.kind,
                limit_price: Some(new_price),
                stop_price: existing.stop_price,
                quantity: new_quantity,
                client_ref: existing.client_ref,
            },
            ts,
        )
    }

    /// Cancel every open order of a user. Returns the cancelled ids.
    pub fn cancel_all(&mut self, user: u64) -> Vec<u64> {
        let ts = current_time_micros();
        let targets: Vec<u64> = self
            .books
            .values()
            .flat_map(|book| book.user_order_ids(user))
            .collect();
        let mut cancelled = Vec::new();
        for order_id in targets {
            if self.cancel_at(user, order_id, ts).is_ok() {
                cancelled.push(order_id);
            }
        }
        cancelled
    }

    /// Depth snapshot for one symbol.
    #[must_use]
    pub fn depth(&self, symbol: &str, levels: usize) -> Option<DepthSnapshot> {
        self.books
            .get(symbol)
            .map(|b| b.depth(levels, current_time_micros()))
    }

    /// Best bid and offer for one symbol.
    #[must_use]
    pub fn bbo(&self, symbol: &str) -> Option<Bbo> {
        self.books.get(symbol).map(|b| b.bbo())
    }

    /// A user's open orders across all books.
    #[must_use]
    pub fn user_orders(&self, user: u64) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .books
            .values()
            .flat_map(|b| b.user_orders(user))
            .collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Account read-model with equity, available and margin ratio.
    #[must_use]
    pub fn account(&self, user: u64) -> AccountView {
        self.positions.account_view(user, &self.catalog)
    }

    /// Borrow the position manager for position/exposure queries.
    #[must_use]
    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// Borrow the accounting engine for journal and statement queries.
    #[must_use]
    pub fn accounting(&self) -> &AccountingEngine {
        &self.accounting
    }

    /// Current breaker state of a symbol.
    #[must_use]
    pub fn breaker_state(&self, symbol: &str) -> BreakerState {
        self.breaker.state(symbol)
    }

    /// Customer deposit.
    pub fn deposit(&mut self, user: u64, amount: Money) -> Result<(), RejectReason> {
        if self.accounting.is_poisoned() {
            return Err(RejectReason::IntakeStopped);
        }
        self.positions
            .deposit(user, amount, &mut self.accounting, current_time_micros())
            .map_err(|_| RejectReason::IntakeStopped)
    }

    /// Customer withdrawal, bounded by available balance.
    pub fn withdraw(&mut self, user: u64, amount: Money) -> Result<(), RejectReason> {
        self.positions.withdraw(
            user,
            amount,
            &self.catalog,
            &mut self.accounting,
            current_time_micros(),
        )
    }

    /// Seed the insurance fund (startup capital).
    pub fn seed_insurance_fund(&mut self, amount: Money) -> Result<(), RejectReason> {
        self.positions
            .seed_insurance_fund(amount, &mut self.accounting, current_time_micros())
            .map_err(|_| RejectReason::IntakeStopped)
    }

    /// Ingest an external quote: refresh the mark price and run the
    /// liquidation sweep the new mark implies.
    pub fn on_quote(&mut self, quote: &Quote) -> Vec<LiquidationReport> {
        let Some(product) = self.catalog.get(&quote.symbol) else {
            return Vec::new();
        };
        product.set_mark_price(quote.mid);
        self.ledgers.write(
            LedgerStream::Prices,
            &format!("mark symbol={} price={} ts={}", quote.symbol, quote.mid, quote.ts),
        );
        self.run_liquidation_sweep(quote.ts)
    }

    /// Liquidate every account whose margin ratio fell below one.
    pub fn run_liquidation_sweep(&mut self, ts: u64) -> Vec<LiquidationReport> {
        let reports = match self
            .positions
            .liquidate_all_candidates(&self.catalog, &mut self.accounting, ts)
        {
            Ok(reports) => reports,
            Err(_) => return Vec::new(),
        };
        for report in &reports {
            for close in &report.closes {
                self.risk.record_realized(report.user, close.realized, ts);
                self.ledgers.write(
                    LedgerStream::Liquidations,
                    &format!(
                        "liquidation user={} symbol={} qty={} mark={} realized={}",
                        report.user, close.symbol, close.qty, close.mark, close.realized
                    ),
                );
            }
            if report.bankrupt {
                self.ledgers.comment(
                    LedgerStream::Liquidations,
                    &format!(
                        "bankruptcy user={} insurance={} deleveraged={}",
                        report.user, report.absorbed_by_insurance, report.deleveraged
                    ),
                );
            }
        }
        reports
    }

    /// Settle funding for every open derivative position.
    pub fn settle_funding(&mut self, ts: u64) -> Result<Vec<FundingEvent>, RejectReason> {
        let events = self
            .positions
            .settle_funding(&self.catalog, &mut self.accounting, ts)
            .map_err(|_| RejectReason::IntakeStopped)?;
        for event in &events {
            self.ledgers.write(
                LedgerStream::Funding,
                &format!(
                    "funding user={} symbol={} payment={} rate_ppm={}",
                    event.user, event.symbol, event.payment, event.rate_ppm
                ),
            );
        }
        Ok(events)
    }

    /// Check hedgeable exposures against the threshold and execute what is
    /// needed through the backend.
    pub fn check_hedges(
        &mut self,
        rate: &RateQuote,
        backend: &mut dyn HedgeBackend,
    ) -> Vec<crate::feeds::HedgeFill> {
        if !rate.valid {
            return Vec::new();
        }
        let mut fills = Vec::new();
        for symbol in self.catalog.symbols() {
            let Some(product) = self.catalog.get(&symbol) else {
                continue;
            };
            if !product.def().hedgeable {
                continue;
            }
            let Some(exposure) = self.positions.exposure(&symbol) else {
                continue;
            };
            let plan = plan_hedge(
                exposure,
                product.mark_price(),
                rate.rate,
                self.config.hedge_threshold_usd,
                backend.lot_size(&symbol),
            );
            if let Some(plan) = plan {
                let fill = backend.execute_hedge(&symbol, plan.qty, "exposure threshold");
                self.positions.record_hedge(&symbol, fill.filled);
                fills.push(fill);
            }
        }
        fills
    }

    /// Admin: halt one symbol.
    pub fn halt_symbol(&mut self, symbol: &str) {
        self.breaker.halt(symbol);
    }

    /// Admin: resume one symbol with a fresh reference price.
    pub fn resume_symbol(&mut self, symbol: &str) {
        let reference = self
            .last_price_of(symbol)
            .or_else(|| self.catalog.get(symbol).map(|p| p.mark_price()))
            .unwrap_or(0);
        self.breaker.resume(symbol, reference);
    }

    /// Admin: market-wide halt.
    pub fn halt_market(&mut self) {
        self.breaker.halt_market();
    }

    /// Admin: lift the market-wide halt.
    pub fn resume_market(&mut self) {
        self.breaker.resume_market();
    }
}
