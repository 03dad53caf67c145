//! Boundary behaviors, round-trips and idempotence at the engine surface.

mod common;

use common::*;
use exchange_core_rs::error::RejectReason;
use exchange_core_rs::money::{Money, Qty};
use exchange_core_rs::orderbook::{OrderKind, OrderStatus, Side};
use tempfile::tempdir;

#[test]
fn order_size_bounds_are_inclusive() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(1_000_000_000)).unwrap();

    // Exactly min_order (0.001) accepted.
    let ack = core.submit_at(
        limit(1, "XAU-SPOT", Side::Buy, micro(100_000), Qty::from_scaled(1_000)),
        1_000,
    );
    assert!(ack.is_ok());
    // Below min: only reachable below the lot so it trips the lot gate.
    let err = core
        .submit_at(
            limit(1, "XAU-SPOT", Side::Buy, micro(100_000), Qty::from_scaled(500)),
            2_000,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RejectReason::InvalidLot { .. } | RejectReason::SizeOutOfRange { .. }
    ));
    // Exactly max_order accepted, one lot above rejected.
    assert!(
        core.submit_at(
            limit(1, "XAU-SPOT", Side::Buy, micro(100_000), Qty::from_units(1_000)),
            3_000,
        )
        .is_ok()
    );
    let err = core
        .submit_at(
            limit(
                1,
                "XAU-SPOT",
                Side::Buy,
                micro(100_000),
                Qty::from_scaled(1_000 * 1_000_000 + 1_000),
            ),
            4_000,
        )
        .unwrap_err();
    assert!(matches!(err, RejectReason::SizeOutOfRange { .. }));
}

#[test]
fn min_notional_boundary() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(1_000_000)).unwrap();

    // XAU-SPOT min_notional is 100 MNT: exactly 100 accepted.
    assert!(
        core.submit_at(
            limit(1, "XAU-SPOT", Side::Buy, micro(100_000), Qty::from_scaled(1_000)),
            1_000,
        )
        .is_ok()
    );
    // 99.9 MNT rejected.
    let err = core
        .submit_at(
            limit(1, "XAU-SPOT", Side::Buy, micro(99_900), Qty::from_scaled(1_000)),
            2_000,
        )
        .unwrap_err();
    assert!(matches!(err, RejectReason::NotionalTooSmall { .. }));
}

#[test]
fn market_order_against_empty_book() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    let before = core.account(1);

    let ack = core
        .submit_at(market(1, "BTC-PERP", Side::Buy, units(1)), 1_000)
        .unwrap();
    assert!(ack.trades.is_empty());
    assert_eq!(ack.status, OrderStatus::Cancelled);
    // Zero reservation: the account is exactly as it was.
    let after = core.account(1);
    assert_eq!(after.balance, before.balance);
    assert_eq!(after.available, before.available);
    assert_eq!(after.order_margin, Money::ZERO);
    assert_identity(&core);
}

#[test]
fn post_only_that_would_cross_is_rejected() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    core.deposit(2, mnt(10_000_000)).unwrap();

    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(100_000), units(1)), 1_000)
        .unwrap();
    let depth_before = core.depth("XAU-SPOT", 10).unwrap();

    let mut request = limit(2, "XAU-SPOT", Side::Buy, micro(100_000), units(1));
    request.kind = OrderKind::PostOnly;
    let err = core.submit_at(request, 2_000).unwrap_err();
    assert!(matches!(err, RejectReason::WouldCross { .. }));

    // Book unchanged, nothing reserved for the rejected order.
    let depth_after = core.depth("XAU-SPOT", 10).unwrap();
    assert_eq!(depth_before.asks, depth_after.asks);
    assert_eq!(depth_before.bids, depth_after.bids);
    assert_eq!(core.account(2).order_margin, Money::ZERO);

    // A non-crossing post-only rests normally.
    let mut request = limit(2, "XAU-SPOT", Side::Buy, micro(99_000), units(1));
    request.kind = OrderKind::PostOnly;
    let ack = core.submit_at(request, 3_000).unwrap();
    assert_eq!(ack.status, OrderStatus::Working);
    assert!(ack.trades.is_empty());
}

#[test]
fn fill_or_kill_rejects_partial_liquidity() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    core.deposit(2, mnt(10_000_000)).unwrap();

    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(100_000), units(1)), 1_000)
        .unwrap();
    let mut request = limit(2, "XAU-SPOT", Side::Buy, micro(100_000), units(2));
    request.kind = OrderKind::FillOrKill;
    let err = core.submit_at(request.clone(), 2_000).unwrap_err();
    assert!(matches!(err, RejectReason::UnfillableFillOrKill { .. }));
    // Zero trades, book unchanged.
    assert_eq!(core.depth("XAU-SPOT", 1).unwrap().asks[0].qty, units(1));

    // With enough liquidity the same order fills completely.
    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(100_000), units(1)), 3_000)
        .unwrap();
    let ack = core.submit_at(request, 4_000).unwrap();
    assert_eq!(ack.status, OrderStatus::Filled);
    assert_eq!(ack.trades.len(), 2);
}

#[test]
fn ioc_matches_then_cancels_remainder() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    core.deposit(2, mnt(10_000_000)).unwrap();

    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(100_000), units(1)), 1_000)
        .unwrap();
    let mut request = limit(2, "XAU-SPOT", Side::Buy, micro(100_000), units(3));
    request.kind = OrderKind::ImmediateOrCancel;
    let ack = core.submit_at(request, 2_000).unwrap();
    assert_eq!(ack.trades.len(), 1);
    assert_eq!(ack.status, OrderStatus::Cancelled);
    assert_eq!(ack.remaining, units(2));
    // Nothing rested and nothing stayed reserved.
    assert!(core.user_orders(2).is_empty());
    assert_eq!(core.account(2).order_margin, Money::ZERO);
    assert_identity(&core);
}

#[test]
fn submit_then_cancel_releases_reservation() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(1_000_000)).unwrap();
    let before = core.account(1);

    let ack = core
        .submit_at(limit(1, "BTC-PERP", Side::Buy, micro(1_000_000), Qty::from_scaled(2_000)), 1_000)
        .unwrap();
    // 0.002 * 1,000,000 * 10% = 200 MNT reserved.
    assert_eq!(core.account(1).order_margin, mnt(200));
    assert_eq!(core.account(1).available, before.available - mnt(200));

    let cancelled = core.cancel_at(1, ack.order_id, 2_000).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.remaining, Qty::from_scaled(2_000));
    let after = core.account(1);
    assert_eq!(after.order_margin, Money::ZERO);
    assert_eq!(after.available, before.available);
    assert_eq!(after.balance, before.balance);

    // Duplicate cancel reports not-found and changes nothing.
    let err = core.cancel_at(1, ack.order_id, 3_000).unwrap_err();
    assert_eq!(err, RejectReason::NotFound { order_id: ack.order_id });
    assert_identity(&core);
}

#[test]
fn cancel_of_foreign_order_is_not_found() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(1_000_000)).unwrap();
    let ack = core
        .submit_at(limit(1, "XAU-SPOT", Side::Buy, micro(100_000), units(1)), 1_000)
        .unwrap();
    let err = core.cancel_at(99, ack.order_id, 2_000).unwrap_err();
    assert!(matches!(err, RejectReason::NotFound { .. }));
    // The order is still there for its owner.
    assert_eq!(core.user_orders(1).len(), 1);
}

#[test]
fn modify_surrenders_time_priority_and_repriced_reserve() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    core.deposit(2, mnt(10_000_000)).unwrap();
    core.deposit(3, mnt(10_000_000)).unwrap();

    let first = core
        .submit_at(limit(1, "BTC-PERP", Side::Buy, micro(1_000_000), Qty::from_scaled(1_000)), 1_000)
        .unwrap();
    core.submit_at(limit(2, "BTC-PERP", Side::Buy, micro(1_000_000), Qty::from_scaled(1_000)), 2_000)
        .unwrap();

    // User 1 modifies: same price, new quantity; queue position is lost.
    let modified = core
        .modify(1, first.order_id, micro(1_000_000), Qty::from_scaled(2_000))
        .unwrap();
    assert_ne!(modified.order_id, first.order_id);
    // Reserve reflects the new quantity: 0.002 * 1,000,000 * 10%.
    assert_eq!(core.account(1).order_margin, mnt(200));

    // A taker sell fills user 2 first now.
    let ack = core
        .submit_at(
            limit(3, "BTC-PERP", Side::Sell, micro(1_000_000), Qty::from_scaled(1_000)),
            3_000,
        )
        .unwrap();
    assert_eq!(ack.trades.len(), 1);
    assert_eq!(ack.trades[0].maker_user, 2);
    assert_identity(&core);
}

#[test]
fn stop_limit_triggers_on_trade_and_immediately_when_reached() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(10_000_000)).unwrap();
    core.deposit(2, mnt(10_000_000)).unwrap();
    core.deposit(3, mnt(10_000_000)).unwrap();

    // Seed a last price of 100,000 with a real trade.
    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(100_000), units(1)), 1_000)
        .unwrap();
    core.submit_at(limit(2, "XAU-SPOT", Side::Buy, micro(100_000), units(1)), 2_000)
        .unwrap();

    // Stop buy above the market holds untriggered.
    let mut stop = limit(3, "XAU-SPOT", Side::Buy, micro(103_000), units(1));
    stop.kind = OrderKind::StopLimit;
    stop.stop_price = Some(micro(102_000));
    let ack = core.submit_at(stop, 3_000).unwrap();
    assert_eq!(ack.status, OrderStatus::Working);
    assert!(ack.trades.is_empty());
    assert_eq!(core.user_orders(3).len(), 1);

    // A trade at 102,000 triggers it; it then lifts the resting ask.
    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(102_000), units(1)), 4_000)
        .unwrap();
    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(102_500), units(1)), 4_500)
        .unwrap();
    core.submit_at(limit(2, "XAU-SPOT", Side::Buy, micro(102_000), units(1)), 5_000)
        .unwrap();
    // The stop fired and took the 102,500 ask within its 103,000 limit.
    assert!(core.user_orders(3).is_empty());
    let trades_touching_3 = core
        .accounting()
        .entries_for_account("Liabilities:Customer:3:Balance");
    assert!(!trades_touching_3.is_empty());

    // A stop whose trigger is already reached at submission fires at once.
    core.submit_at(limit(1, "XAU-SPOT", Side::Sell, micro(102_600), units(1)), 6_000)
        .unwrap();
    let mut stop = limit(3, "XAU-SPOT", Side::Buy, micro(102_600), units(1));
    stop.kind = OrderKind::StopLimit;
    stop.stop_price = Some(micro(101_000));
    let ack = core.submit_at(stop, 7_000).unwrap();
    assert_eq!(ack.status, OrderStatus::Filled);
    assert_eq!(ack.trades.len(), 1);
    assert_eq!(ack.trades[0].price, micro(102_600));
    assert_identity(&core);
}

#[test]
fn inactive_product_and_unknown_symbol() {
    let dir = tempdir().unwrap();
    let catalog = standard_catalog();
    let mut core = build_core(dir.path(), std::sync::Arc::clone(&catalog));
    core.deposit(1, mnt(1_000_000)).unwrap();

    let err = core
        .submit_at(limit(1, "NO-SUCH", Side::Buy, micro(1), units(1)), 1_000)
        .unwrap_err();
    assert!(matches!(err, RejectReason::UnknownSymbol { .. }));

    catalog.get("XAU-SPOT").unwrap().set_active(false);
    let err = core
        .submit_at(limit(1, "XAU-SPOT", Side::Buy, micro(100_000), units(1)), 2_000)
        .unwrap_err();
    assert!(matches!(err, RejectReason::ProductNotActive { .. }));
}

#[test]
fn margin_insufficient_is_rejected_before_the_book() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(50_000)).unwrap();

    // 1 BTC-PERP at 1,000,000 needs 100,000 margin; only 50,000 there.
    let err = core
        .submit_at(limit(1, "BTC-PERP", Side::Buy, micro(1_000_000), units(1)), 1_000)
        .unwrap_err();
    assert!(matches!(err, RejectReason::MarginInsufficient { .. }));
    // Nothing rested, nothing reserved.
    assert!(core.user_orders(1).is_empty());
    assert_eq!(core.account(1).available, mnt(50_000));
}

#[test]
fn cancel_all_clears_every_book() {
    let dir = tempdir().unwrap();
    let mut core = build_core(dir.path(), standard_catalog());
    core.deposit(1, mnt(100_000_000)).unwrap();

    core.submit_at(limit(1, "XAU-SPOT", Side::Buy, micro(90_000), units(1)), 1_000)
        .unwrap();
    core.submit_at(limit(1, "BTC-PERP", Side::Buy, micro(900_000), units(1)), 2_000)
        .unwrap();
    let mut stop = limit(1, "XAU-SPOT", Side::Sell, micro(80_000), units(1));
    stop.kind = OrderKind::StopLimit;
    stop.stop_price = Some(micro(81_000));
    core.submit_at(stop, 3_000).unwrap();
    assert_eq!(core.user_orders(1).len(), 3);

    let cancelled = core.cancel_all(1);
    assert_eq!(cancelled.len(), 3);
    assert!(core.user_orders(1).is_empty());
    assert_eq!(core.account(1).order_margin, Money::ZERO);
    assert_identity(&core);
}
