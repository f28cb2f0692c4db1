//! End-to-end lifecycle tests for the live ledger.
//!
//! These follow one sale from submission through withdrawal, finalization and
//! redemption, checking the clearing outputs a caller would display.

use iico_core::{
    clearing::{acceptance, tokens_allocated, Acceptance},
    config::IicoConfig,
    Action, BatchedSettlement, BidId, IicoError, Ledger, SaleParameters, SettlementProgress,
    Timestamp,
};

// =============================================================================
// Helpers
// =============================================================================

const HOUR: i64 = 3_600_000;

fn sale(tokens_for_sale: f64, starting_bonus: f64) -> SaleParameters {
    SaleParameters::new(
        Timestamp(0),
        Timestamp(8 * HOUR),
        Timestamp(16 * HOUR),
        Timestamp(24 * HOUR),
        starting_bonus,
        tokens_for_sale,
    )
    .expect("valid sale")
}

// =============================================================================
// Worked examples
// =============================================================================

#[test]
fn single_full_bonus_bid_gets_two_thirds_of_a_million_tokens() {
    let mut ledger = Ledger::new(sale(1_000_000.0, 1.0));
    let id = ledger
        .submit_bid("alice", 100.0, 1_000.0, Timestamp(HOUR))
        .unwrap();

    let state = ledger.state().clone();
    assert_eq!(state.valuation, 100.0);
    assert_eq!(state.virtual_valuation, 300.0);

    let view = ledger.bid_view(id, Timestamp(HOUR)).unwrap();
    assert!((view.token_price - 0.00015).abs() < 1e-15);
    assert_eq!(view.tokens.round(), 666_667.0);

    ledger.finalize_now(Timestamp(24 * HOUR)).unwrap();
    let redemption = ledger.redeem_bid(id).unwrap();
    assert_eq!(redemption.tokens.round(), 666_667.0);
    assert_eq!(redemption.refund, 0.0);
}

#[test]
fn bid_at_its_own_cap_is_the_cut_off_and_lower_cap_is_rejected() {
    let mut ledger = Ledger::new(sale(1_000.0, 0.0));
    let a = ledger.submit_bid("a", 600.0, 600.0, Timestamp(0)).unwrap();
    let b = ledger.submit_bid("b", 500.0, 500.0, Timestamp(0)).unwrap();

    let state = ledger.state();
    assert_eq!(state.cut_off_bid_id, Some(a));
    assert_eq!(state.cut_off_bid_contrib, 600.0);
    assert_eq!(state.valuation, 600.0);

    let bid_b = ledger.bid(b).unwrap();
    assert_eq!(acceptance(state, bid_b), Acceptance::Rejected);
    assert_eq!(
        tokens_allocated(ledger.params(), state, bid_b).unwrap(),
        0.0
    );
}

#[test]
fn equal_caps_serve_later_bids_first() {
    let mut ledger = Ledger::new(sale(1_000.0, 0.0));
    let early = ledger.submit_bid("early", 70.0, 100.0, Timestamp(0)).unwrap();
    let late = ledger.submit_bid("late", 70.0, 100.0, Timestamp(1)).unwrap();

    let state = ledger.state();
    assert_eq!(state.cut_off_bid_id, Some(early));
    assert_eq!(state.cut_off_bid_contrib, 30.0);
    assert_eq!(acceptance(state, ledger.bid(late).unwrap()), Acceptance::Full);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn later_bids_earn_less_bonus() {
    let ledger = Ledger::new(sale(1e9, 0.2));
    assert_eq!(ledger.current_bonus(Timestamp(HOUR)), 0.2);
    assert_eq!(ledger.current_bonus(Timestamp(8 * HOUR)), 0.2);
    assert!((ledger.current_bonus(Timestamp(16 * HOUR)) - 0.1).abs() < 1e-12);
    assert_eq!(ledger.current_bonus(Timestamp(24 * HOUR)), 0.0);
}

#[test]
fn withdrawal_reduces_contribution_and_reopens_room() {
    let mut ledger = Ledger::new(sale(1e9, 0.3));
    let big = ledger.submit_bid("big", 900.0, 10_000.0, Timestamp(0)).unwrap();
    let capped = ledger.submit_bid("capped", 200.0, 1_000.0, Timestamp(0)).unwrap();
    assert_eq!(ledger.state().cut_off_bid_id, Some(capped));
    assert_eq!(ledger.state().cut_off_bid_contrib, 100.0);

    // A quarter of the lock-in span has elapsed: 25% of 900 stays.
    let quote = ledger.withdraw_bid(big, Timestamp(10 * HOUR)).unwrap();
    assert_eq!(quote.locked_in, 225.0);
    assert_eq!(quote.released, 675.0);
    assert!((quote.new_bonus - 0.2).abs() < 1e-12);

    let state = ledger.state();
    assert_eq!(state.valuation, 425.0);
    assert_eq!(state.cut_off_bid_id, Some(capped));
    assert_eq!(state.cut_off_bid_contrib, 200.0);
    assert_eq!(
        ledger.available_action(big, Timestamp(10 * HOUR)).unwrap(),
        Action::None
    );
}

#[test]
fn withdrawal_before_full_bonus_end_forfeits_the_bid() {
    let mut ledger = Ledger::new(sale(1e9, 0.3));
    let id = ledger.submit_bid("a", 50.0, 1_000.0, Timestamp(0)).unwrap();
    let quote = ledger.withdraw_bid(id, Timestamp(HOUR)).unwrap();
    assert_eq!(quote.locked_in, 0.0);
    assert_eq!(ledger.bid(id).unwrap().contrib, 0.0);
    assert_eq!(ledger.state().valuation, 0.0);
}

#[test]
fn failed_operations_leave_the_snapshot_untouched() {
    let mut ledger = Ledger::new(sale(1e9, 0.3));
    let id = ledger.submit_bid("a", 50.0, 1_000.0, Timestamp(0)).unwrap();
    let before = ledger.snapshot();

    assert!(ledger.submit_bid("b", 50.0, 10.0, Timestamp(HOUR)).is_err());
    assert!(ledger.withdraw_bid(id, Timestamp(16 * HOUR)).is_err());
    assert!(ledger.withdraw_bid(BidId(3), Timestamp(HOUR)).is_err());
    assert!(ledger.finalize_now(Timestamp(HOUR)).is_err());
    assert!(ledger.redeem_bid(id).is_err());

    assert_eq!(ledger.snapshot(), before);
}

#[test]
fn second_finalize_fails_and_keeps_state() {
    let mut ledger = Ledger::new(sale(1e9, 0.3));
    ledger.submit_bid("a", 50.0, 1_000.0, Timestamp(0)).unwrap();
    ledger.finalize_now(Timestamp(24 * HOUR)).unwrap();
    let frozen = ledger.snapshot();

    assert!(matches!(
        ledger.finalize_now(Timestamp(25 * HOUR)),
        Err(IicoError::AlreadyFinalized)
    ));
    assert_eq!(ledger.snapshot(), frozen);
}

#[test]
fn batched_finalization_then_redeem_everything() {
    let config = IicoConfig::builder()
        .sale_window(0, 8 * HOUR, 16 * HOUR, 24 * HOUR)
        .starting_bonus(0.2)
        .tokens_for_sale(1e6)
        .max_iterations(2)
        .build()
        .unwrap();
    let mut ledger = Ledger::new(config.sale.to_params().unwrap());
    let ids: Vec<BidId> = (0..5)
        .map(|i| {
            ledger
                .submit_bid(format!("c{i}"), 100.0, 350.0 + 100.0 * i as f64, Timestamp(i * HOUR))
                .unwrap()
        })
        .collect();

    let mut settlement = BatchedSettlement::new();
    let end = Timestamp(24 * HOUR);
    let mut calls = 0;
    loop {
        calls += 1;
        match ledger
            .finalize(end, config.settlement.max_iterations, &mut settlement)
            .unwrap()
        {
            SettlementProgress::Complete { .. } => break,
            SettlementProgress::Partial { .. } => {}
        }
    }
    assert_eq!(calls, 3);
    assert!(ledger.state().finalized);

    let valuation = ledger.state().valuation;
    let mut accepted = 0.0;
    let mut tokens = 0.0;
    for id in ids {
        let contrib = ledger.bid(id).unwrap().contrib;
        let r = ledger.redeem_bid(id).unwrap();
        accepted += contrib - r.refund;
        tokens += r.tokens;
        assert_eq!(
            ledger.available_action(id, end).unwrap(),
            Action::None
        );
    }
    assert!((accepted - valuation).abs() < 1e-9);
    // Bonus-weighted allocation never hands out more than the supply.
    assert!(tokens <= 1e6 * (1.0 + 1e-9));
}
