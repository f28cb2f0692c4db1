//! Invariant checker for cleared sale state.

use crate::clearing::{acceptance, accepted_contribution, clearing_order, Acceptance, SaleState};
use crate::ledger::Bid;
use crate::{IicoError, Result};

/// Relative tolerance for floating-point accumulation drift.
pub const RELATIVE_TOLERANCE: f64 = 1e-9;

fn tolerance(magnitude: f64) -> f64 {
    RELATIVE_TOLERANCE * magnitude.abs().max(1.0)
}

/// Check all clearing invariants. Returns Err if any violated.
pub fn check_clearing_invariants(bids: &[Bid], state: &SaleState) -> Result<()> {
    // FiniteAggregates
    if !(state.valuation.is_finite() && state.virtual_valuation.is_finite())
        || state.valuation < 0.0
    {
        return Err(IicoError::InvariantViolation("FiniteAggregates"));
    }

    // CutOffExists
    match state.cut_off_bid_id {
        None if bids.is_empty() => return Ok(()),
        None => return Err(IicoError::InvariantViolation("CutOffExists")),
        Some(id) => {
            if !bids.iter().any(|b| b.id == id) {
                return Err(IicoError::InvariantViolation("CutOffExists"));
            }
        }
    }

    // PrefixShape: full*, at most one partial, then rejected.
    let mut boundary_seen = false;
    for bid in clearing_order(bids) {
        match acceptance(state, bid) {
            Acceptance::Full if boundary_seen => {
                return Err(IicoError::InvariantViolation("PrefixShape"));
            }
            Acceptance::Full => {}
            Acceptance::Partial { .. } if boundary_seen => {
                return Err(IicoError::InvariantViolation("SinglePartial"));
            }
            Acceptance::Partial { .. } | Acceptance::Rejected => boundary_seen = true,
        }
    }

    // AcceptedSumIsValuation
    let accepted: f64 = bids.iter().map(|b| accepted_contribution(state, b)).sum();
    if (accepted - state.valuation).abs() > tolerance(state.valuation) {
        return Err(IicoError::InvariantViolation("AcceptedSumIsValuation"));
    }

    // CutOffCapRespected: only binding when the cut-off took a positive amount; a zero
    // clamp means the prefix already passed this cap.
    if state.cut_off_bid_contrib > 0.0
        && state.valuation
            > state.cut_off_bid_max_valuation + tolerance(state.cut_off_bid_max_valuation)
    {
        return Err(IicoError::InvariantViolation("CutOffCapRespected"));
    }

    // VirtualDominatesValuation (bonus >= 0 means weight >= 2)
    if state.virtual_valuation + tolerance(state.virtual_valuation) < 2.0 * state.valuation {
        return Err(IicoError::InvariantViolation("VirtualDominatesValuation"));
    }

    Ok(())
}
