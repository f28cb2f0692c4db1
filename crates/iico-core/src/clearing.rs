use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::ledger::Bid;
use crate::params::SaleParameters;
use crate::{require_finite, BidId, IicoError, Result};

/// Sale-wide aggregates derived from the bid set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleState {
    /// Sum of accepted contributions (cut-off bid counts only its accepted part).
    pub valuation: f64,
    /// Sum of `accepted + accepted * (1 + bonus)`; drives the token price.
    pub virtual_valuation: f64,
    /// Bid at the acceptance boundary; `None` while there are no bids.
    pub cut_off_bid_id: Option<BidId>,
    pub cut_off_bid_max_valuation: f64,
    /// Accepted (possibly partial) contribution of the cut-off bid.
    pub cut_off_bid_contrib: f64,
    /// Set once by `Ledger::finalize`; the state is frozen afterwards.
    pub finalized: bool,
}

/// How much of a bid the current clearing accepts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Acceptance {
    Full,
    /// Cut-off bid with `0 <= accepted < contrib`.
    Partial { accepted: f64 },
    Rejected,
}

/// Clearing order: `max_valuation` descending, then `id` descending.
///
/// Later bids win ties at equal caps.
pub fn clearing_cmp(a: &Bid, b: &Bid) -> Ordering {
    b.max_valuation
        .total_cmp(&a.max_valuation)
        .then_with(|| b.id.cmp(&a.id))
}

/// Bids sorted into clearing order.
pub fn clearing_order(bids: &[Bid]) -> Vec<&Bid> {
    let mut sorted: Vec<&Bid> = bids.iter().collect();
    sorted.sort_by(|a, b| clearing_cmp(a, b));
    sorted
}

/// Weight of an accepted contribution in the virtual valuation.
fn virtual_weight(accepted: f64, bonus: f64) -> f64 {
    accepted + accepted * (1.0 + bonus)
}

/// Computes the cut-off and valuations for `bids`.
///
/// Algorithm: walk the bids in clearing order. A bid is fully accepted while
/// `contrib + valuation < max_valuation`. The first bid failing that test is the cut-off;
/// it contributes `max(max_valuation - valuation, 0)` and every later bid is rejected. If no
/// bid fails, the last bid in order is the cut-off with its whole contribution.
///
/// The returned state is never `finalized`; finalization is a ledger transition.
pub fn clear(bids: &[Bid]) -> Result<SaleState> {
    for bid in bids {
        require_finite(bid.contrib, "bid contrib")?;
        require_finite(bid.bonus, "bid bonus")?;
        if bid.max_valuation.is_nan() {
            return Err(IicoError::InvalidAmount(format!(
                "bid {} max_valuation is NaN",
                bid.id
            )));
        }
        if bid.contrib < 0.0 {
            return Err(IicoError::InvalidAmount(format!(
                "bid {} contrib is negative",
                bid.id
            )));
        }
    }

    let mut state = SaleState::default();
    for bid in clearing_order(bids) {
        state.cut_off_bid_id = Some(bid.id);
        state.cut_off_bid_max_valuation = bid.max_valuation;
        if bid.contrib + state.valuation < bid.max_valuation {
            state.cut_off_bid_contrib = bid.contrib;
            state.valuation += bid.contrib;
            state.virtual_valuation += virtual_weight(bid.contrib, bid.bonus);
        } else {
            let accepted = if bid.max_valuation >= state.valuation {
                bid.max_valuation - state.valuation
            } else {
                0.0
            };
            state.cut_off_bid_contrib = accepted;
            state.valuation += accepted;
            state.virtual_valuation += virtual_weight(accepted, bid.bonus);
            break;
        }
    }

    require_finite(state.valuation, "valuation")?;
    require_finite(state.virtual_valuation, "virtual valuation")?;

    debug!(
        bids = bids.len(),
        valuation = state.valuation,
        virtual_valuation = state.virtual_valuation,
        cut_off = ?state.cut_off_bid_id,
        "cleared bid set"
    );
    Ok(state)
}

/// Whether `bid` sits strictly before the cut-off in clearing order.
fn precedes_cut_off(state: &SaleState, bid: &Bid) -> bool {
    match state.cut_off_bid_id {
        None => false,
        Some(cut_off_id) => match state.cut_off_bid_max_valuation.total_cmp(&bid.max_valuation) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => bid.id > cut_off_id,
        },
    }
}

pub fn acceptance(state: &SaleState, bid: &Bid) -> Acceptance {
    if state.cut_off_bid_id == Some(bid.id) {
        if state.cut_off_bid_contrib >= bid.contrib {
            Acceptance::Full
        } else {
            Acceptance::Partial {
                accepted: state.cut_off_bid_contrib,
            }
        }
    } else if precedes_cut_off(state, bid) {
        Acceptance::Full
    } else {
        Acceptance::Rejected
    }
}

pub fn accepted_contribution(state: &SaleState, bid: &Bid) -> f64 {
    match acceptance(state, bid) {
        Acceptance::Full => bid.contrib,
        Acceptance::Partial { accepted } => accepted,
        Acceptance::Rejected => 0.0,
    }
}

/// Contribution returned at redemption: `contrib - accepted`.
pub fn refund(state: &SaleState, bid: &Bid) -> f64 {
    bid.contrib - accepted_contribution(state, bid)
}

/// `virtual_valuation / (tokens_for_sale * (1 + bonus))`.
pub fn token_price(params: &SaleParameters, state: &SaleState, bid: &Bid) -> Result<f64> {
    let denom = params.tokens_for_sale() * (1.0 + bid.bonus);
    if !(denom.is_finite() && denom > 0.0) {
        return Err(IicoError::InvalidAmount(format!(
            "token price denominator for bid {} is {denom}",
            bid.id
        )));
    }
    require_finite(state.virtual_valuation / denom, "token price")
}

/// `accepted_contribution / token_price`; zero for bids with nothing accepted.
pub fn tokens_allocated(params: &SaleParameters, state: &SaleState, bid: &Bid) -> Result<f64> {
    let accepted = accepted_contribution(state, bid);
    if accepted <= 0.0 {
        return Ok(0.0);
    }
    let price = token_price(params, state, bid)?;
    if price <= 0.0 {
        return Err(IicoError::InvalidAmount(format!(
            "bid {} has accepted contribution but a zero token price",
            bid.id
        )));
    }
    require_finite(accepted / price, "tokens allocated")
}
