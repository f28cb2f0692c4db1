//! Authoritative bid collection and sale lifecycle.
//!
//! Every mutation builds its candidate bid list and state aside, checks invariants, and
//! commits only on success: a failed call never leaves a partial update behind.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::bonus::bonus_at;
use crate::clearing::{accepted_contribution, clear, refund, token_price, tokens_allocated, SaleState};
use crate::invariants::check_clearing_invariants;
use crate::params::SaleParameters;
use crate::settlement::{ImmediateSettlement, Settlement, SettlementProgress};
use crate::withdrawal::{locked_in_amount, withdrawal, WithdrawalQuote};
use crate::{BidId, ContributorId, IicoError, Result, Timestamp, UNCAPPED_VALUATION};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub contributor: ContributorId,
    /// Current contribution (reduced to the locked-in amount on withdrawal).
    pub contrib: f64,
    /// Personal valuation cap.
    pub max_valuation: f64,
    /// Bonus frozen at creation, reduced by a withdrawal.
    pub bonus: f64,
    pub withdrawn: bool,
    pub redeemed: bool,
}

/// Action a contributor may take on a bid right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    None,
    Withdraw,
    Redeem,
}

/// Capability check from lifecycle rules alone.
pub fn available_action(
    params: &SaleParameters,
    bid: &Bid,
    now: Timestamp,
    state: &SaleState,
) -> Action {
    if bid.redeemed {
        Action::None
    } else if state.finalized {
        Action::Redeem
    } else if !bid.withdrawn && params.accepts_withdrawals_at(now) {
        Action::Withdraw
    } else {
        Action::None
    }
}

/// Result of redeeming a bid against the frozen state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    pub bid_id: BidId,
    pub tokens: f64,
    /// Contribution not accepted by the sale.
    pub refund: f64,
}

/// Per-bid live read model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidView {
    pub bid: Bid,
    pub accepted: f64,
    pub token_price: f64,
    pub tokens: f64,
    /// Contribution that would stay locked if withdrawn at the evaluation time.
    pub locked_in: f64,
    pub action: Action,
}

/// Plain immutable copy of everything the ledger holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub params: SaleParameters,
    pub bids: Vec<Bid>,
    pub state: SaleState,
}

#[derive(Clone, Debug)]
pub struct Ledger {
    params: SaleParameters,
    bids: Vec<Bid>,
    state: SaleState,
}

fn recompute(bids: &[Bid]) -> Result<SaleState> {
    let state = clear(bids)?;
    check_clearing_invariants(bids, &state)?;
    Ok(state)
}

fn log_rejection(operation: &'static str) -> impl Fn(&IicoError) {
    move |err| warn!(operation, error = %err, "operation rejected")
}

impl Ledger {
    pub fn new(params: SaleParameters) -> Ledger {
        Ledger {
            params,
            bids: Vec::new(),
            state: SaleState::default(),
        }
    }

    /// Rebuilds a ledger from a snapshot, re-deriving (and checking) its state.
    ///
    /// Bid ids must be `0..n` in order. A non-finalized snapshot is re-cleared; a finalized
    /// one keeps its frozen state after an invariant check.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Ledger> {
        for (index, bid) in snapshot.bids.iter().enumerate() {
            if bid.id != BidId(index as u64) {
                return Err(IicoError::ConfigError(format!(
                    "snapshot bid at position {index} has id {}",
                    bid.id
                )));
            }
        }
        let state = if snapshot.state.finalized {
            check_clearing_invariants(&snapshot.bids, &snapshot.state)?;
            snapshot.state
        } else {
            if snapshot.bids.iter().any(|b| b.redeemed) {
                return Err(IicoError::InvariantViolation("RedeemedOnlyAfterFinalize"));
            }
            recompute(&snapshot.bids)?
        };
        Ok(Ledger {
            params: snapshot.params,
            bids: snapshot.bids,
            state,
        })
    }

    pub fn params(&self) -> &SaleParameters {
        &self.params
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn state(&self) -> &SaleState {
        &self.state
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            params: self.params.clone(),
            bids: self.bids.clone(),
            state: self.state.clone(),
        }
    }

    pub fn bid(&self, id: BidId) -> Result<&Bid> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.bids.get(index))
            .ok_or(IicoError::UnknownBid(id))
    }

    fn index_of(&self, id: BidId) -> Result<usize> {
        self.bid(id)?;
        usize::try_from(id.0).map_err(|_| IicoError::UnknownBid(id))
    }

    /// Bonus a bid submitted at `now` would receive.
    pub fn current_bonus(&self, now: Timestamp) -> f64 {
        bonus_at(&self.params, now)
    }

    /// Submits a capped bid and returns its id.
    #[instrument(skip(self, contributor, now), fields(now_ms = now.millis()))]
    pub fn submit_bid(
        &mut self,
        contributor: impl Into<ContributorId>,
        contrib: f64,
        max_valuation: f64,
        now: Timestamp,
    ) -> Result<BidId> {
        self.try_submit(contributor.into(), contrib, max_valuation, now)
            .inspect_err(log_rejection("submit_bid"))
    }

    /// Submits a bid accepted at any final valuation.
    pub fn submit_uncapped_bid(
        &mut self,
        contributor: impl Into<ContributorId>,
        contrib: f64,
        now: Timestamp,
    ) -> Result<BidId> {
        self.submit_bid(contributor, contrib, UNCAPPED_VALUATION, now)
    }

    fn try_submit(
        &mut self,
        contributor: ContributorId,
        contrib: f64,
        max_valuation: f64,
        now: Timestamp,
    ) -> Result<BidId> {
        if self.state.finalized {
            return Err(IicoError::AlreadyFinalized);
        }
        if !self.params.accepts_bids_at(now) {
            return Err(IicoError::OutOfWindow {
                operation: "bid submission",
                now,
            });
        }
        if !contrib.is_finite() || contrib <= 0.0 {
            return Err(IicoError::InvalidAmount(format!(
                "contribution must be positive, got {contrib}"
            )));
        }
        if !max_valuation.is_finite() || max_valuation < contrib {
            return Err(IicoError::InvalidAmount(format!(
                "max valuation {max_valuation} is below contribution {contrib}"
            )));
        }

        let id = BidId(self.bids.len() as u64);
        let mut bids = self.bids.clone();
        bids.push(Bid {
            id,
            contributor,
            contrib,
            max_valuation,
            bonus: bonus_at(&self.params, now),
            withdrawn: false,
            redeemed: false,
        });
        let state = recompute(&bids)?;
        self.bids = bids;
        self.state = state;
        Ok(id)
    }

    /// Quotes a withdrawal without applying it.
    pub fn withdrawal_preview(&self, id: BidId, now: Timestamp) -> Result<WithdrawalQuote> {
        let bid = self.bid(id)?;
        if bid.redeemed {
            return Err(IicoError::AlreadyRedeemed(id));
        }
        if bid.withdrawn {
            return Err(IicoError::AlreadyWithdrawn(id));
        }
        if self.state.finalized {
            return Err(IicoError::AlreadyFinalized);
        }
        withdrawal(&self.params, bid, now)
    }

    /// Applies a partial withdrawal: the bid keeps only its locked-in contribution and
    /// forfeits part of its bonus.
    #[instrument(skip(self, id, now), fields(bid = id.0, now_ms = now.millis()))]
    pub fn withdraw_bid(&mut self, id: BidId, now: Timestamp) -> Result<WithdrawalQuote> {
        self.try_withdraw(id, now)
            .inspect_err(log_rejection("withdraw_bid"))
    }

    fn try_withdraw(&mut self, id: BidId, now: Timestamp) -> Result<WithdrawalQuote> {
        let quote = self.withdrawal_preview(id, now)?;
        let index = self.index_of(id)?;
        let mut bids = self.bids.clone();
        let bid = &mut bids[index];
        bid.contrib = quote.locked_in;
        bid.bonus = quote.new_bonus;
        bid.withdrawn = true;
        let state = recompute(&bids)?;
        self.bids = bids;
        self.state = state;
        Ok(quote)
    }

    /// Runs (one call of) settlement and freezes the state once it completes.
    ///
    /// `Partial` progress leaves the sale unfinalized; call again to continue.
    #[instrument(skip(self, settlement, now), fields(now_ms = now.millis()))]
    pub fn finalize(
        &mut self,
        now: Timestamp,
        max_iterations: u64,
        settlement: &mut dyn Settlement,
    ) -> Result<SettlementProgress> {
        self.try_finalize(now, max_iterations, settlement)
            .inspect_err(log_rejection("finalize"))
    }

    /// Finalizes in a single call.
    pub fn finalize_now(&mut self, now: Timestamp) -> Result<SettlementProgress> {
        self.finalize(now, u64::MAX, &mut ImmediateSettlement)
    }

    fn try_finalize(
        &mut self,
        now: Timestamp,
        max_iterations: u64,
        settlement: &mut dyn Settlement,
    ) -> Result<SettlementProgress> {
        if self.state.finalized {
            return Err(IicoError::AlreadyFinalized);
        }
        if !self.params.has_ended_at(now) {
            return Err(IicoError::OutOfWindow {
                operation: "finalization",
                now,
            });
        }
        if max_iterations == 0 {
            return Err(IicoError::InvalidAmount("max_iterations must be > 0".into()));
        }
        let progress = settlement.settle(&self.state, &self.bids, max_iterations)?;
        if let SettlementProgress::Complete { .. } = progress {
            self.state.finalized = true;
            info!(
                valuation = self.state.valuation,
                virtual_valuation = self.state.virtual_valuation,
                bids = self.bids.len(),
                "sale finalized"
            );
        }
        Ok(progress)
    }

    /// Marks a bid redeemed and returns its token allocation against the frozen state.
    #[instrument(skip(self, id), fields(bid = id.0))]
    pub fn redeem_bid(&mut self, id: BidId) -> Result<Redemption> {
        self.try_redeem(id).inspect_err(log_rejection("redeem_bid"))
    }

    fn try_redeem(&mut self, id: BidId) -> Result<Redemption> {
        if !self.state.finalized {
            return Err(IicoError::NotFinalized);
        }
        let index = self.index_of(id)?;
        let bid = &self.bids[index];
        if bid.redeemed {
            return Err(IicoError::AlreadyRedeemed(id));
        }
        let redemption = Redemption {
            bid_id: id,
            tokens: tokens_allocated(&self.params, &self.state, bid)?,
            refund: refund(&self.state, bid),
        };
        self.bids[index].redeemed = true;
        Ok(redemption)
    }

    pub fn available_action(&self, id: BidId, now: Timestamp) -> Result<Action> {
        let bid = self.bid(id)?;
        Ok(available_action(&self.params, bid, now, &self.state))
    }

    pub fn bid_view(&self, id: BidId, now: Timestamp) -> Result<BidView> {
        let bid = self.bid(id)?;
        self.view_of(bid, now)
    }

    /// Views of every bid, newest first.
    pub fn bid_views(&self, now: Timestamp) -> Result<Vec<BidView>> {
        self.bids.iter().rev().map(|b| self.view_of(b, now)).collect()
    }

    fn view_of(&self, bid: &Bid, now: Timestamp) -> Result<BidView> {
        Ok(BidView {
            bid: bid.clone(),
            accepted: accepted_contribution(&self.state, bid),
            token_price: token_price(&self.params, &self.state, bid)?,
            tokens: tokens_allocated(&self.params, &self.state, bid)?,
            locked_in: locked_in_amount(&self.params, bid, now),
            action: available_action(&self.params, bid, now, &self.state),
        })
    }
}
