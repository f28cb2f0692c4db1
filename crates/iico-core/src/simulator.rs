//! Offline rehearsal: a private `Ledger` driven by a synthetic clock and a script.
//!
//! The simulator owns no math of its own; every step goes through the same `Ledger`
//! operations a live caller would use, so states match a live run bit for bit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clearing::SaleState;
use crate::config::SimulationConfig;
use crate::ledger::{Ledger, LedgerSnapshot, Redemption};
use crate::params::SaleParameters;
use crate::settlement::{BatchedSettlement, SettlementProgress};
use crate::withdrawal::WithdrawalQuote;
use crate::{BidId, ContributorId, IicoError, Result, Timestamp};

/// Monotone millisecond clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyntheticClock {
    now: Timestamp,
}

impl SyntheticClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: start }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn set(&mut self, to: Timestamp) -> Result<()> {
        if to < self.now {
            return Err(IicoError::ConfigError(format!(
                "synthetic clock cannot move backwards from {} to {to}",
                self.now
            )));
        }
        self.now = to;
        Ok(())
    }

    pub fn advance_by(&mut self, ms: i64) -> Result<()> {
        if ms < 0 {
            return Err(IicoError::ConfigError(format!(
                "cannot advance synthetic clock by {ms}ms"
            )));
        }
        self.set(self.now.offset(ms))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    AdvanceTo(Timestamp),
    AdvanceBy(i64),
    Submit {
        contributor: ContributorId,
        contrib: f64,
        max_valuation: f64,
    },
    SubmitUncapped {
        contributor: ContributorId,
        contrib: f64,
    },
    Withdraw {
        id: BidId,
    },
    Finalize {
        max_iterations: u64,
    },
    Redeem {
        id: BidId,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StepOutcome {
    ClockMoved,
    Submitted(BidId),
    Withdrew(WithdrawalQuote),
    Finalize(SettlementProgress),
    Redeemed(Redemption),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    /// Clock after the step.
    pub at: Timestamp,
    pub step: ScriptStep,
    pub outcome: StepOutcome,
    /// Bonus a new bid would receive at `at`.
    pub current_bonus: f64,
    pub state: SaleState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub records: Vec<StepRecord>,
    pub final_snapshot: LedgerSnapshot,
}

impl SimulationReport {
    pub fn final_state(&self) -> &SaleState {
        &self.final_snapshot.state
    }
}

#[derive(Clone, Debug)]
pub struct Simulator {
    clock: SyntheticClock,
    ledger: Ledger,
    settlement: BatchedSettlement,
}

impl Simulator {
    pub fn new(params: SaleParameters, clock_start: Timestamp) -> Self {
        Self {
            clock: SyntheticClock::new(clock_start),
            ledger: Ledger::new(params),
            settlement: BatchedSettlement::new(),
        }
    }

    /// Rehearsal of a live sale: same schedule, an empty bid set, and the configured
    /// supply override. The live ledger is only read.
    pub fn rehearse(live: &Ledger, config: &SimulationConfig) -> Result<Self> {
        let params = match config.tokens_for_sale {
            Some(tokens) => live.params().with_tokens_for_sale(tokens)?,
            None => live.params().clone(),
        };
        let start = params.start_time().offset(-config.lead_in_ms);
        Ok(Self::new(params, start))
    }

    pub fn clock(&self) -> &SyntheticClock {
        &self.clock
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Applies one step at the current synthetic time.
    pub fn step(&mut self, step: &ScriptStep) -> Result<StepOutcome> {
        let now = self.clock.now();
        let outcome = match step {
            ScriptStep::AdvanceTo(to) => {
                self.clock.set(*to)?;
                StepOutcome::ClockMoved
            }
            ScriptStep::AdvanceBy(ms) => {
                self.clock.advance_by(*ms)?;
                StepOutcome::ClockMoved
            }
            ScriptStep::Submit {
                contributor,
                contrib,
                max_valuation,
            } => StepOutcome::Submitted(self.ledger.submit_bid(
                contributor.clone(),
                *contrib,
                *max_valuation,
                now,
            )?),
            ScriptStep::SubmitUncapped {
                contributor,
                contrib,
            } => StepOutcome::Submitted(self.ledger.submit_uncapped_bid(
                contributor.clone(),
                *contrib,
                now,
            )?),
            ScriptStep::Withdraw { id } => {
                StepOutcome::Withdrew(self.ledger.withdraw_bid(*id, now)?)
            }
            ScriptStep::Finalize { max_iterations } => StepOutcome::Finalize(
                self.ledger
                    .finalize(now, *max_iterations, &mut self.settlement)?,
            ),
            ScriptStep::Redeem { id } => StepOutcome::Redeemed(self.ledger.redeem_bid(*id)?),
        };
        Ok(outcome)
    }

    /// Runs a script, recording every step; the first failing step aborts the run.
    pub fn run<'a>(
        &mut self,
        script: impl IntoIterator<Item = &'a ScriptStep>,
    ) -> Result<SimulationReport> {
        let mut records = Vec::new();
        for (index, step) in script.into_iter().enumerate() {
            let outcome = self.step(step).map_err(|source| IicoError::ScriptStep {
                index,
                source: Box::new(source),
            })?;
            let at = self.clock.now();
            debug!(index, at = at.millis(), ?outcome, "simulation step");
            records.push(StepRecord {
                index,
                at,
                step: step.clone(),
                outcome,
                current_bonus: self.ledger.current_bonus(at),
                state: self.ledger.state().clone(),
            });
        }
        Ok(SimulationReport {
            records,
            final_snapshot: self.ledger.snapshot(),
        })
    }
}

/// Guided walkthrough of one bid's life in an empty sale.
///
/// Advance to the start, bid, advance to the middle of the lock-in span, withdraw,
/// advance to the end, finalize, redeem. Assumes the bid is the sale's first (`BidId(0)`).
pub fn tutorial_script(
    params: &SaleParameters,
    contributor: impl Into<ContributorId>,
    contrib: f64,
    max_valuation: f64,
) -> Vec<ScriptStep> {
    let full_end = params.end_full_bonus_time().millis();
    let lock = params.withdrawal_lock_time().millis();
    let mid_lock_in = Timestamp(full_end + (lock - full_end) / 2);
    vec![
        ScriptStep::AdvanceTo(params.start_time()),
        ScriptStep::Submit {
            contributor: contributor.into(),
            contrib,
            max_valuation,
        },
        ScriptStep::AdvanceTo(mid_lock_in),
        ScriptStep::Withdraw { id: BidId(0) },
        ScriptStep::AdvanceTo(params.end_time()),
        ScriptStep::Finalize {
            max_iterations: u64::MAX,
        },
        ScriptStep::Redeem { id: BidId(0) },
    ]
}
