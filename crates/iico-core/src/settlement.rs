//! Settlement collaborator invoked by `Ledger::finalize`.
//!
//! The on-chain sale finalizes in bounded batches (`max_iterations` bids per call). The
//! engine treats that process as opaque: it only needs to know whether a call completed,
//! made partial progress, or failed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clearing::SaleState;
use crate::ledger::Bid;
use crate::{IicoError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementProgress {
    /// All bids settled; the sale may be marked finalized.
    Complete { processed: usize },
    /// Some bids settled; call again to continue.
    Partial { processed: usize, remaining: usize },
}

/// Batched settlement process.
pub trait Settlement {
    /// Preconditions:
    /// - `max_iterations > 0` (checked by the ledger).
    /// - `state` is the last computed clearing for `bids`.
    ///
    /// Postconditions:
    /// - Returns `Complete` only once every bid has been processed.
    /// - On `Err`, the ledger leaves the sale unfinalized.
    fn settle(
        &mut self,
        state: &SaleState,
        bids: &[Bid],
        max_iterations: u64,
    ) -> Result<SettlementProgress>;
}

/// Settles everything in one call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateSettlement;

impl Settlement for ImmediateSettlement {
    fn settle(
        &mut self,
        _state: &SaleState,
        bids: &[Bid],
        _max_iterations: u64,
    ) -> Result<SettlementProgress> {
        Ok(SettlementProgress::Complete {
            processed: bids.len(),
        })
    }
}

/// Walks the bid list at most `max_iterations` bids per call.
#[derive(Clone, Debug, Default)]
pub struct BatchedSettlement {
    cursor: usize,
}

impl BatchedSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bids processed so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Settlement for BatchedSettlement {
    fn settle(
        &mut self,
        _state: &SaleState,
        bids: &[Bid],
        max_iterations: u64,
    ) -> Result<SettlementProgress> {
        if self.cursor > bids.len() {
            return Err(IicoError::SettlementFailed(format!(
                "cursor {} past end of {} bids",
                self.cursor,
                bids.len()
            )));
        }
        let budget = usize::try_from(max_iterations).unwrap_or(usize::MAX);
        let batch = (bids.len() - self.cursor).min(budget);
        self.cursor += batch;
        let remaining = bids.len() - self.cursor;
        debug!(batch, remaining, "settlement batch");
        if remaining == 0 {
            Ok(SettlementProgress::Complete { processed: batch })
        } else {
            Ok(SettlementProgress::Partial {
                processed: batch,
                remaining,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BidId, ContributorId};

    fn bids(n: u64) -> Vec<Bid> {
        (0..n)
            .map(|i| Bid {
                id: BidId(i),
                contributor: ContributorId::from("x"),
                contrib: 1.0,
                max_valuation: 10.0,
                bonus: 0.0,
                withdrawn: false,
                redeemed: false,
            })
            .collect()
    }

    #[test]
    fn batched_settlement_reports_progress() {
        let bids = bids(5);
        let state = SaleState::default();
        let mut s = BatchedSettlement::new();
        assert_eq!(
            s.settle(&state, &bids, 2).unwrap(),
            SettlementProgress::Partial { processed: 2, remaining: 3 }
        );
        assert_eq!(
            s.settle(&state, &bids, 2).unwrap(),
            SettlementProgress::Partial { processed: 2, remaining: 1 }
        );
        assert_eq!(
            s.settle(&state, &bids, 2).unwrap(),
            SettlementProgress::Complete { processed: 1 }
        );
        assert_eq!(s.cursor(), 5);
    }

    #[test]
    fn empty_bid_set_completes_immediately() {
        let mut s = BatchedSettlement::new();
        assert_eq!(
            s.settle(&SaleState::default(), &[], 1).unwrap(),
            SettlementProgress::Complete { processed: 0 }
        );
    }

    #[test]
    fn shrinking_bid_list_is_an_error() {
        let mut s = BatchedSettlement::new();
        s.settle(&SaleState::default(), &bids(3), 3).unwrap();
        assert!(s.settle(&SaleState::default(), &bids(1), 3).is_err());
    }
}
