//! Interactive ICO clearing engine.
//!
//! Pure, IO-free core for a capped, bonus-decaying sealed-bid token sale:
//! - `bonus`: time-decaying bonus multiplier
//! - `withdrawal`: lock-in and withdrawal penalty
//! - `clearing`: ordered cut-off, valuations and token price
//! - `ledger`: authoritative bid collection and lifecycle operations
//! - `simulator`: synthetic-clock rehearsal over the same math
//!
//! The caller supplies `now` on every call; nothing here reads a wall clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod bonus;
pub mod clearing;
pub mod config;
pub mod invariants;
pub mod ledger;
pub mod params;
pub mod settlement;
pub mod simulator;
pub mod withdrawal;

pub use clearing::{clear, SaleState};
pub use config::IicoConfig;
pub use ledger::{Action, Bid, BidView, Ledger, LedgerSnapshot, Redemption};
pub use params::SaleParameters;
pub use settlement::{BatchedSettlement, ImmediateSettlement, Settlement, SettlementProgress};
pub use simulator::{
    tutorial_script, ScriptStep, SimulationReport, Simulator, StepOutcome, StepRecord,
    SyntheticClock,
};
pub use withdrawal::WithdrawalQuote;

/// Millisecond epoch timestamp.
///
/// All time arithmetic uses this one unit so live and simulated runs agree exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn millis(self) -> i64 {
        self.0
    }

    /// Saturating offset by `ms` milliseconds.
    pub fn offset(self, ms: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Bid identifier, assigned monotonically in submission order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BidId(pub u64);

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque contributor identity (never interpreted by the engine).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContributorId(pub String);

impl From<&str> for ContributorId {
    fn from(value: &str) -> Self {
        ContributorId(value.to_owned())
    }
}

impl From<String> for ContributorId {
    fn from(value: String) -> Self {
        ContributorId(value)
    }
}

/// Unified error type for clearing engine operations.
#[derive(Debug, Error)]
pub enum IicoError {
    // Lifecycle errors
    #[error("{operation} not allowed at {now}")]
    OutOfWindow { operation: &'static str, now: Timestamp },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown bid {0}")]
    UnknownBid(BidId),

    #[error("Bid {0} already withdrawn")]
    AlreadyWithdrawn(BidId),

    #[error("Bid {0} already redeemed")]
    AlreadyRedeemed(BidId),

    #[error("Sale not finalized")]
    NotFinalized,

    #[error("Sale already finalized")]
    AlreadyFinalized,

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Collaborator errors
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(&'static str),

    // Simulation errors
    #[error("Script step {index} failed: {source}")]
    ScriptStep {
        index: usize,
        #[source]
        source: Box<IicoError>,
    },
}

pub type Result<T> = std::result::Result<T, IicoError>;

/// Cap used for "simple" bids that accept any final valuation.
pub const UNCAPPED_VALUATION: f64 = f64::MAX;

pub(crate) fn require_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IicoError::InvalidAmount(format!("{what} is not finite")))
    }
}
