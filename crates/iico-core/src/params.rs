use serde::{Deserialize, Serialize};

use crate::config::SaleConfig;
use crate::{IicoError, Result, Timestamp};

/// Immutable sale parameters (correct-by-construction).
///
/// Invariants (checked once in `new`, relied on everywhere else):
/// - `start_time <= end_full_bonus_time <= withdrawal_lock_time <= end_time`
/// - `start_time < end_time`
/// - `starting_bonus` finite and `>= 0`
/// - `tokens_for_sale` finite and `> 0`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SaleConfig", into = "SaleConfig")]
pub struct SaleParameters {
    start_time: Timestamp,
    end_full_bonus_time: Timestamp,
    withdrawal_lock_time: Timestamp,
    end_time: Timestamp,
    starting_bonus: f64,
    tokens_for_sale: f64,
}

impl SaleParameters {
    pub fn new(
        start_time: Timestamp,
        end_full_bonus_time: Timestamp,
        withdrawal_lock_time: Timestamp,
        end_time: Timestamp,
        starting_bonus: f64,
        tokens_for_sale: f64,
    ) -> Result<SaleParameters> {
        if !(start_time <= end_full_bonus_time
            && end_full_bonus_time <= withdrawal_lock_time
            && withdrawal_lock_time <= end_time)
        {
            return Err(IicoError::ConfigError(format!(
                "sale times must be ordered: start {start_time} <= full bonus end {end_full_bonus_time} \
                 <= withdrawal lock {withdrawal_lock_time} <= end {end_time}"
            )));
        }
        if start_time == end_time {
            return Err(IicoError::ConfigError(
                "submission window is empty (start_time == end_time)".into(),
            ));
        }
        // Every sub-span fits once the whole window does.
        if end_time.millis().checked_sub(start_time.millis()).is_none() {
            return Err(IicoError::ConfigError(format!(
                "sale window from {start_time} to {end_time} overflows i64 milliseconds"
            )));
        }
        if !starting_bonus.is_finite() || starting_bonus < 0.0 {
            return Err(IicoError::ConfigError(format!(
                "starting_bonus must be finite and >= 0, got {starting_bonus}"
            )));
        }
        if !tokens_for_sale.is_finite() || tokens_for_sale <= 0.0 {
            return Err(IicoError::ConfigError(format!(
                "tokens_for_sale must be finite and > 0, got {tokens_for_sale}"
            )));
        }
        Ok(SaleParameters {
            start_time,
            end_full_bonus_time,
            withdrawal_lock_time,
            end_time,
            starting_bonus,
            tokens_for_sale,
        })
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_full_bonus_time(&self) -> Timestamp {
        self.end_full_bonus_time
    }

    pub fn withdrawal_lock_time(&self) -> Timestamp {
        self.withdrawal_lock_time
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn starting_bonus(&self) -> f64 {
        self.starting_bonus
    }

    pub fn tokens_for_sale(&self) -> f64 {
        self.tokens_for_sale
    }

    /// Same schedule with a different token supply (used for rehearsals).
    pub fn with_tokens_for_sale(&self, tokens_for_sale: f64) -> Result<SaleParameters> {
        SaleParameters::new(
            self.start_time,
            self.end_full_bonus_time,
            self.withdrawal_lock_time,
            self.end_time,
            self.starting_bonus,
            tokens_for_sale,
        )
    }

    /// `start_time <= now < end_time`.
    pub fn accepts_bids_at(&self, now: Timestamp) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// `start_time <= now < withdrawal_lock_time`.
    pub fn accepts_withdrawals_at(&self, now: Timestamp) -> bool {
        self.start_time <= now && now < self.withdrawal_lock_time
    }

    pub fn has_ended_at(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }
}

impl TryFrom<SaleConfig> for SaleParameters {
    type Error = IicoError;
    fn try_from(value: SaleConfig) -> std::result::Result<Self, Self::Error> {
        value.to_params()
    }
}

impl From<SaleParameters> for SaleConfig {
    fn from(p: SaleParameters) -> Self {
        SaleConfig {
            start_time_ms: p.start_time.0,
            end_full_bonus_time_ms: p.end_full_bonus_time.0,
            withdrawal_lock_time_ms: p.withdrawal_lock_time.0,
            end_time_ms: p.end_time.0,
            starting_bonus: p.starting_bonus,
            tokens_for_sale: p.tokens_for_sale,
        }
    }
}
