//! Configuration for the clearing engine.
//!
//! # Configuration Sources
//!
//! - Environment variables (prefixed with `IICO_`)
//! - JSON documents (`IicoConfig::from_json_str`)
//! - Programmatic defaults and the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use iico_core::config::IicoConfig;
//!
//! let config = IicoConfig::builder()
//!     .sale_window(0, 3_600_000, 7_200_000, 10_800_000)
//!     .starting_bonus(0.2)
//!     .tokens_for_sale(1e9)
//!     .build()?;
//! let ledger = iico_core::Ledger::new(config.sale.to_params()?);
//! ```

use crate::params::SaleParameters;
use crate::{IicoError, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IicoConfig {
    /// Sale schedule and supply.
    pub sale: SaleConfig,

    /// Rehearsal (tutorial) settings.
    pub simulation: SimulationConfig,

    /// Finalization batching.
    pub settlement: SettlementConfig,
}

impl IicoConfig {
    /// Create a new configuration builder.
    pub fn builder() -> IicoConfigBuilder {
        IicoConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `IICO_`:
    /// - `IICO_START_TIME_MS`, `IICO_END_FULL_BONUS_TIME_MS`, `IICO_WITHDRAWAL_LOCK_TIME_MS`,
    ///   `IICO_END_TIME_MS` - sale schedule (millisecond epoch)
    /// - `IICO_STARTING_BONUS` - starting bonus fraction (0.2 = 20%)
    /// - `IICO_TOKENS_FOR_SALE` - token supply
    /// - `IICO_SIMULATION_TOKENS_FOR_SALE` - token supply used in rehearsals
    /// - `IICO_FINALIZE_MAX_ITERATIONS` - bids settled per finalize call
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.parse()
                .map_err(|e| IicoError::ConfigError(format!("Invalid {key}: {e}")))
        }

        if let Some(v) = lookup("IICO_START_TIME_MS") {
            config.sale.start_time_ms = parse("IICO_START_TIME_MS", v)?;
        }
        if let Some(v) = lookup("IICO_END_FULL_BONUS_TIME_MS") {
            config.sale.end_full_bonus_time_ms = parse("IICO_END_FULL_BONUS_TIME_MS", v)?;
        }
        if let Some(v) = lookup("IICO_WITHDRAWAL_LOCK_TIME_MS") {
            config.sale.withdrawal_lock_time_ms = parse("IICO_WITHDRAWAL_LOCK_TIME_MS", v)?;
        }
        if let Some(v) = lookup("IICO_END_TIME_MS") {
            config.sale.end_time_ms = parse("IICO_END_TIME_MS", v)?;
        }
        if let Some(v) = lookup("IICO_STARTING_BONUS") {
            config.sale.starting_bonus = parse("IICO_STARTING_BONUS", v)?;
        }
        if let Some(v) = lookup("IICO_TOKENS_FOR_SALE") {
            config.sale.tokens_for_sale = parse("IICO_TOKENS_FOR_SALE", v)?;
        }
        if let Some(v) = lookup("IICO_SIMULATION_TOKENS_FOR_SALE") {
            config.simulation.tokens_for_sale = Some(parse("IICO_SIMULATION_TOKENS_FOR_SALE", v)?);
        }
        if let Some(v) = lookup("IICO_FINALIZE_MAX_ITERATIONS") {
            config.settlement.max_iterations = parse("IICO_FINALIZE_MAX_ITERATIONS", v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IicoConfig = serde_json::from_str(json)
            .map_err(|e| IicoError::ConfigError(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.sale.to_params()?;

        if let Some(tokens) = self.simulation.tokens_for_sale {
            if !tokens.is_finite() || tokens <= 0.0 {
                return Err(IicoError::ConfigError(
                    "simulation.tokens_for_sale must be finite and > 0".into(),
                ));
            }
        }

        if self.simulation.lead_in_ms < 0 {
            return Err(IicoError::ConfigError(
                "simulation.lead_in_ms must be >= 0".into(),
            ));
        }

        if self.settlement.max_iterations == 0 {
            return Err(IicoError::ConfigError(
                "settlement.max_iterations must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Sale schedule and supply, in raw (unvalidated) form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleConfig {
    pub start_time_ms: i64,
    pub end_full_bonus_time_ms: i64,
    pub withdrawal_lock_time_ms: i64,
    pub end_time_ms: i64,
    /// Starting bonus fraction (0.2 = 20%).
    pub starting_bonus: f64,
    pub tokens_for_sale: f64,
}

impl SaleConfig {
    pub fn to_params(&self) -> Result<SaleParameters> {
        SaleParameters::new(
            Timestamp(self.start_time_ms),
            Timestamp(self.end_full_bonus_time_ms),
            Timestamp(self.withdrawal_lock_time_ms),
            Timestamp(self.end_time_ms),
            self.starting_bonus,
            self.tokens_for_sale,
        )
    }
}

impl Default for SaleConfig {
    fn default() -> Self {
        // One-day sale: 8h full bonus, lock-in over the next 8h, 8h decay-only tail.
        Self {
            start_time_ms: 0,
            end_full_bonus_time_ms: 8 * 3_600_000,
            withdrawal_lock_time_ms: 16 * 3_600_000,
            end_time_ms: 24 * 3_600_000,
            starting_bonus: 0.2,
            tokens_for_sale: 1e9,
        }
    }
}

/// Rehearsal settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Token supply used instead of the live one; `None` keeps the live supply.
    pub tokens_for_sale: Option<f64>,

    /// How long before `start_time` the synthetic clock starts.
    pub lead_in_ms: i64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tokens_for_sale: Some(0.16e9),
            lead_in_ms: 1_000,
        }
    }
}

/// Finalization batching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Bids settled per `finalize` call.
    pub max_iterations: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_iterations: 256,
        }
    }
}

/// Builder for IicoConfig.
#[derive(Default)]
pub struct IicoConfigBuilder {
    config: IicoConfig,
}

impl IicoConfigBuilder {
    /// Set the four sale instants (millisecond epoch).
    pub fn sale_window(
        mut self,
        start_ms: i64,
        end_full_bonus_ms: i64,
        withdrawal_lock_ms: i64,
        end_ms: i64,
    ) -> Self {
        self.config.sale.start_time_ms = start_ms;
        self.config.sale.end_full_bonus_time_ms = end_full_bonus_ms;
        self.config.sale.withdrawal_lock_time_ms = withdrawal_lock_ms;
        self.config.sale.end_time_ms = end_ms;
        self
    }

    /// Set the starting bonus fraction.
    pub fn starting_bonus(mut self, bonus: f64) -> Self {
        self.config.sale.starting_bonus = bonus;
        self
    }

    /// Set the live token supply.
    pub fn tokens_for_sale(mut self, tokens: f64) -> Self {
        self.config.sale.tokens_for_sale = tokens;
        self
    }

    /// Set (or clear) the rehearsal token supply override.
    pub fn simulation_tokens_for_sale(mut self, tokens: Option<f64>) -> Self {
        self.config.simulation.tokens_for_sale = tokens;
        self
    }

    /// Set the rehearsal clock lead-in.
    pub fn lead_in_ms(mut self, ms: i64) -> Self {
        self.config.simulation.lead_in_ms = ms;
        self
    }

    /// Set bids settled per finalize call.
    pub fn max_iterations(mut self, max: u64) -> Self {
        self.config.settlement.max_iterations = max;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<IicoConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
