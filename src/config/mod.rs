//! Backtest configuration and validation.
//!
//! A backtest is always a list of legs (length 1 for the single-option
//! case). Raw [`LegSpec`]s come straight from the config file and are
//! validated into [`Leg`]s before the simulation starts; every configuration
//! error is fatal at that point, never mid-run.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market::OptionType;
use crate::schedule::RecurrenceRule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("leg {leg}: {reason}")]
    InvalidLegConfiguration { leg: usize, reason: String },

    #[error("unknown rule preset '{0}'")]
    UnknownRulePreset(String),

    #[error("at least one leg is required")]
    NoLegs,

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

/// A recurrence rule given either as a named preset or spelled out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Preset(String),
    Rule(RecurrenceRule),
}

impl RuleSpec {
    pub fn resolve(&self) -> Result<RecurrenceRule, ConfigError> {
        match self {
            RuleSpec::Rule(rule) => Ok(rule.clone()),
            RuleSpec::Preset(name) => match name.as_str() {
                "weekdays" => Ok(RecurrenceRule::every_weekday()),
                "mon-wed-fri" => Ok(RecurrenceRule::mon_wed_fri()),
                "fridays" => Ok(RecurrenceRule::fridays()),
                "third-friday" => Ok(RecurrenceRule::third_friday_monthly()),
                "third-friday-quarterly" => Ok(RecurrenceRule::third_friday_quarterly()),
                other => Err(ConfigError::UnknownRulePreset(other.to_string())),
            },
        }
    }
}

/// Strike selection policy for one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrikeSelection {
    /// Strike as a ratio of spot.
    Moneyness(f64),
    /// Target absolute option delta.
    DeltaTarget(f64),
}

/// Raw per-leg parameters as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegSpec {
    /// Roll schedule: dates on which a new position is opened.
    pub roll: RuleSpec,
    /// Rule generating the eligible maturity grid.
    pub eligible_maturities: RuleSpec,
    /// 0-indexed offset into the maturity grid from the roll date.
    pub maturity_offset: usize,
    /// Rule generating the unwind date grid.
    pub unwind: RuleSpec,
    /// 0-indexed offset into the unwind grid from the roll date.
    pub holding_period: usize,
    pub option_type: OptionType,
    #[serde(default)]
    pub moneyness: Option<f64>,
    #[serde(default)]
    pub delta_target: Option<f64>,
    /// Signed multiplier applied to notional; negative sells the option.
    pub leverage: f64,
    /// Intraday delta-hedging observation times, possibly empty.
    #[serde(default)]
    pub hedging_times: Vec<NaiveTime>,
}

impl LegSpec {
    /// Validate into a [`Leg`]; `index` is only used in error messages.
    pub fn validate(&self, index: usize) -> Result<Leg, ConfigError> {
        let strike_selection = match (self.moneyness, self.delta_target) {
            (Some(m), None) => StrikeSelection::Moneyness(m),
            (None, Some(d)) => StrikeSelection::DeltaTarget(d),
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidLegConfiguration {
                    leg: index,
                    reason: "moneyness and delta_target are mutually exclusive".to_string(),
                })
            }
            (None, None) => {
                return Err(ConfigError::InvalidLegConfiguration {
                    leg: index,
                    reason: "one of moneyness or delta_target is required".to_string(),
                })
            }
        };

        if !self.leverage.is_finite() {
            return Err(ConfigError::InvalidLegConfiguration {
                leg: index,
                reason: "leverage must be finite".to_string(),
            });
        }

        Ok(Leg {
            roll: self.roll.resolve()?,
            eligible_maturities: self.eligible_maturities.resolve()?,
            maturity_offset: self.maturity_offset,
            unwind: self.unwind.resolve()?,
            holding_period: self.holding_period,
            option_type: self.option_type,
            strike_selection,
            leverage: self.leverage,
            hedging_times: self.hedging_times.clone(),
        })
    }
}

/// A validated option overlay leg. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Leg {
    pub roll: RecurrenceRule,
    pub eligible_maturities: RecurrenceRule,
    pub maturity_offset: usize,
    pub unwind: RecurrenceRule,
    pub holding_period: usize,
    pub option_type: OptionType,
    pub strike_selection: StrikeSelection,
    pub leverage: f64,
    pub hedging_times: Vec<NaiveTime>,
}

/// Which volatility change drives the vega PnL bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VegaAttribution {
    /// Per-position implied-vol change, matched between consecutive stamps.
    #[default]
    ImpliedVolChange,
    /// Portfolio vega times the change in the reference volatility index.
    VolIndexChange,
}

fn default_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default()
}

fn default_vol_index() -> String {
    "VIX".to_string()
}

/// Full backtest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub underlying: String,
    #[serde(default = "default_vol_index")]
    pub vol_index: String,
    pub notional: f64,
    pub legs: Vec<LegSpec>,
    /// Delta-hedge rebalancing fee, in basis points of traded notional.
    #[serde(default)]
    pub hedge_fee_bps: f64,
    #[serde(default = "default_close_time")]
    pub close_time: NaiveTime,
    /// Enable the Greek-bucketed PnL decomposition.
    #[serde(default)]
    pub attribution: bool,
    #[serde(default)]
    pub vega_attribution: VegaAttribution,
}

impl BacktestConfig {
    /// Validate all legs and the date range; fatal before simulation starts.
    pub fn validate(&self) -> Result<Vec<Leg>, ConfigError> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.legs.is_empty() {
            return Err(ConfigError::NoLegs);
        }
        self.legs
            .iter()
            .enumerate()
            .map(|(ix, spec)| spec.validate(ix))
            .collect()
    }

    /// Hedge fee as a decimal rate.
    pub fn hedge_fee_rate(&self) -> f64 {
        self.hedge_fee_bps / 10_000.0
    }
}
