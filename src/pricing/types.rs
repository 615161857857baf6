//! Core pricing types.
//!
//! An `OptionContract` carries every input the closed-form model needs, so
//! pricing calls are pure functions of a single value.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PricingError;

/// Calendar days per year used to convert DTE into model time.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Ok(Self::Call),
            "P" | "PUT" => Ok(Self::Put),
            other => Err(format!("unknown option type '{}'", other)),
        }
    }
}

/// Inputs for a single European option valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Underlying price.
    pub spot: f64,
    /// Strike price.
    pub strike: f64,
    /// Continuously compounded risk-free rate.
    pub rate: f64,
    /// Continuous dividend / carry yield.
    pub dividend_yield: f64,
    /// Annualized volatility (0.20 = 20%).
    pub volatility: f64,
    /// Time to expiry in years.
    pub time_to_expiry: f64,
    pub option_type: OptionType,
}

impl OptionContract {
    /// Create a contract with zero rate and zero carry.
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Self {
        Self {
            spot,
            strike,
            rate: 0.0,
            dividend_yield: 0.0,
            volatility,
            time_to_expiry,
            option_type,
        }
    }

    /// Set the risk-free rate and dividend yield.
    pub fn with_rates(mut self, rate: f64, dividend_yield: f64) -> Self {
        self.rate = rate;
        self.dividend_yield = dividend_yield;
        self
    }

    /// Same contract at a different volatility.
    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// Same contract with the other right.
    pub fn with_type(mut self, option_type: OptionType) -> Self {
        self.option_type = option_type;
        self
    }

    /// Convert days to expiry into model time.
    pub fn years_from_dte(dte: f64) -> f64 {
        (dte / DAYS_PER_YEAR).max(0.0)
    }

    /// Undiscounted exercise value.
    pub fn intrinsic_value(&self) -> f64 {
        match self.option_type {
            OptionType::Call => (self.spot - self.strike).max(0.0),
            OptionType::Put => (self.strike - self.spot).max(0.0),
        }
    }

    /// Expired or zero-vol contracts are valued at intrinsic with flat Greeks.
    pub fn is_degenerate(&self) -> bool {
        self.time_to_expiry <= 0.0 || self.volatility <= 0.0
    }

    /// Check model preconditions, naming the offending field.
    pub fn validate(&self) -> Result<(), PricingError> {
        positive("spot", self.spot)?;
        positive("strike", self.strike)?;
        non_negative("time_to_expiry", self.time_to_expiry)?;
        non_negative("volatility", self.volatility)?;
        finite("rate", self.rate)?;
        finite("dividend_yield", self.dividend_yield)?;
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), PricingError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PricingError::InvalidInput {
            field,
            value,
            reason: "must be finite",
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), PricingError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(PricingError::InvalidInput {
            field,
            value,
            reason: "must be positive",
        })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), PricingError> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(PricingError::InvalidInput {
            field,
            value,
            reason: "must not be negative",
        })
    }
}

/// Fair value, Greeks and the intermediate d1/d2 of one valuation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Daily theta (per calendar day).
    pub theta: f64,
    /// Vega per 1 vol point.
    pub vega: f64,
    /// Rho per 1 rate point.
    pub rho: f64,
    pub d1: f64,
    pub d2: f64,
}
