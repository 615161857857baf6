//! Position-level value and Greeks.
//!
//! Aggregates per-leg valuations the same way exposures are reported for a
//! book of listed options:
//! - Value: sum(price * quantity * multiplier)
//! - Delta/Gamma/Theta/Vega: sum(greek * quantity * multiplier)

use serde::{Deserialize, Serialize};

use super::black_scholes::price;
use super::types::OptionContract;
use super::PricingError;

/// Standard equity option contract multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 100.0;

/// One leg of a multi-leg position. Negative quantity is short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub contract: OptionContract,
    pub quantity: i32,
    pub multiplier: f64,
}

impl OptionLeg {
    pub fn new(contract: OptionContract, quantity: i32) -> Self {
        Self {
            contract,
            quantity,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

/// Aggregated value and Greeks of a set of legs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionGreeks {
    /// Net mark value (negative for a net credit position).
    pub value: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub leg_count: usize,
}

impl PositionGreeks {
    /// Price every leg and sum the scaled results.
    pub fn from_legs(legs: &[OptionLeg]) -> Result<Self, PricingError> {
        let mut greeks = Self::default();

        for leg in legs {
            let result = price(&leg.contract)?;
            let scale = leg.quantity as f64 * leg.multiplier;

            greeks.value += result.price * scale;
            greeks.delta += result.delta * scale;
            greeks.gamma += result.gamma * scale;
            greeks.theta += result.theta * scale;
            greeks.vega += result.vega * scale;
            greeks.leg_count += 1;
        }

        Ok(greeks)
    }
}
