//! Option pricing engine.
//!
//! Provides:
//! - Black-Scholes-Merton price and Greeks with dividend/carry yield
//! - Implied volatility (Newton-Raphson with bisection fallback)
//! - Position-level Greek aggregation
//!
//! Every function is pure and safe to call from any thread.

pub mod black_scholes;
pub mod implied_vol;
pub mod position;
pub mod types;

use thiserror::Error;

pub use black_scholes::{delta, gamma, price, rho, theta, vega};
pub use implied_vol::{implied_volatility, solve_implied_volatility, IvSolution, SolverMethod};
pub use position::{OptionLeg, PositionGreeks};
pub use types::{OptionContract, OptionType, PricingResult};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Invalid {field}: {value} ({reason})")]
    InvalidInput {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}
