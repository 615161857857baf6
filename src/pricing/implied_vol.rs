//! Implied volatility solver.
//!
//! Newton-Raphson seeded at 20% vol with vega as the derivative, falling
//! back to bisection over [1%, 500%] when vega vanishes or a step leaves the
//! bracket. Both phases are capped, so the solver always terminates.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::black_scholes::{raw_vega, value};
use super::types::{non_negative, OptionContract};
use super::PricingError;

/// Lowest volatility the solver returns.
pub const MIN_VOL: f64 = 0.01;
/// Highest volatility the solver returns.
pub const MAX_VOL: f64 = 5.0;
/// Newton starting point.
pub const SEED_VOL: f64 = 0.20;
/// Convergence threshold on |model price - market price|.
pub const PRICE_TOLERANCE: f64 = 1e-4;
/// Iteration cap applied to each phase.
pub const MAX_ITERATIONS: usize = 100;

const MIN_VEGA: f64 = 1e-8;

/// How the returned volatility was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    /// Contract already expired; volatility is 0.
    Expired,
    /// Market price below intrinsic; floor volatility returned.
    BelowIntrinsic,
    Newton,
    Bisection,
}

/// Solver output with diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvSolution {
    pub volatility: f64,
    pub iterations: usize,
    pub converged: bool,
    pub method: SolverMethod,
}

/// Best candidate seen so far across both phases.
struct Best {
    vol: f64,
    error: f64,
}

impl Best {
    fn offer(&mut self, vol: f64, error: f64) {
        if error < self.error {
            self.vol = vol;
            self.error = error;
        }
    }
}

/// Volatility that reproduces `market_price`.
pub fn implied_volatility(market_price: f64, contract: &OptionContract) -> Result<f64, PricingError> {
    solve_implied_volatility(market_price, contract).map(|s| s.volatility)
}

/// Solve for implied volatility and report how the answer was found.
///
/// The contract's own `volatility` field is ignored.
pub fn solve_implied_volatility(
    market_price: f64,
    contract: &OptionContract,
) -> Result<IvSolution, PricingError> {
    non_negative("market_price", market_price)?;
    let base = contract.with_volatility(SEED_VOL);
    base.validate()?;

    if base.time_to_expiry <= 0.0 {
        return Ok(IvSolution {
            volatility: 0.0,
            iterations: 0,
            converged: true,
            method: SolverMethod::Expired,
        });
    }

    if market_price < base.intrinsic_value() {
        debug!(
            market_price,
            intrinsic = base.intrinsic_value(),
            "Market price below intrinsic, using floor volatility"
        );
        return Ok(IvSolution {
            volatility: MIN_VOL,
            iterations: 0,
            converged: true,
            method: SolverMethod::BelowIntrinsic,
        });
    }

    let mut best = Best {
        vol: SEED_VOL,
        error: f64::INFINITY,
    };

    let mut vol = SEED_VOL;
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let trial = base.with_volatility(vol);
        let diff = value(&trial) - market_price;
        best.offer(vol, diff.abs());

        if diff.abs() < PRICE_TOLERANCE {
            return Ok(IvSolution {
                volatility: vol.clamp(MIN_VOL, MAX_VOL),
                iterations,
                converged: true,
                method: SolverMethod::Newton,
            });
        }

        let vega = raw_vega(&trial);
        if vega < MIN_VEGA {
            debug!(vol, vega, "Vega vanished, switching to bisection");
            break;
        }

        let next = vol - diff / vega;
        if !next.is_finite() || !(MIN_VOL..=MAX_VOL).contains(&next) {
            debug!(vol, next, "Newton step left bracket, switching to bisection");
            break;
        }
        vol = next;
    }

    bisect(&base, market_price, iterations, best)
}

fn bisect(
    base: &OptionContract,
    market_price: f64,
    mut iterations: usize,
    mut best: Best,
) -> Result<IvSolution, PricingError> {
    let mut lo = MIN_VOL;
    let mut hi = MAX_VOL;

    let lo_diff = value(&base.with_volatility(lo)) - market_price;
    let hi_diff = value(&base.with_volatility(hi)) - market_price;
    best.offer(lo, lo_diff.abs());
    best.offer(hi, hi_diff.abs());

    // Price is increasing in vol, so an unbracketed target pins to an edge.
    if lo_diff >= 0.0 || hi_diff <= 0.0 {
        let edge = if lo_diff >= 0.0 { lo } else { hi };
        let error = if lo_diff >= 0.0 { lo_diff.abs() } else { hi_diff.abs() };
        return Ok(finish(edge, error, iterations, SolverMethod::Bisection));
    }

    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        let mid = 0.5 * (lo + hi);
        let diff = value(&base.with_volatility(mid)) - market_price;
        best.offer(mid, diff.abs());

        if diff.abs() < PRICE_TOLERANCE {
            return Ok(finish(mid, diff.abs(), iterations, SolverMethod::Bisection));
        }
        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Ok(finish(best.vol, best.error, iterations, SolverMethod::Bisection))
}

fn finish(vol: f64, error: f64, iterations: usize, method: SolverMethod) -> IvSolution {
    let converged = error < PRICE_TOLERANCE;
    if !converged {
        warn!(
            vol,
            error,
            iterations,
            "Implied volatility did not converge, returning best estimate"
        );
    }
    IvSolution {
        volatility: vol.clamp(MIN_VOL, MAX_VOL),
        iterations,
        converged,
        method,
    }
}
