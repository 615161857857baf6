//! Black-Scholes-Merton closed-form pricing and Greeks.
//!
//! Conventions:
//! - Theta is per calendar day (annual theta / 365)
//! - Vega and rho are per 1 percentage point move
//! - Expired (T <= 0) or zero-vol contracts are worth their undiscounted
//!   intrinsic value and every Greek, delta included, is exactly 0

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use super::types::{DAYS_PER_YEAR, OptionContract, OptionType, PricingResult};
use super::PricingError;

/// Standard normal CDF.
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Shared intermediate terms of one evaluation.
struct Terms {
    d1: f64,
    d2: f64,
    sqrt_t: f64,
    carry_discount: f64,
    rate_discount: f64,
}

impl Terms {
    fn new(c: &OptionContract) -> Self {
        let sqrt_t = c.time_to_expiry.sqrt();
        let vol_sqrt_t = c.volatility * sqrt_t;
        let d1 = ((c.spot / c.strike).ln()
            + (c.rate - c.dividend_yield + 0.5 * c.volatility * c.volatility) * c.time_to_expiry)
            / vol_sqrt_t;
        Self {
            d1,
            d2: d1 - vol_sqrt_t,
            sqrt_t,
            carry_discount: (-c.dividend_yield * c.time_to_expiry).exp(),
            rate_discount: (-c.rate * c.time_to_expiry).exp(),
        }
    }
}

/// Option value only. Assumes a validated contract.
pub(crate) fn value(c: &OptionContract) -> f64 {
    if c.is_degenerate() {
        return c.intrinsic_value();
    }
    value_with(c, &Terms::new(c))
}

fn value_with(c: &OptionContract, t: &Terms) -> f64 {
    let forward_leg = c.spot * t.carry_discount;
    let strike_leg = c.strike * t.rate_discount;
    let v = match c.option_type {
        OptionType::Call => forward_leg * norm_cdf(t.d1) - strike_leg * norm_cdf(t.d2),
        OptionType::Put => strike_leg * norm_cdf(-t.d2) - forward_leg * norm_cdf(-t.d1),
    };
    v.max(0.0)
}

/// Unscaled vega (dV/dσ), used as the Newton derivative.
pub(crate) fn raw_vega(c: &OptionContract) -> f64 {
    if c.is_degenerate() {
        return 0.0;
    }
    let t = Terms::new(c);
    c.spot * t.carry_discount * norm_pdf(t.d1) * t.sqrt_t
}

/// Full valuation of an already validated contract.
pub(crate) fn evaluate(c: &OptionContract) -> PricingResult {
    if c.is_degenerate() {
        return PricingResult {
            price: c.intrinsic_value(),
            ..PricingResult::default()
        };
    }

    let t = Terms::new(c);
    let pdf_d1 = norm_pdf(t.d1);
    let time = c.time_to_expiry;

    // Delta is the undiscounted N(d1) form; downstream aggregation expects it.
    let delta = match c.option_type {
        OptionType::Call => norm_cdf(t.d1),
        OptionType::Put => norm_cdf(t.d1) - 1.0,
    };

    let gamma = t.carry_discount * pdf_d1 / (c.spot * c.volatility * t.sqrt_t);
    let vega = c.spot * t.carry_discount * pdf_d1 * t.sqrt_t / 100.0;

    let decay = -c.spot * t.carry_discount * pdf_d1 * c.volatility / (2.0 * t.sqrt_t);
    let annual_theta = match c.option_type {
        OptionType::Call => {
            decay + c.dividend_yield * c.spot * t.carry_discount * norm_cdf(t.d1)
                - c.rate * c.strike * t.rate_discount * norm_cdf(t.d2)
        }
        OptionType::Put => {
            decay - c.dividend_yield * c.spot * t.carry_discount * norm_cdf(-t.d1)
                + c.rate * c.strike * t.rate_discount * norm_cdf(-t.d2)
        }
    };

    let rho = match c.option_type {
        OptionType::Call => c.strike * time * t.rate_discount * norm_cdf(t.d2) / 100.0,
        OptionType::Put => -c.strike * time * t.rate_discount * norm_cdf(-t.d2) / 100.0,
    };

    PricingResult {
        price: value_with(c, &t),
        delta,
        gamma,
        theta: annual_theta / DAYS_PER_YEAR,
        vega,
        rho,
        d1: t.d1,
        d2: t.d2,
    }
}

/// Price a contract and compute its Greeks.
pub fn price(contract: &OptionContract) -> Result<PricingResult, PricingError> {
    contract.validate()?;
    Ok(evaluate(contract))
}

/// `N(d1)` for calls, `N(d1) - 1` for puts; 0 when expired or zero-vol.
pub fn delta(contract: &OptionContract) -> Result<f64, PricingError> {
    price(contract).map(|r| r.delta)
}

/// Gamma (same for calls and puts).
pub fn gamma(contract: &OptionContract) -> Result<f64, PricingError> {
    price(contract).map(|r| r.gamma)
}

/// Daily theta.
pub fn theta(contract: &OptionContract) -> Result<f64, PricingError> {
    price(contract).map(|r| r.theta)
}

/// Vega per 1 vol point.
pub fn vega(contract: &OptionContract) -> Result<f64, PricingError> {
    price(contract).map(|r| r.vega)
}

/// Rho per 1 rate point.
pub fn rho(contract: &OptionContract) -> Result<f64, PricingError> {
    price(contract).map(|r| r.rho)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn atm(option_type: OptionType) -> OptionContract {
        OptionContract::new(100.0, 100.0, 1.0, 0.20, option_type).with_rates(0.05, 0.0)
    }

    #[test]
    fn test_norm_cdf_reference_values() {
        assert_relative_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(norm_cdf(1.0), 0.841_344_746_068_543, epsilon = 1e-9);
        assert_relative_eq!(norm_cdf(-1.96), 0.024_997_895_148_220, epsilon = 1e-9);
        assert_relative_eq!(norm_cdf(3.0) + norm_cdf(-3.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_call_price_reference() {
        // Hull: S=100, K=100, r=5%, T=1, vol=20% -> 10.4506
        let result = price(&atm(OptionType::Call)).unwrap();
        assert_relative_eq!(result.price, 10.4506, epsilon = 1e-3);
        assert_relative_eq!(result.d1, 0.35, epsilon = 1e-9);
        assert_relative_eq!(result.d2, 0.15, epsilon = 1e-9);
    }

    #[test]
    fn test_put_price_reference() {
        let result = price(&atm(OptionType::Put)).unwrap();
        assert_relative_eq!(result.price, 5.5735, epsilon = 1e-3);
    }

    #[test]
    fn test_put_call_parity_with_dividend() {
        let call = OptionContract::new(105.0, 95.0, 0.75, 0.3, OptionType::Call).with_rates(0.04, 0.02);
        let put = call.with_type(OptionType::Put);

        let c = price(&call).unwrap().price;
        let p = price(&put).unwrap().price;
        let rhs = 105.0 * (-0.02_f64 * 0.75).exp() - 95.0 * (-0.04_f64 * 0.75).exp();
        assert_relative_eq!(c - p, rhs, epsilon = 1e-8);
    }

    #[test]
    fn test_expired_contract_is_intrinsic() {
        let call = OptionContract::new(105.0, 100.0, 0.0, 0.25, OptionType::Call);
        let result = price(&call).unwrap();
        assert_eq!(result.price, 5.0);
        assert_eq!(result.delta, 0.0);
        assert_eq!(result.gamma, 0.0);
        assert_eq!(result.theta, 0.0);
        assert_eq!(result.vega, 0.0);

        let put = call.with_type(OptionType::Put);
        assert_eq!(price(&put).unwrap().price, 0.0);
    }

    #[test]
    fn test_zero_vol_is_intrinsic() {
        let put = OptionContract::new(90.0, 100.0, 0.5, 0.0, OptionType::Put).with_rates(0.05, 0.0);
        let result = price(&put).unwrap();
        assert_eq!(result.price, 10.0);
        assert_eq!(delta(&put).unwrap(), 0.0);
        assert_eq!(gamma(&put).unwrap(), 0.0);
    }

    #[test]
    fn test_greek_signs() {
        let call = atm(OptionType::Call);
        let put = atm(OptionType::Put);

        assert!(gamma(&call).unwrap() > 0.0);
        assert!(vega(&call).unwrap() > 0.0);
        assert!(theta(&call).unwrap() < 0.0);
        assert!(rho(&call).unwrap() > 0.0);
        assert!(rho(&put).unwrap() < 0.0);

        assert_relative_eq!(gamma(&call).unwrap(), gamma(&put).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(vega(&call).unwrap(), vega(&put).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_vega_scaling_matches_raw() {
        let call = atm(OptionType::Call);
        assert_relative_eq!(vega(&call).unwrap() * 100.0, raw_vega(&call), epsilon = 1e-9);
    }

    #[test]
    fn test_delta_matches_finite_difference() {
        let call = OptionContract::new(100.0, 105.0, 0.25, 0.3, OptionType::Call).with_rates(0.03, 0.0);
        let h = 0.01;
        let up = value(&OptionContract { spot: 100.0 + h, ..call });
        let down = value(&OptionContract { spot: 100.0 - h, ..call });
        assert_relative_eq!(delta(&call).unwrap(), (up - down) / (2.0 * h), epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_strike_rejected() {
        let bad = OptionContract::new(100.0, 0.0, 0.5, 0.2, OptionType::Call);
        assert!(price(&bad).is_err());
    }
}
