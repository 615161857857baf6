//! Reverse-Fibonacci daily loss guardrail.
//!
//! A losing day is checked against an allowance that shrinks with the
//! losing streak open at the start of the day:
//! - No losing streak: $300
//! - After 1 losing day: $200
//! - After 2+ losing days: $100
//!
//! Profitable or flat days are never breaches and close the streak.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notch::TradeOutcome;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardrailError {
    #[error("Guardrail needs at least one allowance")]
    Empty,

    #[error("Allowance {index} must be positive (got {value})")]
    NonPositive { index: usize, value: Decimal },
}

/// Guardrail configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Allowed loss on a losing day, indexed by the losing streak at the
    /// open; the last entry repeats.
    pub allowances: Vec<Decimal>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            allowances: vec![dec!(300), dec!(200), dec!(100)],
        }
    }
}

impl GuardrailConfig {
    pub fn validate(&self) -> Result<(), GuardrailError> {
        if self.allowances.is_empty() {
            return Err(GuardrailError::Empty);
        }
        if let Some((index, value)) = self
            .allowances
            .iter()
            .enumerate()
            .find(|(_, a)| **a <= Decimal::ZERO)
        {
            return Err(GuardrailError::NonPositive {
                index,
                value: *value,
            });
        }
        Ok(())
    }
}

/// A day whose net loss exceeded its allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailBreach {
    pub date: NaiveDate,
    pub net_pnl: Decimal,
    pub loss_streak_at_open: usize,
    pub allowed_loss: Decimal,
}

/// Stateful guardrail for a day-by-day loop.
#[derive(Debug, Clone)]
pub struct ReverseFibonacciGuardrail {
    config: GuardrailConfig,
    loss_streak: usize,
    breaches: Vec<GuardrailBreach>,
}

impl ReverseFibonacciGuardrail {
    pub fn new(config: GuardrailConfig) -> Result<Self, GuardrailError> {
        config.validate()?;
        Ok(Self {
            config,
            loss_streak: 0,
            breaches: Vec::new(),
        })
    }

    /// Allowance for a given losing streak.
    pub fn allowance_for(&self, loss_streak: usize) -> Decimal {
        let idx = loss_streak.min(self.config.allowances.len() - 1);
        self.config.allowances[idx]
    }

    /// Allowed loss for the next trading day.
    pub fn allowed_loss(&self) -> Decimal {
        self.allowance_for(self.loss_streak)
    }

    /// Check an intraday running P&L against today's allowance.
    pub fn would_breach(&self, running_pnl: Decimal) -> bool {
        running_pnl < Decimal::ZERO && -running_pnl > self.allowed_loss()
    }

    /// Record a completed day's net P&L.
    pub fn record_day(&mut self, date: NaiveDate, net_pnl: Decimal) -> Option<GuardrailBreach> {
        if net_pnl >= Decimal::ZERO {
            self.loss_streak = 0;
            return None;
        }

        let allowed = self.allowed_loss();
        let breach = (-net_pnl > allowed).then(|| GuardrailBreach {
            date,
            net_pnl,
            loss_streak_at_open: self.loss_streak,
            allowed_loss: allowed,
        });

        self.loss_streak = (self.loss_streak + 1).min(self.config.allowances.len());
        if let Some(b) = &breach {
            self.breaches.push(b.clone());
        }
        breach
    }

    pub fn loss_streak(&self) -> usize {
        self.loss_streak
    }

    pub fn breaches(&self) -> &[GuardrailBreach] {
        &self.breaches
    }
}

/// Net P&L per date, in date order.
pub fn daily_pnl(outcomes: &[TradeOutcome]) -> Vec<(NaiveDate, Decimal)> {
    let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for outcome in outcomes {
        *days.entry(outcome.date).or_insert(Decimal::ZERO) += outcome.pnl;
    }
    days.into_iter().collect()
}

/// Replay outcomes day by day and report every breach.
pub fn audit(
    config: GuardrailConfig,
    outcomes: &[TradeOutcome],
) -> Result<Vec<GuardrailBreach>, GuardrailError> {
    let mut guardrail = ReverseFibonacciGuardrail::new(config)?;
    for (date, pnl) in daily_pnl(outcomes) {
        guardrail.record_day(date, pnl);
    }
    Ok(guardrail.breaches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_default_allowances() {
        let g = ReverseFibonacciGuardrail::new(GuardrailConfig::default()).unwrap();
        assert_eq!(g.allowance_for(0), dec!(300));
        assert_eq!(g.allowance_for(1), dec!(200));
        assert_eq!(g.allowance_for(2), dec!(100));
        assert_eq!(g.allowance_for(3), dec!(100));
        assert_eq!(g.allowance_for(10), dec!(100));
    }

    #[test]
    fn test_streak_tightens_allowance() {
        let mut g = ReverseFibonacciGuardrail::new(GuardrailConfig::default()).unwrap();
        assert!(g.record_day(date(2), dec!(-250)).is_none());
        assert_eq!(g.allowed_loss(), dec!(200));

        let breach = g.record_day(date(3), dec!(-220)).unwrap();
        assert_eq!(breach.loss_streak_at_open, 1);
        assert_eq!(breach.allowed_loss, dec!(200));
        assert_eq!(g.allowed_loss(), dec!(100));
        assert!(g.would_breach(dec!(-101)));
        assert!(!g.would_breach(dec!(-100)));
    }

    #[test]
    fn test_first_losing_day_checked_at_300() {
        let value = dec!(100_000);
        let breaches = audit(
            GuardrailConfig::default(),
            &[TradeOutcome::new(date(2), dec!(-400), value)],
        )
        .unwrap();
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].loss_streak_at_open, 0);
        assert_eq!(breaches[0].allowed_loss, dec!(300));

        let g = ReverseFibonacciGuardrail::new(GuardrailConfig::default()).unwrap();
        assert!(!g.would_breach(dec!(-300)));
        assert!(g.would_breach(dec!(-300.01)));
    }

    #[test]
    fn test_profitable_day_resets() {
        let mut g = ReverseFibonacciGuardrail::new(GuardrailConfig::default()).unwrap();
        g.record_day(date(2), dec!(-50));
        g.record_day(date(3), dec!(-50));
        g.record_day(date(4), dec!(-50));
        g.record_day(date(5), dec!(-50));
        assert_eq!(g.loss_streak(), 3);

        g.record_day(date(8), dec!(0));
        assert_eq!(g.loss_streak(), 0);
        assert_eq!(g.allowed_loss(), dec!(300));
    }

    #[test]
    fn test_audit_aggregates_by_day() {
        let value = dec!(100_000);
        let outcomes = vec![
            TradeOutcome::new(date(2), dec!(-300), value),
            TradeOutcome::new(date(2), dec!(-250), value),
            TradeOutcome::new(date(3), dec!(-150), value),
            TradeOutcome::new(date(4), dec!(400), value),
            TradeOutcome::new(date(5), dec!(-280), value),
        ];
        let breaches = audit(GuardrailConfig::default(), &outcomes).unwrap();
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].date, date(2));
        assert_eq!(breaches[0].net_pnl, dec!(-550));
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(
            ReverseFibonacciGuardrail::new(GuardrailConfig { allowances: vec![] }).unwrap_err(),
            GuardrailError::Empty
        );
        let config = GuardrailConfig {
            allowances: vec![dec!(500), dec!(0)],
        };
        assert!(matches!(
            config.validate(),
            Err(GuardrailError::NonPositive { index: 1, .. })
        ));
    }
}
