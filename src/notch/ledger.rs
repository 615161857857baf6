//! Per-strategy notch ledger.
//!
//! Holds the current level, streak counters, month/week-to-date
//! accumulators and a bounded outcome history. Only the policy mutates it;
//! everything here is bookkeeping plus rolling statistics.

use std::collections::VecDeque;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scale::{NotchScale, StreakConvention};

/// Closed months kept in the trailing record.
pub const MONTHLY_RETURNS_KEPT: usize = 12;

/// Realized result reported by the harness after a trade or trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub date: NaiveDate,
    pub pnl: Decimal,
    /// Total portfolio value after the outcome.
    pub portfolio_value: Decimal,
}

impl TradeOutcome {
    pub fn new(date: NaiveDate, pnl: Decimal, portfolio_value: Decimal) -> Self {
        Self {
            date,
            pnl,
            portfolio_value,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    /// Loss as a percentage of the resulting portfolio value (0 for gains).
    pub fn day_loss_pct(&self) -> f64 {
        if !self.is_loss() {
            return 0.0;
        }
        if self.portfolio_value <= Decimal::ZERO {
            return 100.0;
        }
        let loss: f64 = (-self.pnl).try_into().unwrap_or(0.0);
        let value: f64 = self.portfolio_value.try_into().unwrap_or(1.0);
        (loss / value * 100.0).max(0.0)
    }
}

/// P&L of one completed calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub pnl: Decimal,
    pub start_value: Decimal,
}

impl MonthlyReturn {
    pub fn return_pct(&self) -> f64 {
        pct_of(self.pnl, self.start_value)
    }
}

fn pct_of(part: Decimal, whole: Decimal) -> f64 {
    if whole <= Decimal::ZERO {
        return 0.0;
    }
    let part: f64 = part.try_into().unwrap_or(0.0);
    let whole: f64 = whole.try_into().unwrap_or(1.0);
    part / whole * 100.0
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

fn same_iso_week(a: NaiveDate, b: NaiveDate) -> bool {
    a.iso_week() == b.iso_week()
}

/// Mutable risk-ladder state for one running strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotchLedger {
    pub(crate) strategy: String,
    pub(crate) level: usize,
    pub(crate) last_change_date: NaiveDate,
    /// Positive: consecutive profitable outcomes. Negative: losing streak
    /// (only under `StreakConvention::TrackLosingStreak`).
    pub(crate) profitable_days: i32,
    pub(crate) profitable_weeks: u32,
    pub(crate) month_to_date_pnl: Decimal,
    pub(crate) month_start_value: Decimal,
    pub(crate) peak_value: Decimal,
    pub(crate) week_to_date_pnl: Decimal,
    pub(crate) last_value: Decimal,
    pub(crate) last_date: NaiveDate,
    pub(crate) history: VecDeque<TradeOutcome>,
    pub(crate) monthly_returns: VecDeque<MonthlyReturn>,
    pub(crate) halted: bool,
    pub(crate) frozen_on: Option<NaiveDate>,
}

impl NotchLedger {
    /// Fresh ledger at the scale's default level.
    pub fn new(strategy: &str, scale: &NotchScale, start: NaiveDate, capital: Decimal) -> Self {
        Self {
            strategy: strategy.to_string(),
            level: scale.default_level,
            last_change_date: start,
            profitable_days: 0,
            profitable_weeks: 0,
            month_to_date_pnl: Decimal::ZERO,
            month_start_value: capital,
            peak_value: capital,
            week_to_date_pnl: Decimal::ZERO,
            last_value: capital,
            last_date: start,
            history: VecDeque::new(),
            monthly_returns: VecDeque::new(),
            halted: false,
            frozen_on: None,
        }
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn last_change_date(&self) -> NaiveDate {
        self.last_change_date
    }

    pub fn profitable_days(&self) -> i32 {
        self.profitable_days
    }

    pub fn profitable_weeks(&self) -> u32 {
        self.profitable_weeks
    }

    pub fn month_to_date_pnl(&self) -> Decimal {
        self.month_to_date_pnl
    }

    pub fn month_start_value(&self) -> Decimal {
        self.month_start_value
    }

    pub fn peak_value(&self) -> Decimal {
        self.peak_value
    }

    pub fn week_to_date_pnl(&self) -> Decimal {
        self.week_to_date_pnl
    }

    /// Most recent portfolio value seen.
    pub fn last_value(&self) -> Decimal {
        self.last_value
    }

    /// Date of the most recent outcome (or the start date).
    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    pub fn history(&self) -> &VecDeque<TradeOutcome> {
        &self.history
    }

    pub fn monthly_returns(&self) -> &VecDeque<MonthlyReturn> {
        &self.monthly_returns
    }

    /// A trading halt has been recommended and not yet cleared.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Day on which trading was frozen by a daily emergency.
    pub fn frozen_on(&self) -> Option<NaiveDate> {
        self.frozen_on
    }

    /// Clear a halt after supervisory review.
    pub fn resume_trading(&mut self) {
        self.halted = false;
        self.frozen_on = None;
    }

    /// Month-to-date return in percent of the month's starting value.
    pub fn month_return_pct(&self) -> f64 {
        pct_of(self.month_to_date_pnl, self.month_start_value)
    }

    /// Drawdown from this month's peak in percent (never negative).
    pub fn month_drawdown_pct(&self) -> f64 {
        pct_of(self.peak_value - self.last_value, self.peak_value).max(0.0)
    }

    /// Fraction of retained outcomes that were profitable.
    pub fn win_rate(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let wins = self.history.iter().filter(|o| o.is_win()).count();
        Some(wins as f64 / self.history.len() as f64)
    }

    /// Consecutive losing outcomes at the end of the history.
    pub fn losing_streak(&self) -> usize {
        self.history.iter().rev().take_while(|o| o.is_loss()).count()
    }

    /// Losses among the most recent `window` outcomes.
    pub fn losses_in_last(&self, window: usize) -> usize {
        self.history.iter().rev().take(window).filter(|o| o.is_loss()).count()
    }

    /// Largest peak-to-trough decline of portfolio value over the history.
    pub fn max_drawdown_pct(&self) -> f64 {
        let mut peak = Decimal::ZERO;
        let mut worst = 0.0_f64;
        for outcome in &self.history {
            if outcome.portfolio_value > peak {
                peak = outcome.portfolio_value;
            }
            worst = worst.max(pct_of(peak - outcome.portfolio_value, peak));
        }
        worst
    }

    /// Sum of P&L over the retained history.
    pub fn total_pnl(&self) -> Decimal {
        self.history.iter().map(|o| o.pnl).sum()
    }

    /// Close out the week and month if `date` starts new ones.
    ///
    /// Returns the completed month, if any. Dates before the last applied
    /// outcome never roll.
    pub(crate) fn roll_periods(&mut self, date: NaiveDate) -> Option<MonthlyReturn> {
        if date <= self.last_date {
            return None;
        }

        if !same_iso_week(date, self.last_date) {
            if self.week_to_date_pnl > Decimal::ZERO {
                self.profitable_weeks += 1;
            } else {
                self.profitable_weeks = 0;
            }
            self.week_to_date_pnl = Decimal::ZERO;
        }

        if same_month(date, self.last_date) {
            return None;
        }

        let traded_this_month = self
            .history
            .back()
            .is_some_and(|o| same_month(o.date, self.last_date));

        let closed = MonthlyReturn {
            year: self.last_date.year(),
            month: self.last_date.month(),
            pnl: self.month_to_date_pnl,
            start_value: self.month_start_value,
        };

        if closed.pnl <= Decimal::ZERO {
            self.profitable_weeks = 0;
        }

        self.month_to_date_pnl = Decimal::ZERO;
        self.month_start_value = self.last_value;
        self.peak_value = self.last_value;
        self.halted = false;

        if !traded_this_month {
            return None;
        }

        self.monthly_returns.push_back(closed.clone());
        while self.monthly_returns.len() > MONTHLY_RETURNS_KEPT {
            self.monthly_returns.pop_front();
        }
        Some(closed)
    }

    /// Append an outcome and update accumulators and the streak counter.
    pub(crate) fn record(
        &mut self,
        outcome: &TradeOutcome,
        retention_days: i64,
        convention: StreakConvention,
    ) {
        self.history.push_back(outcome.clone());
        // Out-of-range windows keep the whole history.
        let cutoff = Duration::try_days(retention_days)
            .and_then(|window| outcome.date.checked_sub_signed(window));
        if let Some(cutoff) = cutoff {
            while self.history.front().is_some_and(|o| o.date < cutoff) {
                self.history.pop_front();
            }
        }

        self.month_to_date_pnl += outcome.pnl;
        self.week_to_date_pnl += outcome.pnl;
        if outcome.portfolio_value > self.peak_value {
            self.peak_value = outcome.portfolio_value;
        }
        self.last_value = outcome.portfolio_value;
        if outcome.date > self.last_date {
            self.last_date = outcome.date;
        }

        self.profitable_days = if outcome.is_win() {
            if self.profitable_days <= 0 {
                1
            } else {
                self.profitable_days.saturating_add(1)
            }
        } else {
            match convention {
                StreakConvention::ResetToZero => 0,
                StreakConvention::TrackLosingStreak => {
                    if self.profitable_days >= 0 {
                        -1
                    } else {
                        self.profitable_days.saturating_sub(1)
                    }
                }
            }
        };
    }

    pub(crate) fn change_level(&mut self, level: usize, date: NaiveDate) {
        if level != self.level {
            self.level = level;
            self.last_change_date = date;
        }
    }

    pub(crate) fn reset_streaks(&mut self) {
        self.profitable_days = 0;
        self.profitable_weeks = 0;
    }
}
