//! Position sizing from the ledger's current notch.
//!
//! Base size is `floor(level limit / per-trade risk)`, then:
//! - cut by `high_risk_factor` when the month drawdown is close to the
//!   downgrade threshold
//! - cut again by `losing_streak_factor` during a losing streak
//! - zero while a halt is in force

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::NotchLedger;
use super::policy::NotchPolicy;

const WIN_RATE_WEIGHT: f64 = 0.4;
const STREAK_WEIGHT: f64 = 0.3;
const MONTH_WEIGHT: f64 = 0.3;

/// Sizing recommendation for the next trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub level: usize,
    pub level_name: String,
    pub level_limit: Decimal,
    pub per_trade_risk: Decimal,
    /// Positions allowed by the limit alone.
    pub base_positions: u32,
    /// Positions after risk adjustments.
    pub max_positions: u32,
    /// 0 = far from a downgrade, 1 = at the monthly threshold.
    pub downgrade_risk_score: f64,
    pub losing_streak: usize,
    /// Diagnostic only (0-1).
    pub confidence: f64,
    pub halted: bool,
    pub frozen_on: Option<NaiveDate>,
    pub adjustments: Vec<String>,
}

impl Recommendation {
    /// Check if the trade is allowed (at least 1 position, no halt).
    pub fn is_allowed(&self) -> bool {
        self.max_positions >= 1 && !self.halted
    }

    /// Whether new positions may be opened on `date`.
    pub fn allows_trading_on(&self, date: NaiveDate) -> bool {
        self.is_allowed() && self.frozen_on != Some(date)
    }

    /// Capital the recommendation actually commits.
    pub fn capital_at_risk(&self) -> Decimal {
        self.per_trade_risk * Decimal::from(self.max_positions)
    }
}

impl NotchPolicy {
    /// Recommend how many positions of `per_trade_risk` to carry.
    pub fn recommend_position_sizing(
        &self,
        ledger: &NotchLedger,
        per_trade_risk: Decimal,
    ) -> Recommendation {
        let scale = self.scale();
        let level = ledger.level().min(scale.top_level());
        let limit = scale.limit(level);
        let rules = &scale.sizing;
        let mut adjustments = Vec::new();

        let base_positions = if per_trade_risk > Decimal::ZERO {
            (limit / per_trade_risk).floor().to_u32().unwrap_or(u32::MAX)
        } else {
            adjustments.push("Invalid per-trade risk".to_string());
            0
        };

        let downgrade_risk_score = (ledger.month_drawdown_pct()
            / scale.thresholds.standard_monthly_loss_pct)
            .clamp(0.0, 1.0);
        let losing_streak = ledger.losing_streak();

        let mut positions = base_positions as f64;
        if downgrade_risk_score >= rules.high_risk_score {
            positions *= rules.high_risk_factor;
            adjustments.push(format!(
                "Downgrade risk {:.0}% (x{:.2})",
                downgrade_risk_score * 100.0,
                rules.high_risk_factor
            ));
        }
        if losing_streak >= rules.losing_streak_min {
            positions *= rules.losing_streak_factor;
            adjustments.push(format!(
                "Losing streak of {} (x{:.2})",
                losing_streak, rules.losing_streak_factor
            ));
        }

        let mut max_positions = positions.floor() as u32;
        if base_positions >= 1 && max_positions == 0 {
            max_positions = 1;
        }
        if ledger.is_halted() {
            max_positions = 0;
            adjustments.push("Trading halted".to_string());
        }

        Recommendation {
            level,
            level_name: scale.level_name(level).to_string(),
            level_limit: limit,
            per_trade_risk,
            base_positions,
            max_positions,
            downgrade_risk_score,
            losing_streak,
            confidence: confidence(ledger, losing_streak),
            halted: ledger.is_halted(),
            frozen_on: ledger.frozen_on(),
            adjustments,
        }
    }
}

/// Blend of win rate, streak and month-to-date return.
fn confidence(ledger: &NotchLedger, losing_streak: usize) -> f64 {
    let win_rate = ledger.win_rate().unwrap_or(0.5);
    let streak = if ledger.profitable_days() > 0 {
        ledger.profitable_days() as f64
    } else {
        -(losing_streak as f64)
    };
    let streak_score = (0.5 + streak / 10.0).clamp(0.0, 1.0);
    let month_score = (0.5 + ledger.month_return_pct() / 10.0).clamp(0.0, 1.0);

    (WIN_RATE_WEIGHT * win_rate + STREAK_WEIGHT * streak_score + MONTH_WEIGHT * month_score)
        .clamp(0.0, 1.0)
}
