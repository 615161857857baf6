//! Notch policy: the rules that move a ledger up and down its scale.
//!
//! Evaluation order on every outcome:
//! 1. Week/month rollover, then record the outcome
//! 2. Monthly emergency -> drop to floor (or N levels), halt trading
//! 3. Daily emergency -> drop 2 levels, freeze for the day
//! 4. Consecutive-loss emergency (if configured) -> same as daily emergency
//! 5. Standard downgrade (monthly loss, daily loss, loss cluster) -> drop 1
//! 6. Upgrade, only if nothing above fired -> up 1

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::ledger::{NotchLedger, TradeOutcome};
use super::scale::{EmergencyDrop, NotchScale, ScaleError};
use super::NotchError;

/// Direction of a ladder adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotchAction {
    Hold,
    Upgrade,
    Downgrade,
    Emergency,
}

/// Rule that produced an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentTrigger {
    None,
    Performance,
    DailyLoss,
    MonthlyLoss,
    LossCluster,
    DailyEmergency,
    MonthlyEmergency,
    LossStreakEmergency,
    Manual,
}

impl AdjustmentTrigger {
    /// Get reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::None => "No adjustment",
            Self::Performance => "Upgrade criteria met",
            Self::DailyLoss => "Daily loss threshold exceeded",
            Self::MonthlyLoss => "Monthly loss threshold exceeded",
            Self::LossCluster => "Too many recent losing outcomes",
            Self::DailyEmergency => "Catastrophic daily loss",
            Self::MonthlyEmergency => "Catastrophic monthly loss",
            Self::LossStreakEmergency => "Consecutive loss limit reached",
            Self::Manual => "Manual emergency downgrade",
        }
    }
}

/// Result of applying one outcome (or a manual intervention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEvent {
    pub date: NaiveDate,
    pub old_level: usize,
    pub new_level: usize,
    pub action: NotchAction,
    pub trigger: AdjustmentTrigger,
    pub reason: String,
    /// Stop opening positions until the halt is cleared.
    pub halt_trading: bool,
    /// No new positions for the rest of the day.
    pub freeze_today: bool,
}

impl AdjustmentEvent {
    pub fn level_changed(&self) -> bool {
        self.old_level != self.new_level
    }

    /// Signed number of levels moved (negative is down).
    pub fn levels_moved(&self) -> i64 {
        self.new_level as i64 - self.old_level as i64
    }
}

struct Decision {
    action: NotchAction,
    trigger: AdjustmentTrigger,
    new_level: usize,
    halt: bool,
    freeze: bool,
    detail: String,
}

impl Decision {
    fn hold() -> Self {
        Self {
            action: NotchAction::Hold,
            trigger: AdjustmentTrigger::None,
            new_level: 0,
            halt: false,
            freeze: false,
            detail: String::new(),
        }
    }
}

/// Stateless rules engine over one validated scale.
#[derive(Debug, Clone)]
pub struct NotchPolicy {
    scale: NotchScale,
}

impl NotchPolicy {
    /// Create a policy; the scale is validated here.
    pub fn new(scale: NotchScale) -> Result<Self, ScaleError> {
        scale.validate()?;
        Ok(Self { scale })
    }

    pub fn scale(&self) -> &NotchScale {
        &self.scale
    }

    /// Fresh ledger at the profile's default level.
    pub fn start_ledger(&self, strategy: &str, start: NaiveDate, capital: Decimal) -> NotchLedger {
        NotchLedger::new(strategy, &self.scale, start, capital)
    }

    /// Verify a ledger (e.g. restored from a checkpoint) fits this scale.
    pub fn check_ledger(&self, ledger: &NotchLedger) -> Result<(), NotchError> {
        if ledger.level >= self.scale.len() {
            return Err(NotchError::LevelOutOfRange {
                level: ledger.level,
                levels: self.scale.len(),
            });
        }
        Ok(())
    }

    /// Capital-at-risk limit for the ledger's current level.
    pub fn current_limit(&self, ledger: &NotchLedger) -> Decimal {
        self.scale.limit(ledger.level)
    }

    /// Apply one outcome and return the resulting adjustment.
    ///
    /// Outcomes must be applied in date order; an earlier-dated outcome is
    /// recorded but never triggers a period rollover.
    pub fn apply_outcome(&self, ledger: &mut NotchLedger, outcome: &TradeOutcome) -> AdjustmentEvent {
        let top = self.scale.top_level();
        debug_assert!(ledger.level <= top, "ledger level outside scale");
        if ledger.level > top {
            error!(
                strategy = %ledger.strategy,
                level = ledger.level,
                top,
                "Ledger level outside scale, clamping"
            );
            ledger.level = top;
        }

        if outcome.date < ledger.last_date {
            warn!(
                strategy = %ledger.strategy,
                date = %outcome.date,
                last_date = %ledger.last_date,
                "Outcome out of date order"
            );
        }
        if let Some(closed) = ledger.roll_periods(outcome.date) {
            info!(
                strategy = %ledger.strategy,
                year = closed.year,
                month = closed.month,
                pnl = %closed.pnl,
                return_pct = closed.return_pct(),
                "Month closed"
            );
        }

        ledger.record(outcome, self.scale.retention_days, self.scale.streak_convention);

        let old_level = ledger.level;
        let month_loss = ledger.month_drawdown_pct();
        let day_loss = outcome.day_loss_pct();

        let decision = match self.check_downgrade(ledger, month_loss, day_loss) {
            Some(decision) => decision,
            None => self.check_upgrade(ledger, outcome.date),
        };

        if decision.halt {
            ledger.halted = true;
        }
        if decision.freeze {
            ledger.frozen_on = Some(outcome.date);
        }
        let new_level = match decision.action {
            NotchAction::Hold => old_level,
            _ => decision.new_level,
        };
        ledger.change_level(new_level, outcome.date);
        debug_assert!(ledger.level <= top);

        let action = match decision.action {
            NotchAction::Downgrade | NotchAction::Upgrade if new_level == old_level => NotchAction::Hold,
            action => action,
        };

        let event = AdjustmentEvent {
            date: outcome.date,
            old_level,
            new_level,
            action,
            trigger: decision.trigger,
            reason: if decision.detail.is_empty() {
                decision.trigger.reason().to_string()
            } else {
                format!("{} ({})", decision.trigger.reason(), decision.detail)
            },
            halt_trading: decision.halt,
            freeze_today: decision.freeze,
        };
        self.log_event(ledger, &event);
        event
    }

    fn check_downgrade(
        &self,
        ledger: &mut NotchLedger,
        month_loss: f64,
        day_loss: f64,
    ) -> Option<Decision> {
        let t = &self.scale.thresholds;
        let level = ledger.level;

        if month_loss >= t.emergency_monthly_loss_pct {
            ledger.profitable_days = 0;
            let new_level = match t.monthly_emergency_drop {
                EmergencyDrop::ToFloor => 0,
                EmergencyDrop::Levels(n) => level.saturating_sub(n),
            };
            return Some(Decision {
                action: NotchAction::Emergency,
                trigger: AdjustmentTrigger::MonthlyEmergency,
                new_level,
                halt: true,
                freeze: true,
                detail: format!("month drawdown {:.2}%", month_loss),
            });
        }

        if day_loss >= t.emergency_daily_loss_pct {
            return Some(Decision {
                action: NotchAction::Emergency,
                trigger: AdjustmentTrigger::DailyEmergency,
                new_level: level.saturating_sub(t.daily_emergency_drop),
                halt: false,
                freeze: true,
                detail: format!("day loss {:.2}%", day_loss),
            });
        }

        if let Some(limit) = t.emergency_loss_streak {
            let streak = ledger.losing_streak();
            if streak >= limit {
                ledger.profitable_days = 0;
                return Some(Decision {
                    action: NotchAction::Emergency,
                    trigger: AdjustmentTrigger::LossStreakEmergency,
                    new_level: level.saturating_sub(t.daily_emergency_drop),
                    halt: false,
                    freeze: true,
                    detail: format!("{} losses in a row", streak),
                });
            }
        }

        let standard = if month_loss >= t.standard_monthly_loss_pct {
            Some((AdjustmentTrigger::MonthlyLoss, format!("month drawdown {:.2}%", month_loss)))
        } else if day_loss >= t.standard_daily_loss_pct {
            Some((AdjustmentTrigger::DailyLoss, format!("day loss {:.2}%", day_loss)))
        } else {
            t.loss_cluster.and_then(|cluster| {
                let losses = ledger.losses_in_last(cluster.window);
                (losses >= cluster.losses).then(|| {
                    (
                        AdjustmentTrigger::LossCluster,
                        format!("{} of last {} outcomes lost", losses, cluster.window),
                    )
                })
            })
        };

        standard.map(|(trigger, detail)| Decision {
            action: NotchAction::Downgrade,
            trigger,
            new_level: level.saturating_sub(1),
            halt: false,
            freeze: false,
            detail,
        })
    }

    fn check_upgrade(&self, ledger: &NotchLedger, date: NaiveDate) -> Decision {
        let level = ledger.level;
        if level >= self.scale.top_level() || ledger.halted {
            return Decision::hold();
        }
        let Some(criteria) = &self.scale.levels[level].upgrade else {
            return Decision::hold();
        };

        let days_at_level = (date - ledger.last_change_date).num_days();
        if days_at_level < criteria.min_days_at_level {
            debug!(
                strategy = %ledger.strategy,
                days_at_level,
                required = criteria.min_days_at_level,
                "Upgrade gated by holding period"
            );
            return Decision::hold();
        }

        let month_return = ledger.month_return_pct();
        let win_rate_ok = criteria
            .min_win_rate
            .map_or(true, |min| ledger.win_rate().is_some_and(|rate| rate >= min));

        let ready = ledger.profitable_days >= criteria.min_profitable_days
            && month_return >= criteria.min_month_return_pct
            && ledger.profitable_weeks >= criteria.min_profitable_weeks
            && win_rate_ok;

        if !ready {
            return Decision::hold();
        }

        Decision {
            action: NotchAction::Upgrade,
            trigger: AdjustmentTrigger::Performance,
            new_level: (level + 1).min(self.scale.top_level()),
            halt: false,
            freeze: false,
            detail: format!(
                "{} profitable days, month {:.2}%",
                ledger.profitable_days, month_return
            ),
        }
    }

    /// Supervisory override: always drops the configured number of levels,
    /// resets streak counters and recommends a halt.
    pub fn force_emergency_downgrade(
        &self,
        ledger: &mut NotchLedger,
        date: NaiveDate,
        reason: &str,
    ) -> AdjustmentEvent {
        let old_level = ledger.level.min(self.scale.top_level());
        let new_level = old_level.saturating_sub(self.scale.thresholds.manual_emergency_drop);

        ledger.level = old_level;
        ledger.change_level(new_level, date);
        ledger.reset_streaks();
        ledger.halted = true;
        ledger.frozen_on = Some(date);

        let event = AdjustmentEvent {
            date,
            old_level,
            new_level,
            action: NotchAction::Emergency,
            trigger: AdjustmentTrigger::Manual,
            reason: format!("{}: {}", AdjustmentTrigger::Manual.reason(), reason),
            halt_trading: true,
            freeze_today: true,
        };
        self.log_event(ledger, &event);
        event
    }

    fn log_event(&self, ledger: &NotchLedger, event: &AdjustmentEvent) {
        let from = self.scale.level_name(event.old_level);
        let to = self.scale.level_name(event.new_level);
        match event.action {
            NotchAction::Emergency => warn!(
                strategy = %ledger.strategy,
                date = %event.date,
                from,
                to,
                halt = event.halt_trading,
                reason = %event.reason,
                "Emergency notch adjustment"
            ),
            NotchAction::Upgrade | NotchAction::Downgrade => info!(
                strategy = %ledger.strategy,
                date = %event.date,
                from,
                to,
                reason = %event.reason,
                "Notch level changed"
            ),
            NotchAction::Hold => debug!(
                strategy = %ledger.strategy,
                date = %event.date,
                level = from,
                trigger = ?event.trigger,
                "Notch level held"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notch::scale::{LossCluster, UpgradeCriteria};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn policy() -> NotchPolicy {
        NotchPolicy::new(NotchScale::standard()).unwrap()
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let mut scale = NotchScale::standard();
        scale.levels.clear();
        assert!(NotchPolicy::new(scale).is_err());
    }

    #[test]
    fn test_small_gain_holds() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        let event = policy.apply_outcome(
            &mut ledger,
            &TradeOutcome::new(date(2024, 1, 3), dec!(200), dec!(100_200)),
        );
        assert_eq!(event.action, NotchAction::Hold);
        assert_eq!(ledger.level(), 3);
        assert_eq!(ledger.profitable_days(), 1);
    }

    #[test]
    fn test_daily_emergency_drops_two_levels() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(112_000));
        let event = policy.apply_outcome(
            &mut ledger,
            &TradeOutcome::new(date(2024, 1, 3), dec!(-12_000), dec!(100_000)),
        );
        // 12% day loss also breaches the 8% monthly standard threshold but
        // not the 15% monthly emergency one.
        assert_eq!(event.action, NotchAction::Emergency);
        assert_eq!(event.trigger, AdjustmentTrigger::DailyEmergency);
        assert_eq!(event.new_level, 1);
        assert!(event.freeze_today);
        assert!(!event.halt_trading);
        assert_eq!(ledger.frozen_on(), Some(date(2024, 1, 3)));
        assert_eq!(ledger.last_change_date(), date(2024, 1, 3));
    }

    #[test]
    fn test_monthly_emergency_drops_to_floor_and_halts() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        // Three 6% losses: the third takes the month past 15%.
        let mut value = dec!(100_000);
        let mut last = None;
        for day in 3..6 {
            let pnl = dec!(-6_000);
            value += pnl;
            last = Some(policy.apply_outcome(&mut ledger, &TradeOutcome::new(date(2024, 1, day), pnl, value)));
        }
        let event = last.unwrap();
        assert_eq!(event.trigger, AdjustmentTrigger::MonthlyEmergency);
        assert_eq!(event.new_level, 0);
        assert!(event.halt_trading);
        assert!(ledger.is_halted());
        assert_eq!(ledger.profitable_days(), 0);
    }

    #[test]
    fn test_standard_daily_loss_drops_one() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        let event = policy.apply_outcome(
            &mut ledger,
            &TradeOutcome::new(date(2024, 1, 3), dec!(-5_500), dec!(94_500)),
        );
        assert_eq!(event.action, NotchAction::Downgrade);
        assert_eq!(event.trigger, AdjustmentTrigger::DailyLoss);
        assert_eq!(event.levels_moved(), -1);
    }

    #[test]
    fn test_loss_cluster_downgrade() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        let mut value = dec!(100_000);
        let pnls = [dec!(-100), dec!(50), dec!(-100), dec!(-100), dec!(-100)];
        let mut events = Vec::new();
        for (i, pnl) in pnls.iter().enumerate() {
            value += *pnl;
            events.push(policy.apply_outcome(
                &mut ledger,
                &TradeOutcome::new(date(2024, 1, 3 + i as u32), *pnl, value),
            ));
        }
        assert!(events[..4].iter().all(|e| e.action == NotchAction::Hold));
        assert_eq!(events[4].trigger, AdjustmentTrigger::LossCluster);
        assert_eq!(ledger.level(), 2);
    }

    #[test]
    fn test_downgrade_at_floor_reports_hold() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        ledger.level = 0;
        let event = policy.apply_outcome(
            &mut ledger,
            &TradeOutcome::new(date(2024, 1, 3), dec!(-6_000), dec!(94_000)),
        );
        assert_eq!(event.action, NotchAction::Hold);
        assert_eq!(event.trigger, AdjustmentTrigger::DailyLoss);
        assert_eq!(ledger.level(), 0);
    }

    #[test]
    fn test_upgrade_after_holding_period() {
        let mut scale = NotchScale::standard();
        scale.levels[3].upgrade = Some(UpgradeCriteria::new(5, 3, 0.5));
        let policy = NotchPolicy::new(scale).unwrap();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 1), dec!(100_000));

        let mut value = dec!(100_000);
        let mut events = Vec::new();
        for day in 2..=6 {
            value += dec!(300);
            events.push(policy.apply_outcome(
                &mut ledger,
                &TradeOutcome::new(date(2024, 1, day), dec!(300), value),
            ));
        }
        // Criteria met on day 4 (3 wins, 0.9%) but held until day 6.
        assert!(events[..4].iter().all(|e| e.action == NotchAction::Hold));
        assert_eq!(events[4].action, NotchAction::Upgrade);
        assert_eq!(ledger.level(), 4);
        assert_eq!(ledger.last_change_date(), date(2024, 1, 6));
    }

    #[test]
    fn test_win_rate_gate() {
        let mut scale = NotchScale::standard();
        scale.levels[3].upgrade = Some(UpgradeCriteria::new(0, 1, 0.0).with_win_rate(0.9));
        scale.thresholds.loss_cluster = Some(LossCluster { losses: 5, window: 5 });
        let policy = NotchPolicy::new(scale).unwrap();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 1), dec!(100_000));

        policy.apply_outcome(&mut ledger, &TradeOutcome::new(date(2024, 1, 2), dec!(-10), dec!(99_990)));
        let event = policy.apply_outcome(
            &mut ledger,
            &TradeOutcome::new(date(2024, 1, 3), dec!(500), dec!(100_490)),
        );
        // Win rate 50% < 90%
        assert_eq!(event.action, NotchAction::Hold);
        assert_eq!(ledger.level(), 3);
    }

    #[test]
    fn test_iron_condor_loss_streak_emergency() {
        let policy = NotchPolicy::new(NotchScale::iron_condor()).unwrap();
        let mut ledger = policy.start_ledger("ic", date(2024, 3, 1), dec!(100_000));
        // Level 2 with a 3-of-4 cluster; keep losses tiny so only counts matter.
        let mut value = dec!(100_000);
        let mut last = None;
        for day in 4..9 {
            value -= dec!(10);
            last = Some(policy.apply_outcome(
                &mut ledger,
                &TradeOutcome::new(date(2024, 3, day), dec!(-10), value),
            ));
        }
        let event = last.unwrap();
        assert_eq!(event.trigger, AdjustmentTrigger::LossStreakEmergency);
        assert_eq!(event.action, NotchAction::Emergency);
        assert_eq!(ledger.level(), 0);
        assert_eq!(ledger.profitable_days(), 0);
    }

    #[test]
    fn test_force_emergency_downgrade() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        ledger.profitable_days = 4;
        ledger.profitable_weeks = 2;

        let event = policy.force_emergency_downgrade(&mut ledger, date(2024, 1, 10), "risk monitor");
        assert_eq!(event.action, NotchAction::Emergency);
        assert_eq!(event.trigger, AdjustmentTrigger::Manual);
        assert_eq!(event.levels_moved(), -2);
        assert!(event.reason.contains("risk monitor"));
        assert_eq!(ledger.profitable_days(), 0);
        assert_eq!(ledger.profitable_weeks(), 0);
        assert!(ledger.is_halted());

        // Still succeeds at the floor
        ledger.level = 0;
        let event = policy.force_emergency_downgrade(&mut ledger, date(2024, 1, 11), "again");
        assert_eq!(event.new_level, 0);
    }

    #[test]
    fn test_check_ledger_rejects_foreign_level() {
        let policy = NotchPolicy::new(NotchScale::iron_condor()).unwrap();
        let mut ledger = policy.start_ledger("ic", date(2024, 1, 2), dec!(100_000));
        assert!(policy.check_ledger(&ledger).is_ok());
        ledger.level = 6;
        assert!(matches!(
            policy.check_ledger(&ledger),
            Err(NotchError::LevelOutOfRange { level: 6, levels: 5 })
        ));
    }

    #[test]
    fn test_halt_clears_at_month_rollover() {
        let policy = policy();
        let mut ledger = policy.start_ledger("spx", date(2024, 1, 2), dec!(100_000));
        policy.force_emergency_downgrade(&mut ledger, date(2024, 1, 20), "test");
        assert!(ledger.is_halted());

        policy.apply_outcome(&mut ledger, &TradeOutcome::new(date(2024, 1, 22), dec!(10), dec!(100_010)));
        assert!(ledger.is_halted());
        policy.apply_outcome(&mut ledger, &TradeOutcome::new(date(2024, 2, 1), dec!(10), dec!(100_020)));
        assert!(!ledger.is_halted());
    }
}
