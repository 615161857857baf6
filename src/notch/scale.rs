//! Notch scale: the ordered ladder of capital-at-risk limits.
//!
//! Index 0 is the most defensive level, the last index the most
//! aggressive. Each strategy family supplies its own scale as data; the
//! policy engine is shared.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScaleError {
    #[error("Notch scale '{0}' has no levels")]
    Empty(String),

    #[error("Level {level} limit {limit} must be positive")]
    NonPositiveLimit { level: usize, limit: Decimal },

    #[error("Level {level} limit {limit} must exceed the limit below it ({previous})")]
    NonMonotonic {
        level: usize,
        limit: Decimal,
        previous: Decimal,
    },

    #[error("Default level {index} out of range for {levels} levels")]
    DefaultLevelOutOfRange { index: usize, levels: usize },

    #[error("Invalid {field}: {reason}")]
    InvalidThreshold { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ScaleError {
    ScaleError::InvalidThreshold {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Requirements for leaving a level upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCriteria {
    /// Days that must pass since the last level change.
    pub min_days_at_level: i64,
    /// Consecutive profitable outcomes.
    pub min_profitable_days: i32,
    /// Month-to-date return in percent.
    pub min_month_return_pct: f64,
    /// Consecutive profitable weeks.
    #[serde(default)]
    pub min_profitable_weeks: u32,
    /// Trailing win rate over the retained history (0.0 - 1.0).
    #[serde(default)]
    pub min_win_rate: Option<f64>,
}

impl UpgradeCriteria {
    pub fn new(min_days_at_level: i64, min_profitable_days: i32, min_month_return_pct: f64) -> Self {
        Self {
            min_days_at_level,
            min_profitable_days,
            min_month_return_pct,
            min_profitable_weeks: 0,
            min_win_rate: None,
        }
    }

    pub fn with_weeks(mut self, weeks: u32) -> Self {
        self.min_profitable_weeks = weeks;
        self
    }

    pub fn with_win_rate(mut self, win_rate: f64) -> Self {
        self.min_win_rate = Some(win_rate);
        self
    }
}

/// A single rung of the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotchLevel {
    pub name: String,
    /// Capital at risk allowed at this level.
    pub limit: Decimal,
    /// Criteria to move up from this level. `None` means no upgrade.
    #[serde(default)]
    pub upgrade: Option<UpgradeCriteria>,
}

impl NotchLevel {
    pub fn new(name: &str, limit: Decimal, upgrade: Option<UpgradeCriteria>) -> Self {
        Self {
            name: name.to_string(),
            limit,
            upgrade,
        }
    }
}

/// How far a monthly emergency drops the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyDrop {
    /// Straight to level 0.
    ToFloor,
    /// Down by a fixed number of levels.
    Levels(usize),
}

/// What a non-profitable outcome does to the profitable-day counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakConvention {
    /// Counter goes back to 0.
    #[default]
    ResetToZero,
    /// Counter goes negative and counts the losing streak.
    TrackLosingStreak,
}

/// "K of the last M outcomes were losses".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossCluster {
    pub losses: usize,
    pub window: usize,
}

/// Downgrade and emergency thresholds. Percentages are in percent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotchThresholds {
    pub standard_daily_loss_pct: f64,
    pub standard_monthly_loss_pct: f64,
    pub emergency_daily_loss_pct: f64,
    pub emergency_monthly_loss_pct: f64,
    /// Standard one-level downgrade on clustered losses.
    pub loss_cluster: Option<LossCluster>,
    /// Consecutive losses that trigger the emergency protocol.
    pub emergency_loss_streak: Option<usize>,
    pub daily_emergency_drop: usize,
    pub monthly_emergency_drop: EmergencyDrop,
    pub manual_emergency_drop: usize,
}

impl Default for NotchThresholds {
    fn default() -> Self {
        Self {
            standard_daily_loss_pct: 5.0,
            standard_monthly_loss_pct: 8.0,
            emergency_daily_loss_pct: 10.0,
            emergency_monthly_loss_pct: 15.0,
            loss_cluster: Some(LossCluster {
                losses: 4,
                window: 5,
            }),
            emergency_loss_streak: None,
            daily_emergency_drop: 2,
            monthly_emergency_drop: EmergencyDrop::ToFloor,
            manual_emergency_drop: 2,
        }
    }
}

/// Position sizing adjustments applied on top of the level limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingRules {
    /// Downgrade risk score (0-1) at which sizing is cut.
    pub high_risk_score: f64,
    /// Multiplier applied when the risk score is high.
    pub high_risk_factor: f64,
    /// Trailing losses that count as an active losing streak.
    pub losing_streak_min: usize,
    /// Multiplier applied during a losing streak.
    pub losing_streak_factor: f64,
}

impl Default for SizingRules {
    fn default() -> Self {
        Self {
            high_risk_score: 0.75,
            high_risk_factor: 0.5,
            losing_streak_min: 2,
            losing_streak_factor: 0.5,
        }
    }
}

fn default_retention_days() -> i64 {
    183
}

/// Longest outcome history a profile may keep.
pub const MAX_RETENTION_DAYS: i64 = 3660;

/// Smallest drop for a daily or consecutive-loss emergency.
pub const MIN_EMERGENCY_DROP: usize = 2;

/// Complete risk ladder profile for one strategy family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotchScale {
    pub name: String,
    pub levels: Vec<NotchLevel>,
    /// Level a fresh ledger starts at.
    pub default_level: usize,
    #[serde(default)]
    pub thresholds: NotchThresholds,
    #[serde(default)]
    pub sizing: SizingRules,
    #[serde(default)]
    pub streak_convention: StreakConvention,
    /// Days of outcome history kept for rolling statistics.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl NotchScale {
    /// Check every structural and threshold constraint.
    pub fn validate(&self) -> Result<(), ScaleError> {
        if self.levels.is_empty() {
            return Err(ScaleError::Empty(self.name.clone()));
        }

        let mut previous: Option<Decimal> = None;
        for (level, notch) in self.levels.iter().enumerate() {
            if notch.limit <= Decimal::ZERO {
                return Err(ScaleError::NonPositiveLimit {
                    level,
                    limit: notch.limit,
                });
            }
            if let Some(prev) = previous {
                if notch.limit <= prev {
                    return Err(ScaleError::NonMonotonic {
                        level,
                        limit: notch.limit,
                        previous: prev,
                    });
                }
            }
            previous = Some(notch.limit);

            if let Some(criteria) = &notch.upgrade {
                if criteria.min_days_at_level < 0 {
                    return Err(invalid(
                        format!("levels[{}].upgrade.min_days_at_level", level),
                        "must not be negative",
                    ));
                }
                if let Some(rate) = criteria.min_win_rate {
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(invalid(
                            format!("levels[{}].upgrade.min_win_rate", level),
                            "must be within [0, 1]",
                        ));
                    }
                }
            }
        }

        if self.default_level >= self.levels.len() {
            return Err(ScaleError::DefaultLevelOutOfRange {
                index: self.default_level,
                levels: self.levels.len(),
            });
        }

        let t = &self.thresholds;
        for (field, value) in [
            ("standard_daily_loss_pct", t.standard_daily_loss_pct),
            ("standard_monthly_loss_pct", t.standard_monthly_loss_pct),
            ("emergency_daily_loss_pct", t.emergency_daily_loss_pct),
            ("emergency_monthly_loss_pct", t.emergency_monthly_loss_pct),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(field, "must be a positive percentage"));
            }
        }
        if t.emergency_daily_loss_pct < t.standard_daily_loss_pct {
            return Err(invalid(
                "emergency_daily_loss_pct",
                "must not be below the standard daily threshold",
            ));
        }
        if t.emergency_monthly_loss_pct < t.standard_monthly_loss_pct {
            return Err(invalid(
                "emergency_monthly_loss_pct",
                "must not be below the standard monthly threshold",
            ));
        }
        if let Some(cluster) = t.loss_cluster {
            if cluster.losses == 0 || cluster.window < cluster.losses {
                return Err(invalid("loss_cluster", "need 0 < losses <= window"));
            }
        }
        if t.emergency_loss_streak == Some(0) {
            return Err(invalid("emergency_loss_streak", "must be at least 1"));
        }
        if t.daily_emergency_drop < MIN_EMERGENCY_DROP {
            return Err(invalid(
                "daily_emergency_drop",
                format!("must be at least {} levels", MIN_EMERGENCY_DROP),
            ));
        }
        if t.monthly_emergency_drop == EmergencyDrop::Levels(0) {
            return Err(invalid("monthly_emergency_drop", "must drop at least 1 level"));
        }
        if t.manual_emergency_drop == 0 {
            return Err(invalid("manual_emergency_drop", "must drop at least 1 level"));
        }

        let s = &self.sizing;
        if !(0.0..=1.0).contains(&s.high_risk_score) {
            return Err(invalid("sizing.high_risk_score", "must be within [0, 1]"));
        }
        for (field, value) in [
            ("sizing.high_risk_factor", s.high_risk_factor),
            ("sizing.losing_streak_factor", s.losing_streak_factor),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(field, "must be within (0, 1]"));
            }
        }

        if self.retention_days <= 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(invalid(
                "retention_days",
                format!("must be within 1..={}", MAX_RETENTION_DAYS),
            ));
        }

        Ok(())
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Index of the most aggressive level.
    pub fn top_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Capital-at-risk limit for a level (clamped to the ladder).
    pub fn limit(&self, level: usize) -> Decimal {
        self.levels
            .get(level.min(self.top_level()))
            .map(|l| l.limit)
            .unwrap_or(Decimal::ZERO)
    }

    /// Display name for a level.
    pub fn level_name(&self, level: usize) -> &str {
        self.levels
            .get(level)
            .map(|l| l.name.as_str())
            .unwrap_or("Unknown")
    }

    /// Look up a level index by (case-insensitive) name.
    pub fn find_level(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// Seven-level ladder used by the credit-spread strategies.
    ///
    /// Starts at Balanced; 4 losses in 5 outcomes steps down a level and a
    /// monthly emergency drops straight to Survival.
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            levels: vec![
                NotchLevel::new("Survival", dec!(100), Some(UpgradeCriteria::new(2, 2, 0.0))),
                NotchLevel::new("Defensive", dec!(250), Some(UpgradeCriteria::new(3, 3, 0.5))),
                NotchLevel::new("Conservative", dec!(400), Some(UpgradeCriteria::new(5, 3, 1.0))),
                NotchLevel::new(
                    "Balanced",
                    dec!(600),
                    Some(UpgradeCriteria::new(5, 4, 2.0).with_weeks(1)),
                ),
                NotchLevel::new(
                    "Growth",
                    dec!(900),
                    Some(UpgradeCriteria::new(7, 5, 3.0).with_weeks(2).with_win_rate(0.60)),
                ),
                NotchLevel::new(
                    "Aggressive",
                    dec!(1300),
                    Some(UpgradeCriteria::new(10, 6, 4.0).with_weeks(3).with_win_rate(0.65)),
                ),
                NotchLevel::new("Maximum", dec!(1800), None),
            ],
            default_level: 3,
            thresholds: NotchThresholds::default(),
            sizing: SizingRules::default(),
            streak_convention: StreakConvention::ResetToZero,
            retention_days: default_retention_days(),
        }
    }

    /// Five-level ladder for iron condors.
    ///
    /// Tracks losing streaks as negative counts; five losses in a row is an
    /// emergency, and a monthly emergency drops three levels.
    pub fn iron_condor() -> Self {
        Self {
            name: "iron_condor".to_string(),
            levels: vec![
                NotchLevel::new("Survival", dec!(200), Some(UpgradeCriteria::new(3, 3, 0.5))),
                NotchLevel::new("Cautious", dec!(400), Some(UpgradeCriteria::new(5, 4, 1.0))),
                NotchLevel::new(
                    "Standard",
                    dec!(700),
                    Some(UpgradeCriteria::new(7, 5, 2.0).with_weeks(2)),
                ),
                NotchLevel::new(
                    "Elevated",
                    dec!(1000),
                    Some(UpgradeCriteria::new(10, 6, 3.0).with_weeks(3).with_win_rate(0.70)),
                ),
                NotchLevel::new("Maximum", dec!(1400), None),
            ],
            default_level: 2,
            thresholds: NotchThresholds {
                standard_daily_loss_pct: 4.0,
                standard_monthly_loss_pct: 6.0,
                emergency_daily_loss_pct: 8.0,
                emergency_monthly_loss_pct: 12.0,
                loss_cluster: Some(LossCluster {
                    losses: 3,
                    window: 4,
                }),
                emergency_loss_streak: Some(5),
                daily_emergency_drop: 2,
                monthly_emergency_drop: EmergencyDrop::Levels(3),
                manual_emergency_drop: 3,
            },
            sizing: SizingRules::default(),
            streak_convention: StreakConvention::TrackLosingStreak,
            retention_days: default_retention_days(),
        }
    }

    /// Built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::standard()),
            "iron_condor" => Some(Self::iron_condor()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_validate() {
        NotchScale::standard().validate().unwrap();
        NotchScale::iron_condor().validate().unwrap();
        assert!(NotchScale::builtin("standard").is_some());
        assert!(NotchScale::builtin("nope").is_none());
    }

    #[test]
    fn test_standard_ladder_shape() {
        let scale = NotchScale::standard();
        assert_eq!(scale.len(), 7);
        assert_eq!(scale.level_name(scale.default_level), "Balanced");
        assert_eq!(scale.level_name(0), "Survival");
        assert_eq!(scale.level_name(scale.top_level()), "Maximum");
        assert_eq!(scale.find_level("growth"), Some(4));
        assert_eq!(scale.limit(99), dec!(1800));
    }

    #[test]
    fn test_empty_scale_rejected() {
        let mut scale = NotchScale::standard();
        scale.levels.clear();
        assert!(matches!(scale.validate(), Err(ScaleError::Empty(_))));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let mut scale = NotchScale::standard();
        scale.levels[4].limit = dec!(500);
        assert!(matches!(
            scale.validate(),
            Err(ScaleError::NonMonotonic { level: 4, .. })
        ));

        let mut scale = NotchScale::standard();
        scale.levels[2].limit = scale.levels[1].limit;
        assert!(matches!(
            scale.validate(),
            Err(ScaleError::NonMonotonic { level: 2, .. })
        ));
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        let mut scale = NotchScale::standard();
        scale.levels[0].limit = Decimal::ZERO;
        assert!(matches!(
            scale.validate(),
            Err(ScaleError::NonPositiveLimit { level: 0, .. })
        ));
    }

    #[test]
    fn test_default_level_out_of_range() {
        let mut scale = NotchScale::standard();
        scale.default_level = 7;
        assert!(matches!(
            scale.validate(),
            Err(ScaleError::DefaultLevelOutOfRange { index: 7, levels: 7 })
        ));
    }

    #[test]
    fn test_threshold_validation() {
        let mut scale = NotchScale::standard();
        scale.thresholds.emergency_daily_loss_pct = 1.0;
        assert!(scale.validate().is_err());

        let mut scale = NotchScale::standard();
        scale.thresholds.loss_cluster = Some(LossCluster { losses: 6, window: 5 });
        assert!(scale.validate().is_err());

        let mut scale = NotchScale::standard();
        scale.sizing.high_risk_factor = 0.0;
        assert!(scale.validate().is_err());
    }

    #[test]
    fn test_retention_window_bounded() {
        let mut scale = NotchScale::standard();
        scale.retention_days = MAX_RETENTION_DAYS;
        scale.validate().unwrap();

        for days in [0, MAX_RETENTION_DAYS + 1, 1_000_000_000_000] {
            scale.retention_days = days;
            assert!(matches!(
                scale.validate(),
                Err(ScaleError::InvalidThreshold { ref field, .. }) if field == "retention_days"
            ));
        }
    }

    #[test]
    fn test_emergency_drops_validated() {
        for drop in [0, 1] {
            let mut scale = NotchScale::standard();
            scale.thresholds.daily_emergency_drop = drop;
            assert!(matches!(
                scale.validate(),
                Err(ScaleError::InvalidThreshold { ref field, .. }) if field == "daily_emergency_drop"
            ));
        }

        let mut scale = NotchScale::standard();
        scale.thresholds.manual_emergency_drop = 0;
        assert!(scale.validate().is_err());

        let mut scale = NotchScale::standard();
        scale.thresholds.monthly_emergency_drop = EmergencyDrop::Levels(0);
        assert!(scale.validate().is_err());
    }
}
