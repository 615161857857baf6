//! Notch risk ladder.
//!
//! Provides:
//! - Notch scales (per-strategy-family profiles of limits and thresholds)
//! - The per-strategy ledger and its rolling statistics
//! - The policy engine (downgrade, emergency, upgrade with hysteresis)
//! - Position sizing from the current notch
//! - JSON checkpoints of the ledger

pub mod checkpoint;
pub mod ledger;
pub mod policy;
pub mod scale;
pub mod sizing;

use thiserror::Error;

pub use checkpoint::{CheckpointError, LedgerCheckpoint};
pub use ledger::{MonthlyReturn, NotchLedger, TradeOutcome};
pub use policy::{AdjustmentEvent, AdjustmentTrigger, NotchAction, NotchPolicy};
pub use scale::{
    EmergencyDrop, LossCluster, NotchLevel, NotchScale, NotchThresholds, ScaleError, SizingRules,
    StreakConvention, UpgradeCriteria,
};
pub use sizing::Recommendation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotchError {
    #[error("Ledger level {level} out of range for a {levels}-level scale")]
    LevelOutOfRange { level: usize, levels: usize },
}
