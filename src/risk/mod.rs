//! Risk guardrails applied alongside the notch ladder.
//!
//! Provides:
//! - Reverse-Fibonacci daily loss allowance and breach audit

pub mod guardrail;

pub use guardrail::{
    audit, daily_pnl, GuardrailBreach, GuardrailConfig, GuardrailError, ReverseFibonacciGuardrail,
};
