pub mod config;
pub mod notch;
pub mod pricing;
pub mod risk;

// Re-export commonly used types
pub use config::{ConfigError, ProfileConfig};
pub use notch::{
    AdjustmentEvent, LedgerCheckpoint, NotchAction, NotchLedger, NotchPolicy, NotchScale,
    Recommendation, TradeOutcome,
};
pub use pricing::{
    implied_volatility, price, OptionContract, OptionType, PricingError, PricingResult,
};
pub use risk::{GuardrailConfig, ReverseFibonacciGuardrail};
