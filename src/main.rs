//! odte-core CLI
//!
//! # Usage
//!
//! ```bash
//! # Price a contract
//! odte-core price --spot 100 --strike 100 --dte 30 --vol 0.2 --type call
//!
//! # Implied volatility from a market price
//! odte-core iv --spot 100 --strike 100 --dte 30 --market-price 2.5 --type put
//!
//! # Replay outcomes through a notch profile, resuming from a checkpoint
//! odte-core replay --outcomes outcomes.json --profile standard --checkpoint state/ledger.json
//!
//! # Audit daily losses against the guardrail
//! odte-core audit --outcomes outcomes.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use odte_core::notch::{LedgerCheckpoint, NotchLedger, NotchPolicy, TradeOutcome};
use odte_core::pricing::{self, OptionContract, OptionType};
use odte_core::risk;
use odte_core::ProfileConfig;

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "odte-core")]
#[command(about = "Option pricing and notch risk ladder tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ContractArgs {
    /// Underlying price
    #[arg(long)]
    spot: f64,

    /// Strike price
    #[arg(long)]
    strike: f64,

    /// Calendar days to expiry
    #[arg(long)]
    dte: f64,

    /// Option type (call/put)
    #[arg(long = "type", default_value = "call")]
    option_type: String,

    /// Risk-free rate (0.05 = 5%)
    #[arg(long, default_value_t = 0.0)]
    rate: f64,

    /// Dividend / carry yield
    #[arg(long, default_value_t = 0.0)]
    dividend_yield: f64,
}

impl ContractArgs {
    fn contract(&self, volatility: f64) -> Result<OptionContract> {
        let option_type: OptionType = self
            .option_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        Ok(OptionContract::new(
            self.spot,
            self.strike,
            OptionContract::years_from_dte(self.dte),
            volatility,
            option_type,
        )
        .with_rates(self.rate, self.dividend_yield))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Price a European option and print its Greeks
    Price {
        #[command(flatten)]
        contract: ContractArgs,

        /// Annualized volatility (0.20 = 20%)
        #[arg(long)]
        vol: f64,
    },

    /// Solve implied volatility from a market price
    Iv {
        #[command(flatten)]
        contract: ContractArgs,

        /// Observed option price
        #[arg(long)]
        market_price: f64,
    },

    /// Replay trade outcomes through a notch profile
    Replay {
        /// JSON array of {date, pnl, portfolio_value}
        #[arg(short, long)]
        outcomes: PathBuf,

        /// Profile name
        #[arg(short, long, default_value = "standard")]
        profile: String,

        /// Profiles file (built-in profiles if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Strategy identifier for a fresh ledger
        #[arg(long, default_value = "default")]
        strategy: String,

        /// Starting capital for a fresh ledger
        #[arg(long, default_value = "100000")]
        capital: Decimal,

        /// Start date for a fresh ledger (YYYY-MM-DD, defaults to first outcome)
        #[arg(long)]
        start: Option<String>,

        /// Checkpoint to resume from and write back
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Risk per position for the final sizing recommendation
        #[arg(long, default_value = "100")]
        per_trade_risk: Decimal,
    },

    /// Audit daily losses against the reverse-Fibonacci guardrail
    Audit {
        /// JSON array of {date, pnl, portfolio_value}
        #[arg(short, long)]
        outcomes: PathBuf,

        /// Profiles file supplying the guardrail allowances
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<ProfileConfig> {
    match path {
        Some(p) => ProfileConfig::load(p)
            .with_context(|| format!("Failed to load profiles from {}", p.display())),
        None => Ok(ProfileConfig::default()),
    }
}

fn load_outcomes(path: &Path) -> Result<Vec<TradeOutcome>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read outcomes from {}", path.display()))?;
    serde_json::from_str(&content).context("Invalid outcomes JSON")
}

fn cmd_price(args: ContractArgs, vol: f64) -> Result<()> {
    let contract = args.contract(vol)?;
    let result = pricing::price(&contract).context("Pricing failed")?;

    println!("{}", SEPARATOR);
    println!(
        "{} K={} S={} T={:.4}y vol={:.4}",
        contract.option_type.as_str(),
        contract.strike,
        contract.spot,
        contract.time_to_expiry,
        contract.volatility
    );
    println!("{}", SEPARATOR);
    println!("  Price: {:.4}", result.price);
    println!("  Delta: {:.4}", result.delta);
    println!("  Gamma: {:.6}", result.gamma);
    println!("  Theta: {:.4} /day", result.theta);
    println!("  Vega:  {:.4} /vol pt", result.vega);
    println!("  Rho:   {:.4} /rate pt", result.rho);
    Ok(())
}

fn cmd_iv(args: ContractArgs, market_price: f64) -> Result<()> {
    let contract = args.contract(0.0)?;
    let solution = pricing::solve_implied_volatility(market_price, &contract)
        .context("Implied volatility failed")?;

    println!("  Implied vol: {:.4}", solution.volatility);
    println!("  Method: {:?}", solution.method);
    println!("  Iterations: {}", solution.iterations);
    if !solution.converged {
        println!("  Warning: solver did not converge, best estimate shown");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    outcomes_path: &Path,
    profile: &str,
    config_path: Option<&Path>,
    strategy: &str,
    capital: Decimal,
    start: Option<String>,
    checkpoint_path: Option<&Path>,
    per_trade_risk: Decimal,
) -> Result<()> {
    let config = load_config(config_path)?;
    let scale = config.profile(profile)?;
    let policy = NotchPolicy::new(scale).context("Invalid notch profile")?;
    let outcomes = load_outcomes(outcomes_path)?;

    let resumed = match checkpoint_path {
        Some(p) if p.exists() => Some(
            LedgerCheckpoint::load(p)
                .with_context(|| format!("Failed to load checkpoint {}", p.display()))?,
        ),
        _ => None,
    };

    let mut ledger: NotchLedger = match resumed {
        Some(checkpoint) => {
            if checkpoint.profile != profile {
                bail!(
                    "Checkpoint was written for profile '{}', not '{}'",
                    checkpoint.profile,
                    profile
                );
            }
            policy.check_ledger(&checkpoint.ledger)?;
            info!(
                strategy = checkpoint.ledger.strategy(),
                last_date = %checkpoint.ledger.last_date(),
                "Resumed ledger from checkpoint"
            );
            checkpoint.ledger
        }
        None => {
            let start_date = match start {
                Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .context("Invalid start date format")?,
                None => match outcomes.first() {
                    Some(o) => o.date,
                    None => bail!("No outcomes and no start date"),
                },
            };
            policy.start_ledger(strategy, start_date, capital)
        }
    };

    let scale = policy.scale();
    println!("{}", SEPARATOR);
    println!(
        "Replay: {} outcomes, profile '{}', start at {}",
        outcomes.len(),
        scale.name,
        scale.level_name(ledger.level())
    );
    println!("{}", SEPARATOR);

    for outcome in &outcomes {
        let event = policy.apply_outcome(&mut ledger, outcome);
        if event.level_changed() || event.halt_trading || event.freeze_today {
            println!(
                "  {} {:>10} {:?}: {} -> {} ({})",
                event.date,
                outcome.pnl,
                event.action,
                scale.level_name(event.old_level),
                scale.level_name(event.new_level),
                event.reason
            );
        }
    }

    let rec = policy.recommend_position_sizing(&ledger, per_trade_risk);
    println!("\nFinal level: {} (limit {})", rec.level_name, rec.level_limit);
    println!("  Total P&L: {}", ledger.total_pnl());
    println!("  Month-to-date: {:.2}%", ledger.month_return_pct());
    println!("  Max drawdown: {:.2}%", ledger.max_drawdown_pct());
    println!(
        "  Positions: {} of {} (confidence {:.2})",
        rec.max_positions, rec.base_positions, rec.confidence
    );
    for adjustment in &rec.adjustments {
        println!("    - {}", adjustment);
    }
    if rec.halted {
        println!("  Trading halted until month rollover or manual resume");
    }

    if let Some(p) = checkpoint_path {
        LedgerCheckpoint::new(profile, &ledger)
            .save(p)
            .with_context(|| format!("Failed to write checkpoint {}", p.display()))?;
        info!(path = %p.display(), "Checkpoint saved");
    }

    Ok(())
}

fn cmd_audit(outcomes_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let outcomes = load_outcomes(outcomes_path)?;
    let days = risk::daily_pnl(&outcomes);
    let breaches = risk::audit(config.guardrail, &outcomes)?;

    println!("{}", SEPARATOR);
    println!("Guardrail audit: {} trading days", days.len());
    println!("{}", SEPARATOR);
    if breaches.is_empty() {
        println!("  No breaches");
    }
    for breach in &breaches {
        println!(
            "  {} net {} exceeded allowance {} (loss streak {})",
            breach.date, breach.net_pnl, breach.allowed_loss, breach.loss_streak_at_open
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odte_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Price { contract, vol } => cmd_price(contract, vol)?,
        Commands::Iv {
            contract,
            market_price,
        } => cmd_iv(contract, market_price)?,
        Commands::Replay {
            outcomes,
            profile,
            config,
            strategy,
            capital,
            start,
            checkpoint,
            per_trade_risk,
        } => cmd_replay(
            &outcomes,
            &profile,
            config.as_deref(),
            &strategy,
            capital,
            start,
            checkpoint.as_deref(),
            per_trade_risk,
        )?,
        Commands::Audit { outcomes, config } => cmd_audit(&outcomes, config.as_deref())?,
    }

    Ok(())
}
