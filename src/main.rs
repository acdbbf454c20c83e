use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};

use floodgate::config::FloodgateConfig;
use floodgate::error::FloodgateError;
use floodgate::ratelimit::{BulkKeyReset, RuleResolver, SlidingWindowLimiter, ThrottleGuard};
use floodgate::store::{RedisStore, WindowStore};

/// Administrative CLI for the Floodgate rate limiter.
#[derive(Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "floodgate.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume one attempt for an identity and report the decision
    Check {
        /// Identity to check (e.g. a client address)
        identity: String,
        /// Rule to check against (defaults to "default")
        #[arg(short, long)]
        rule: Option<String>,
    },
    /// Report whether the next attempt would be rejected, without consuming quota
    Probe {
        identity: String,
        #[arg(short, long)]
        rule: Option<String>,
    },
    /// Clear rate limit state for one identity across all rules
    Reset { identity: String },
    /// Clear all rate limit state under the namespace prefix
    ResetAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Load configuration, falling back to defaults when no file is present
    let config = if std::path::Path::new(&cli.config).exists() {
        FloodgateConfig::from_file(&cli.config)?
    } else {
        info!(path = %cli.config, "No configuration file found, using defaults");
        FloodgateConfig::default()
    };

    // Connect once; the store handle is shared by every component
    let store: Arc<dyn WindowStore> = Arc::new(RedisStore::connect(&config.store.url).await?);

    let resolver = RuleResolver::from_config(config.store.key_prefix.clone(), &config.rules);
    let limiter = SlidingWindowLimiter::new(store.clone());

    match cli.command {
        Command::Check { identity, rule } => {
            let guard = ThrottleGuard::new(resolver, limiter);
            match guard.guard(rule.as_deref(), &identity, || async {}).await {
                Ok(()) => println!("admitted"),
                Err(FloodgateError::RateLimitExceeded { wait_time }) => {
                    println!("rejected, retry in {wait_time}s");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Probe { identity, rule } => {
            let rule_name = rule.as_deref().unwrap_or(floodgate::ratelimit::DEFAULT_RULE);
            let rule = resolver.resolve(rule_name)?;
            let key = resolver.make_key(rule_name, &identity);

            if limiter.is_limited(&key, rule.period, rule.limit).await? {
                let wait_time = limiter.time_to_reset(&key).await?;
                println!("limited, retry in {wait_time}s");
            } else {
                println!("not limited");
            }
        }
        Command::Reset { identity } => {
            let sweeper = BulkKeyReset::new(store, resolver, config.store.sweep_chunk);
            let deleted = sweeper.reset_identity(&identity).await?;
            println!("deleted {deleted} key(s)");
        }
        Command::ResetAll => {
            let sweeper = BulkKeyReset::new(store, resolver, config.store.sweep_chunk);
            let deleted = sweeper.reset_all().await?;
            println!("deleted {deleted} key(s)");
        }
    }

    Ok(())
}
