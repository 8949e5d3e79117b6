use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use breakeven::application::supervisor::{ConfirmationGate, TradePlan, TradeSupervisor};
use breakeven::config::{TradingConfig, DEFAULT_CONFIG_PATH};
use breakeven::domain::entities::trade::{Side, TradeRecord};
use breakeven::domain::errors::TradeError;
use breakeven::domain::repositories::trade_store::TradeStore;
use breakeven::infrastructure::coindcx_client::{CoinDcxClient, CoinDcxConfig};
use breakeven::infrastructure::coindcx_market_data::CoinDcxMarketData;
use breakeven::persistence::open_store;
use breakeven::rate_limit::create_rate_limiter;
use breakeven::secrets::load_credentials;

#[derive(Parser)]
#[command(name = "breakeven")]
#[command(about = "Open a futures trade and move its stop-loss to breakeven", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan, confirm and open a trade, then monitor it
    Open {
        /// Direction: long or short
        side: Side,
        /// Fixed quantity overriding the configured sizing policy
        #[arg(long)]
        size: Option<f64>,
    },
    /// Resume monitoring of stored trades
    Resume {
        /// Monitor every stored trade instead of only the latest
        #[arg(long)]
        all: bool,
    },
    /// Print stored trades
    List,
    /// Delete a stored trade record (orders on the exchange are not touched)
    Close {
        /// Trade id
        id: String,
    },
}

/// Asks the operator on stdin
struct StdinConfirmation;

#[async_trait]
impl ConfirmationGate for StdinConfirmation {
    async fn confirm(&self, plan: &TradePlan) -> bool {
        let prompt = format!("\n{}\n\nPlace this trade? [y/N] ", plan);
        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(prompt.as_bytes());
            let _ = stdout.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Ok(Err(e)) => {
                warn!("Could not read confirmation: {}", e);
                false
            }
            Err(e) => {
                warn!("Confirmation prompt failed: {}", e);
                false
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "breakeven=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = TradingConfig::load(&cli.config)?;
    config.apply_env_overrides();
    config.validate()?;

    let store = open_store(&config.store_url)
        .await
        .context("Failed to open trade store")?;

    match cli.command {
        Commands::List => list_trades(store.as_ref()).await,
        Commands::Close { id } => {
            store.remove(&id).await?;
            info!("Trade record {} removed", id);
            Ok(())
        }
        Commands::Open { side, size } => {
            if let Some(quantity) = size {
                config = config.with_size_override(quantity);
                config.validate()?;
            }
            let supervisor = build_supervisor(config, store)?;
            let record = match supervisor.open_trade(side, &StdinConfirmation).await {
                Err(TradeError::NotConfirmed) => return Ok(()),
                other => other.map_err(report)?,
            };
            supervisor
                .monitor(record)
                .run(shutdown_signal())
                .await
                .map_err(report)?;
            Ok(())
        }
        Commands::Resume { all } => {
            let supervisor = build_supervisor(config, store)?;
            if all {
                resume_all(&supervisor).await
            } else {
                let Some(record) = supervisor.latest_trade().await else {
                    info!("No stored trades to resume");
                    return Ok(());
                };
                supervisor
                    .monitor(record)
                    .run(shutdown_signal())
                    .await
                    .map_err(report)?;
                Ok(())
            }
        }
    }
}

fn build_supervisor(
    config: TradingConfig,
    store: Arc<dyn TradeStore>,
) -> anyhow::Result<TradeSupervisor> {
    let credentials = load_credentials().context("Exchange credentials are required")?;
    let limiter = create_rate_limiter(&config.rate_limiter_config());
    let timeout = Duration::from_millis(config.exchange.request_timeout_ms);

    let gateway = CoinDcxClient::new(
        CoinDcxConfig {
            api_base: config.exchange.api_base.clone(),
            credentials,
            request_timeout: timeout,
        },
        limiter.clone(),
    )?;
    let market_data = CoinDcxMarketData::new(&config.exchange.public_base, timeout, limiter)?;

    Ok(TradeSupervisor::new(
        config,
        Arc::new(gateway),
        Arc::new(market_data),
        store,
    ))
}

async fn list_trades(store: &dyn TradeStore) -> anyhow::Result<()> {
    let trades = store.list().await;
    if trades.is_empty() {
        println!("No stored trades");
        return Ok(());
    }
    for trade in &trades {
        println!("{}", describe(trade));
    }
    Ok(())
}

fn describe(trade: &TradeRecord) -> String {
    format!(
        "{}  {} {} {} @ {}  sl={}  tps={}  trigger={}  sl_moved={}",
        trade.id,
        trade.side,
        trade.qty,
        trade.symbol,
        trade.entry_price,
        trade.sl_order_id.as_deref().unwrap_or("-"),
        trade.tp_order_ids.len(),
        trade.monitor_trigger_level,
        trade.sl_moved
    )
}

/// One monitor task per stored trade, all stopped by the same signal
async fn resume_all(supervisor: &TradeSupervisor) -> anyhow::Result<()> {
    let trades = supervisor.all_trades().await;
    if trades.is_empty() {
        info!("No stored trades to resume");
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for record in trades {
        let monitor = supervisor.monitor(record);
        let mut stop_rx = stop_rx.clone();
        tasks.spawn(async move {
            monitor
                .run(async move {
                    while !*stop_rx.borrow() {
                        if stop_rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await
        });
    }
    info!("Monitoring {} trades. Press Ctrl+C to stop.", tasks.len());

    let signal = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let mut fatal = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(record)) => info!("Monitor for trade {} stopped", record.id),
            Ok(Err(e @ TradeError::PersistenceFailed { .. })) => {
                fatal.get_or_insert(report(e));
            }
            Ok(Err(e)) => {
                report(e);
            }
            Err(e) => error!("Monitor task failed: {}", e),
        }
    }
    signal.abort();

    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Log a trade error with its code and severity
fn report(e: TradeError) -> TradeError {
    error!(code = e.error_code(), severity = %e.severity(), "{}", e);
    e
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
