use anyhow::{bail, Context};
use candlebot::config::Settings;
use candlebot::execution::{read_ticks_jsonl, SyntheticFeed};
use candlebot::{Engine, PaperExchange, Tick, Timeframe};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "candlebot", about = "Candle strategies on a live tick stream")]
struct Cli {
    /// TOML settings file. Defaults to ./candlebot.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade the configured activations on a synthetic tick stream.
    Run {
        /// Number of ticks per symbol.
        #[arg(long, default_value_t = 5_000)]
        ticks: usize,

        /// Seed of the random walk.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Simulated milliseconds between ticks.
        #[arg(long, default_value_t = 1_000)]
        tick_ms: i64,
    },
    /// Replay recorded ticks (one JSON object per line).
    Replay {
        #[arg(long)]
        file: PathBuf,
    },
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    setup_logging(&settings.log_filter);

    tracing::info!("🚀 candlebot starting");

    if settings.activations.is_empty() {
        bail!("No activations configured; add [[activations]] to candlebot.toml");
    }

    let ticks = match cli.command {
        Commands::Run { ticks, seed, tick_ms } => {
            TickSource::Synthetic { ticks, seed, tick_ms }
        }
        Commands::Replay { file } => {
            let ticks = read_ticks_jsonl(&file)
                .with_context(|| format!("reading ticks from {}", file.display()))?;
            if ticks.is_empty() {
                bail!("{} holds no ticks", file.display());
            }
            // Recorded ticks are old by definition
            settings.stale_tick_threshold_ms = i64::MAX;
            TickSource::Replay(ticks)
        }
    };

    let exchange = Arc::new(settings.paper.build_exchange());
    let mut feeds = seed_history(&settings, &exchange, &ticks);

    let engine = Engine::new(exchange.clone(), settings.engine());
    let mut started = Vec::new();
    for config in settings.activations.clone() {
        match engine.activate(config).await {
            Ok(id) => started.push(id),
            Err(e) => tracing::error!("Activation refused: {}", e),
        }
    }
    print_logs(&engine);

    if started.is_empty() {
        bail!("No activation could be started");
    }

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Market: {:?}", settings.paper.market);
    tracing::info!("  Activations: {}", started.len());
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let streaming = stream_ticks(&engine, &exchange, &mut feeds, ticks);
    tokio::select! {
        _ = streaming => {
            tracing::info!("✅ Tick stream finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
    }

    engine.flush().await;
    print_logs(&engine);

    for id in &started {
        let config = engine.config(*id)?;
        let summary = engine.performance(*id)?;
        summary.log_summary(&format!(
            "{} {} {}",
            config.strategy, config.symbol, config.timeframe
        ));
    }

    engine.shutdown().await;
    print_logs(&engine);

    tracing::info!("👋 candlebot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

enum TickSource {
    Synthetic { ticks: usize, seed: u64, tick_ms: i64 },
    Replay(Vec<Tick>),
}

/// Serve synthetic history for every configured (symbol, timeframe)
///
/// For synthetic runs this also returns one feed per symbol, continuing the
/// walk from where the history ends.
fn seed_history(
    settings: &Settings,
    exchange: &PaperExchange,
    source: &TickSource,
) -> Vec<SyntheticFeed> {
    let mut timeframes: BTreeMap<String, Vec<Timeframe>> = BTreeMap::new();
    for activation in &settings.activations {
        let tfs = timeframes.entry(activation.symbol.clone()).or_default();
        if !tfs.contains(&activation.timeframe) {
            tfs.push(activation.timeframe);
        }
    }

    let mut feeds = Vec::new();
    for (i, (symbol, tfs)) in timeframes.into_iter().enumerate() {
        let (seed, tick_ms, start_ms, start_price) = match source {
            TickSource::Synthetic { seed, tick_ms, .. } => (
                seed.wrapping_add(i as u64),
                *tick_ms,
                Utc::now().timestamp_millis(),
                settings.paper.start_price,
            ),
            TickSource::Replay(ticks) => match ticks.iter().find(|t| t.symbol == symbol) {
                Some(first) => (i as u64, 1_000, first.timestamp_ms, first.price),
                None => {
                    tracing::warn!(symbol = %symbol, "No recorded ticks for symbol");
                    continue;
                }
            },
        };

        let mut feed = SyntheticFeed::new(seed, symbol.clone(), start_price, start_ms, tick_ms);
        for timeframe in tfs {
            let history = feed.history(settings.paper.history_candles, timeframe, start_ms);
            exchange.set_history(&symbol, timeframe, history);
        }
        feeds.push(feed);
    }
    feeds
}

// ============================================================================
// Tick Loop
// ============================================================================

async fn stream_ticks(
    engine: &Engine,
    exchange: &PaperExchange,
    feeds: &mut [SyntheticFeed],
    source: TickSource,
) {
    match source {
        TickSource::Synthetic { ticks, .. } => {
            for i in 0..ticks {
                for feed in feeds.iter_mut() {
                    deliver(engine, exchange, feed.next_tick()).await;
                }
                if i % 500 == 0 {
                    print_logs(engine);
                }
            }
        }
        TickSource::Replay(ticks) => {
            for (i, tick) in ticks.into_iter().enumerate() {
                deliver(engine, exchange, tick).await;
                if i % 500 == 0 {
                    print_logs(engine);
                }
            }
        }
    }
}

/// Mark the paper price, hand the tick over and wait until it is processed
async fn deliver(engine: &Engine, exchange: &PaperExchange, tick: Tick) {
    exchange.mark_price(&tick.symbol, tick.price);
    engine.dispatch_tick(tick).await;
    engine.flush().await;
}

fn print_logs(engine: &Engine) {
    for entry in engine.drain_logs() {
        println!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry.message);
    }
}
