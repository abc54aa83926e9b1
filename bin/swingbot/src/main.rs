use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Broker, Config};
use engine::{
    spawn_fill_monitor, Clock, CycleContext, Engine, ScanScheduler, ScanStore, SystemClock,
    Trader,
};
use paper::PaperBroker;
use strategy::{SignalPipeline, Strategy, StrategyFileConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment config")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .context("loading strategy config")?;
    for warning in strategy_file.strategy.warnings() {
        warn!("Strategy config: {warning}");
    }
    let pipeline = SignalPipeline::new(strategy_file.strategy.clone());

    // ── Paper broker ──────────────────────────────────────────────────────────
    let broker = Arc::new(
        PaperBroker::from_csv_dir(&cfg.paper_data_dir, cfg.paper_account_id.clone(), cfg.paper_funds)
            .with_context(|| format!("loading bars from {}", cfg.paper_data_dir.display()))?,
    );

    // `swingbot events SYM...` prints historical transitions and exits.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("events") {
        print_events(&pipeline, broker.as_ref(), &args[1..]).await?;
        return Ok(());
    }

    info!(
        account = %cfg.paper_account_id,
        strategy = pipeline.name(),
        chunk_size = cfg.scan.chunk_size,
        "SwingBot starting"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqlitePoolOptions::new()
        .connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    let store = ScanStore::new(db);
    store.migrate().await.context("running database migrations")?;
    info!("Database ready");

    // ── Scan state ────────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let resumed = store.load(clock.today()).await?;
    let ctx = CycleContext::new(ScanScheduler::new(cfg.scan.chunk_size, resumed));

    // ── Engine ────────────────────────────────────────────────────────────────
    let fill_monitor = spawn_fill_monitor(broker.as_ref(), store.clone());
    let trader = Trader::new(
        broker.clone(),
        broker.clone(),
        Box::new(pipeline),
        store,
        cfg.scan.clone(),
        strategy_file.strategy.account_capital,
    );
    let engine = Engine::new(trader, ctx, clock);

    let outcome = tokio::select! {
        result = engine.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    fill_monitor.abort();
    broker.disconnect().await;

    if let Err(e) = outcome {
        error!(error = %e, "SwingBot halted");
        return Err(e.into());
    }
    info!("SwingBot stopped");
    Ok(())
}

async fn print_events(
    pipeline: &SignalPipeline,
    broker: &PaperBroker,
    symbols: &[String],
) -> anyhow::Result<()> {
    broker.connect().await?;
    for symbol in symbols {
        let bars = broker.fetch_bars(symbol, pipeline.lookback_days()).await?;
        for event in pipeline.historical_events(symbol, &bars) {
            println!("{symbol}\t{}\t{}\t{:.2}", event.date, event.action, event.close);
        }
    }
    Ok(())
}
