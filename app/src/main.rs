#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Atlas - Composition Root
//!
//! Wires every subsystem crate into one running process (`spec.md` §6):
//! loads configuration and runs the production/readiness startup gate,
//! connects and migrates the database, builds one adapter per active
//! `UserBroker`, and spawns the per-symbol ingest tasks and the polling
//! loops that drive signal generation, risk validation, order placement,
//! exit detection, and broker reconciliation.

mod config;
mod error;
mod tick_fanout;

use std::sync::Arc;
use std::time::Duration;

use atlas_broker::mock::{MockDataBroker, PaperOrderBroker};
use atlas_broker::{BrokerRegistry, DataBroker, OrderBroker, UserBrokerHandle};
use atlas_core::{bounded, Environment, Symbol};
use atlas_exits::{ExitConfig, ExitSignalService};
use atlas_execution::ExecutionOrchestrator;
use atlas_marketdata::{IngestTask, MarketDataCache};
use atlas_persistence::{Database, Repositories, VersionedRepository};
use atlas_reconcile::{ExitOrderReconciler, PendingOrderReconciler};
use atlas_risk::{RiskConfig, ValidationService};
use atlas_signals::{MtfConfig, MtfConfigResolver, MtfSignalGenerator};
use atlas_sms::{SignalManagementService, SmsEvent};
use atlas_tms::TradeManagementService;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::config::{AppConfig, RunMode};
use crate::error::AtlasError;
use crate::tick_fanout::TickFanout;

/// Capacity of every droppable telemetry event queue (`spec.md` §5).
const EVENT_QUEUE_CAPACITY: usize = 4096;

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_secs(5);
const EXECUTION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const EXIT_RECONCILE_INTERVAL: Duration = Duration::from_secs(20);
const ENTRY_ORDER_RECONCILE_INTERVAL: Duration = Duration::from_secs(15);
const EXIT_ORDER_RECONCILE_INTERVAL: Duration = Duration::from_secs(15);
/// Staggered against `ENTRY_ORDER_RECONCILE_INTERVAL` so the two sweeps
/// don't contend for the same per-broker rate limiter at the same instant
/// (`spec.md` §4.10).
const EXIT_ORDER_RECONCILE_OFFSET: Duration = Duration::from_secs(7);

#[tokio::main]
async fn main() -> Result<(), AtlasError> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    config.check_production_gate()?;
    config.check_release_readiness()?;

    if config.production_mode {
        atlas_core::logging::init_json_logging();
    } else {
        atlas_core::logging::init_logging();
    }
    tracing::info!(run_mode = ?config.run_mode, production_mode = config.production_mode, "atlas starting");

    let db = Database::connect(&config.db_url, config.db_pool_size).await?;
    db.migrate().await?;
    let repos = Repositories::new(db.pool.clone());

    let registry = Arc::new(BrokerRegistry::new());
    connect_data_brokers(&repos, &registry).await?;
    connect_order_brokers(&repos, &registry).await?;

    let (tick_writer, mut tick_drain) = bounded::<atlas_marketdata::TickEvent>(EVENT_QUEUE_CAPACITY);
    let (sms_writer, mut sms_drain) = bounded::<SmsEvent>(EVENT_QUEUE_CAPACITY);
    let (tms_writer, mut tms_drain) = bounded::<atlas_tms::TmsEvent>(EVENT_QUEUE_CAPACITY);
    let (execution_writer, mut execution_drain) = bounded::<atlas_execution::ExecutionEvent>(EVENT_QUEUE_CAPACITY);
    let (exits_writer, mut exits_drain) = bounded::<atlas_exits::ExitsEvent>(EVENT_QUEUE_CAPACITY);

    tokio::spawn(async move { while let Some(event) = tick_drain.recv().await { tracing::debug!(?event, "tick event"); } });
    tokio::spawn(async move { while let Some(event) = tms_drain.recv().await { tracing::info!(?event, "tms event"); } });
    tokio::spawn(async move { while let Some(event) = execution_drain.recv().await { tracing::info!(?event, "execution event"); } });
    tokio::spawn(async move { while let Some(event) = exits_drain.recv().await { tracing::info!(?event, "exits event"); } });

    let sms = SignalManagementService::new(
        repos.signals.clone(),
        repos.signal_deliveries.clone(),
        repos.exit_signals.clone(),
        repos.exit_intents.clone(),
        repos.user_brokers.clone(),
        sms_writer,
    );
    let sms_arc = Arc::new(sms.clone());
    let tms = TradeManagementService::new(repos.trades.clone(), tms_writer);
    let cache = Arc::new(MarketDataCache::new());

    let watchlist = repos.watchlist.all_active().await?;
    tracing::info!(symbols = watchlist.len(), "loaded active watchlist");

    if config.run_mode == RunMode::Full {
        let risk = ValidationService::new(repos.clone(), sms_arc.clone(), RiskConfig::default());
        let execution = ExecutionOrchestrator::new(repos.clone(), registry.clone(), tms.clone(), execution_writer);
        let exits = Arc::new(ExitSignalService::new(
            repos.clone(),
            sms.clone(),
            tms.clone(),
            registry.clone(),
            exits_writer,
            ExitConfig::default(),
        ));
        let entry_reconciler = PendingOrderReconciler::new(repos.clone(), registry.clone(), tms.clone());
        let exit_reconciler = ExitOrderReconciler::new(repos.clone(), registry.clone(), tms.clone());

        spawn_ingest(&repos, &registry, &cache, &watchlist, exits.clone(), tick_writer).await?;
        spawn_signal_generator(repos.candles.clone(), cache.clone(), sms_arc.clone(), &watchlist);
        spawn_sms_consumer(sms_drain, risk);
        spawn_execution_loop(execution);
        spawn_exit_reconcile_loop(exits);
        spawn_entry_order_reconciler(entry_reconciler);
        spawn_exit_order_reconciler(exit_reconciler);
    } else {
        tracing::info!("RUN_MODE=FEED_COLLECTOR: only tick ingestion and candle building are active");
        let (exit_sender, exit_receiver) = mpsc::unbounded_channel();
        drop(exit_receiver);
        spawn_ingest_only(&repos, &registry, &cache, &watchlist, exit_sender, tick_writer).await?;
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    Ok(())
}

async fn connect_data_brokers(repos: &Repositories, registry: &Arc<BrokerRegistry>) -> Result<(), AtlasError> {
    for user_broker in repos.user_brokers.find_all_active_data_brokers().await? {
        let handle = build_handle(repos, &user_broker).await?;
        let adapter: Arc<dyn DataBroker> = Arc::new(MockDataBroker::new());
        adapter.connect(&handle).await?;
        registry.register_data_broker(user_broker.user_broker_id, adapter);
        tracing::info!(user_broker_id = %user_broker.user_broker_id, "registered DATA broker adapter");
    }
    Ok(())
}

async fn connect_order_brokers(repos: &Repositories, registry: &Arc<BrokerRegistry>) -> Result<(), AtlasError> {
    for user_broker in repos.user_brokers.find_all_active_exec_brokers().await? {
        let handle = build_handle(repos, &user_broker).await?;
        let adapter: Arc<dyn OrderBroker> = Arc::new(PaperOrderBroker::new(Decimal::ZERO));
        adapter.connect(&handle).await?;
        registry.register_order_broker(user_broker.user_broker_id, adapter);
        tracing::info!(user_broker_id = %user_broker.user_broker_id, "registered EXEC broker adapter");
    }
    Ok(())
}

async fn build_handle(
    repos: &Repositories,
    user_broker: &atlas_persistence::model::UserBrokerRow,
) -> Result<UserBrokerHandle, AtlasError> {
    let broker = repos
        .brokers
        .find_active_by_id(&user_broker.broker_id.to_string())
        .await?
        .ok_or_else(|| AtlasError::Config(format!("broker {} not found", user_broker.broker_id)))?;
    let access_token = repos
        .user_broker_sessions
        .find_active_for_user_broker(&user_broker.user_broker_id.to_string())
        .await?
        .map(|session| session.access_token)
        .unwrap_or_default();

    Ok(UserBrokerHandle {
        user_broker_id: user_broker.user_broker_id,
        broker_code: broker.broker_code,
        environment: Environment::from(user_broker.environment),
        access_token,
    })
}

/// Spawns one [`IngestTask`] per watchlist row, wires each into the shared
/// [`TickFanout`] per `UserBroker`, then registers the fan-out listener with
/// that broker's adapter via `sync_subscriptions`.
async fn spawn_ingest(
    repos: &Repositories,
    registry: &Arc<BrokerRegistry>,
    cache: &Arc<MarketDataCache>,
    watchlist: &[atlas_persistence::model::WatchlistRow],
    exits: Arc<ExitSignalService>,
    tick_writer: atlas_core::EventWriter<atlas_marketdata::TickEvent>,
) -> Result<(), AtlasError> {
    use std::collections::HashMap;
    let mut by_broker: HashMap<atlas_core::UserBrokerId, Vec<&atlas_persistence::model::WatchlistRow>> = HashMap::new();
    for row in watchlist {
        by_broker.entry(row.user_broker_id).or_default().push(row);
    }

    for (user_broker_id, rows) in by_broker {
        let (exit_sender, exit_receiver) = mpsc::unbounded_channel();
        let fanout = Arc::new(TickFanout::new(exit_sender));
        tokio::spawn(crate::tick_fanout::run_exit_tick_drain(exit_receiver, exits.clone()));

        let mut symbols = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol = row.symbol();
            let (mut task, channel) = IngestTask::new(symbol.clone(), cache.clone(), repos.candles.clone(), tick_writer.clone());
            fanout.register_ingest_channel(symbol.clone(), channel);
            tokio::spawn(async move { task.run().await });
            symbols.push(symbol);
        }

        registry
            .sync_subscriptions(user_broker_id, &symbols, fanout)
            .await
            .map_err(AtlasError::DataBroker)?;
    }
    Ok(())
}

/// `RUN_MODE=FEED_COLLECTOR`: ingest only, no exit/signal/risk wiring.
async fn spawn_ingest_only(
    repos: &Repositories,
    registry: &Arc<BrokerRegistry>,
    cache: &Arc<MarketDataCache>,
    watchlist: &[atlas_persistence::model::WatchlistRow],
    exit_sender: mpsc::UnboundedSender<atlas_broker::Tick>,
    tick_writer: atlas_core::EventWriter<atlas_marketdata::TickEvent>,
) -> Result<(), AtlasError> {
    use std::collections::HashMap;
    let mut by_broker: HashMap<atlas_core::UserBrokerId, Vec<&atlas_persistence::model::WatchlistRow>> = HashMap::new();
    for row in watchlist {
        by_broker.entry(row.user_broker_id).or_default().push(row);
    }

    for (user_broker_id, rows) in by_broker {
        let fanout = Arc::new(TickFanout::new(exit_sender.clone()));
        let mut symbols = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol = row.symbol();
            let (mut task, channel) = IngestTask::new(symbol.clone(), cache.clone(), repos.candles.clone(), tick_writer.clone());
            fanout.register_ingest_channel(symbol.clone(), channel);
            tokio::spawn(async move { task.run().await });
            symbols.push(symbol);
        }
        registry
            .sync_subscriptions(user_broker_id, &symbols, fanout)
            .await
            .map_err(AtlasError::DataBroker)?;
    }
    Ok(())
}

fn spawn_signal_generator(
    candles: atlas_persistence::repo::CandleRepo,
    cache: Arc<MarketDataCache>,
    sms: Arc<SignalManagementService>,
    watchlist: &[atlas_persistence::model::WatchlistRow],
) {
    let symbols: Vec<Symbol> = watchlist.iter().map(|row| row.symbol()).collect();
    let mut generator = MtfSignalGenerator::new(candles, cache, MtfConfigResolver::new(MtfConfig::default()), sms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SIGNAL_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            for symbol in &symbols {
                if let Err(err) = generator.poll_symbol(symbol).await {
                    tracing::error!(%symbol, error = %err, "signal generation failed");
                }
            }
        }
    });
}

/// Consumes `DeliveryCreated` events to trigger risk validation, rather than
/// polling `signal_deliveries` — the event already carries the id SMS just
/// assigned (`spec.md` §4.5/§4.6 handoff).
fn spawn_sms_consumer(mut sms_drain: atlas_core::EventDrain<SmsEvent>, risk: ValidationService) {
    tokio::spawn(async move {
        while let Some(event) = sms_drain.recv().await {
            if let SmsEvent::DeliveryCreated { delivery_id, .. } = event {
                if let Err(err) = risk.validate_delivery(delivery_id).await {
                    tracing::error!(%delivery_id, error = %err, "delivery validation failed");
                }
            } else {
                tracing::debug!(?event, "sms event");
            }
        }
    });
}

fn spawn_execution_loop(execution: ExecutionOrchestrator) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EXECUTION_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = execution.poll_once().await {
                tracing::error!(error = %err, "execution poll cycle failed");
            }
        }
    });
}

/// Follows up on SMS's own `exit_intents`/`exit_signals` rows once an exit
/// order has reached the broker (`ExitSignalService::reconcile_placed_exits`,
/// distinct from [`ExitOrderReconciler`] which reconciles the `orders` row).
fn spawn_exit_reconcile_loop(exits: Arc<ExitSignalService>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EXIT_RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = exits.reconcile_placed_exits().await {
                tracing::error!(error = %err, "exit intent reconciliation failed");
            }
        }
    });
}

fn spawn_entry_order_reconciler(reconciler: PendingOrderReconciler) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ENTRY_ORDER_RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = reconciler.reconcile_once().await {
                tracing::error!(error = %err, "entry order reconciliation failed");
            }
        }
    });
}

fn spawn_exit_order_reconciler(reconciler: ExitOrderReconciler) {
    tokio::spawn(async move {
        tokio::time::sleep(EXIT_ORDER_RECONCILE_OFFSET).await;
        let mut ticker = tokio::time::interval(EXIT_ORDER_RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = reconciler.reconcile_once().await {
                tracing::error!(error = %err, "exit order reconciliation failed");
            }
        }
    });
}
