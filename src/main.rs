use indexer_core::events::StreamEvent;
use indexer_core::types::OrderUpdateInfo;
use indexer_core::IndexerConfig;
use indexer_db::{DatabaseConfig, DatabasePool};
use indexer_feed::{
    FeedIngestor, OrderIntake, ProtocolTable, StreamClient, ORDER_INTAKE_QUEUE,
};
use indexer_metrics::{MetricsConfig, MetricsServer};
use indexer_processor::{
    CacheRecompute, OrderUpdatesByIdHandler, PgOrderStore, RedisSink, DERIVED_CACHE_QUEUE,
    ORDER_UPDATES_QUEUE,
};
use indexer_queue::{JobQueue, QueueBackend, QueueWorker, RedisQueueBackend, WorkerConfig};
use indexer_redis::{Coordinator, RedisConfig, RedisConnection, RedisCoordinator, RedisPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

const FEED_CHANNEL_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("indexer_feed=info".parse()?)
                .add_directive("indexer_queue=info".parse()?)
                .add_directive("indexer_processor=info".parse()?),
        )
        .init();

    info!("NFT order indexer starting...");

    let config = match IndexerConfig::load() {
        Ok(config) => {
            info!(
                chain_id = config.chain_id,
                chain_name = %config.chain_name,
                feed_enabled = config.feed.enabled,
                concurrency = config.queue.concurrency,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Postgres holds the orders and the order-event ledger
    let db_config = match DatabaseConfig::from_env() {
        Ok(db_config) => db_config,
        Err(e) => {
            error!(error = %e, "Invalid database configuration");
            std::process::exit(1);
        }
    };
    let db_pool = match DatabasePool::connect(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            std::process::exit(1);
        }
    };
    let db_pool = Arc::new(db_pool);

    // Redis backs the queues, locks, dedup markers and the pub/sub fan-out
    let redis = match RedisConnection::new(RedisConfig::from_env()).await {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            error!(error = %e, "Failed to connect to Redis");
            std::process::exit(1);
        }
    };
    info!("Redis connected");

    let coordinator: Arc<dyn Coordinator> = Arc::new(RedisCoordinator::new(redis.clone()));
    let publisher = Arc::new(RedisPublisher::new(redis.clone()));
    let sink = Arc::new(RedisSink::new(publisher, redis.clone()));
    let store = Arc::new(PgOrderStore::new(db_pool.clone()));

    let order_updates: JobQueue<OrderUpdateInfo> = JobQueue::new(Arc::new(
        RedisQueueBackend::new(redis.clone(), ORDER_UPDATES_QUEUE),
    ));
    let cache_recompute: JobQueue<CacheRecompute> = JobQueue::new(Arc::new(
        RedisQueueBackend::new(redis.clone(), DERIVED_CACHE_QUEUE),
    ));
    let order_intake: JobQueue<OrderIntake> = JobQueue::new(Arc::new(
        RedisQueueBackend::new(redis.clone(), ORDER_INTAKE_QUEUE),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received (Ctrl+C)");
        shutdown_signal.send(()).ok();
    });

    let mut tasks = JoinSet::new();

    let metrics_config = MetricsConfig::from_env();
    if metrics_config.enabled {
        match indexer_metrics::init() {
            Ok(handle) => {
                let server = MetricsServer::new(metrics_config, handle);
                let shutdown = shutdown_tx.subscribe();
                tasks.spawn(async move {
                    if let Err(e) = server.run(shutdown).await {
                        error!(error = %e, "Metrics server error");
                    }
                });
                info!("Metrics server started");
            }
            Err(e) => warn!(error = %e, "Failed to install metrics recorder, continuing without metrics"),
        }
    }

    let single_token_top_bids = std::env::var("SINGLE_TOKEN_TOP_BIDS")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);
    let handler = OrderUpdatesByIdHandler::new(
        store.clone(),
        store,
        Arc::new(cache_recompute),
        sink.clone(),
        sink.clone(),
        sink.clone(),
    )
    .with_single_token_top_bids(single_token_top_bids);

    let worker = QueueWorker::new(
        order_updates,
        Arc::new(handler),
        WorkerConfig::from(&config.queue),
    )
    .with_coordinator(coordinator.clone());
    let shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move { worker.run(shutdown).await });
    info!(queue = ORDER_UPDATES_QUEUE, "Order update worker started");

    if config.feed.enabled {
        match StreamClient::new(&config.feed) {
            Ok(client) => {
                let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(FEED_CHANNEL_CAPACITY);
                let ingestor = FeedIngestor::new(
                    &config.feed,
                    config.chain_name.clone(),
                    ProtocolTable::for_chain(config.chain_id),
                    coordinator.clone(),
                    Arc::new(order_intake.clone()),
                    sink.clone(),
                );

                let shutdown = shutdown_tx.subscribe();
                tasks.spawn(async move { client.run(events_tx, shutdown).await });
                let shutdown = shutdown_tx.subscribe();
                tasks.spawn(async move { ingestor.run(events_rx, shutdown).await });
                info!(chain = %config.chain_name, "Feed intake started");
            }
            Err(e) => {
                error!(error = %e, "Failed to configure feed client");
                std::process::exit(1);
            }
        }
    } else {
        warn!("Feed disabled, only processing order update triggers");
    }

    // The intake queue is consumed by the order-saving service; report its depth here
    let intake_backend = order_intake.backend().clone();
    let mut shutdown = shutdown_tx.subscribe();
    tasks.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => report_depth(intake_backend.as_ref()).await,
            }
        }
    });

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Task failed");
            shutdown_tx.send(()).ok();
        }
    }

    info!("Shutting down...");
    db_pool.close().await;
    info!("Database connections closed");

    info!("NFT order indexer shutdown complete");
    Ok(())
}

async fn report_depth(backend: &dyn QueueBackend) {
    match backend.counts().await {
        Ok(counts) => {
            indexer_metrics::gauges::set_queue_depth(
                backend.name(),
                counts.pending,
                counts.active,
                counts.parked,
            );
            info!(
                queue = backend.name(),
                pending = counts.pending,
                active = counts.active,
                parked = counts.parked,
                "Status"
            );
        }
        Err(e) => warn!(queue = backend.name(), error = %e, "Failed to read queue depth"),
    }
}
