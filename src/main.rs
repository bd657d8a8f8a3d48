use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use futures::FutureExt;
use prometheus_client::registry::Registry;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hn_relay_lib::{
    cache::ItemCache,
    cli::{parse_args, Cli, Mode},
    config::Config,
    db::{build_db_pool, run_migrations, ItemStore, PgItemStore},
    firebase_client::FirebaseClient,
    logging::{format_error_report, init_logging},
    queue::RedisItemQueue,
    relay::{pump_queue, Publisher, RelayService},
    rpc::{self, RpcItemStore},
    scheduler::run_on_schedule,
    server::{self, api_router, ops_router, register_metrics},
    state::AppState,
    sync_service::IngestService,
};

type BoxError = Box<dyn Error + Send + Sync>;

/// How long the queue pump waits before polling an empty queue again.
const QUEUE_IDLE_WAIT: Duration = Duration::from_millis(500);

/// Cancels `shutdown_token` when a SIGTERM or SIGINT signal is received.
async fn handle_shutdown_signals(shutdown_token: CancellationToken) {
    let mut sigterm =
        signal(SignalKind::terminate()).expect("Failed to register SIGTERM signal handler");
    let mut sigint =
        signal(SignalKind::interrupt()).expect("Failed to register SIGINT signal handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, shutting down");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, shutting down");
        }
    }

    shutdown_token.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = parse_args();
    init_logging("hn_relay", args.mode.as_str(), "info");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                event = "fatal_error",
                report = %format_error_report(err.as_ref()),
                "hn_relay exited with an error"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<(), BoxError> {
    let config = Config::from_env()?;
    let shutdown_token = CancellationToken::new();
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(shutdown_token.clone()));

    if args.mode.needs_database() {
        let db_url = config.require_db_url()?.to_string();
        tokio::task::spawn_blocking(move || run_migrations(&db_url)).await??;
        info!(event = "migrations_applied", "database migrations applied");
    }

    let result = match args.mode {
        Mode::Ingest => run_ingest(&config, args.once, &shutdown_token).await,
        Mode::Publish => run_publish(&config, args.once, &shutdown_token).await,
        Mode::Relay => run_relay(&config, &shutdown_token).await,
        Mode::Rpc | Mode::Api => run_storage_server(&config, args.mode, &shutdown_token).await,
    };

    shutdown_token.cancel();
    shutdown_handle.abort();
    result
}

/// Serves health and metrics for the worker modes until shutdown.
async fn start_ops_server(
    config: &Config,
    shutdown_token: &CancellationToken,
) -> Result<tokio::task::JoinHandle<Result<(), std::io::Error>>, BoxError> {
    let registry = Arc::new(RwLock::new(<Registry>::default()));
    register_metrics(&registry).await;
    let (_, handle) = server::serve(
        ops_router(registry),
        config.metrics_addr,
        shutdown_token.clone(),
    )
    .await?;
    Ok(handle)
}

async fn run_ingest(
    config: &Config,
    once: bool,
    shutdown_token: &CancellationToken,
) -> Result<(), BoxError> {
    let pool = build_db_pool(config.require_db_url()?).await?;
    let store = Arc::new(PgItemStore::new(pool));
    let source = Arc::new(FirebaseClient::new(&config.hn_api_url, config.http_timeout)?);
    let service = Arc::new(IngestService::new(source, store, config.n_workers)?);
    let ops_handle = start_ops_server(config, shutdown_token).await?;

    if once {
        let summary = service.run(shutdown_token).await?;
        info!(
            event = "ingest_once_finished",
            persisted = summary.persisted,
            "single ingest run finished"
        );
    } else {
        let job_token = shutdown_token.clone();
        run_on_schedule(
            "ingest",
            &config.cron_schedule,
            move || {
                let service = service.clone();
                let cancel = job_token.clone();
                async move { service.run(&cancel).await.map(|_| ()) }.boxed()
            },
            shutdown_token,
        )
        .await?;
    }

    shutdown_token.cancel();
    ops_handle.await??;
    Ok(())
}

async fn run_publish(
    config: &Config,
    once: bool,
    shutdown_token: &CancellationToken,
) -> Result<(), BoxError> {
    let queue = Arc::new(RedisItemQueue::new(
        config.require_redis_url()?,
        &config.queue_name,
    )?);
    let source = Arc::new(FirebaseClient::new(&config.hn_api_url, config.http_timeout)?);
    let publisher = Arc::new(Publisher::new(source, queue));
    let ops_handle = start_ops_server(config, shutdown_token).await?;

    if once {
        let summary = publisher.run(shutdown_token).await?;
        info!(
            event = "publish_once_finished",
            published = summary.published,
            "single publish run finished"
        );
    } else {
        let job_token = shutdown_token.clone();
        run_on_schedule(
            "publish",
            &config.cron_schedule,
            move || {
                let publisher = publisher.clone();
                let cancel = job_token.clone();
                async move { publisher.run(&cancel).await.map(|_| ()) }.boxed()
            },
            shutdown_token,
        )
        .await?;
    }

    shutdown_token.cancel();
    ops_handle.await??;
    Ok(())
}

async fn run_relay(config: &Config, shutdown_token: &CancellationToken) -> Result<(), BoxError> {
    let queue = Arc::new(RedisItemQueue::new(
        config.require_redis_url()?,
        &config.queue_name,
    )?);
    let sink = Arc::new(RpcItemStore::new(&config.rpc_url, config.http_timeout)?);
    let relay = RelayService::new(sink, config.n_workers)?;
    let ops_handle = start_ops_server(config, shutdown_token).await?;

    let (sender, receiver) = flume::bounded(config.n_workers);
    let pump_handle = {
        let queue = queue.clone();
        let cancel = shutdown_token.clone();
        tokio::spawn(async move {
            pump_queue(queue.as_ref(), sender, &cancel, QUEUE_IDLE_WAIT).await
        })
    };

    let summary = relay.run(receiver).await;
    pump_handle.await?;
    info!(
        event = "relay_finished",
        relayed = summary.relayed,
        failures = summary.failures,
        "relay stopped"
    );

    shutdown_token.cancel();
    ops_handle.await??;
    Ok(())
}

/// Runs the rpc storage service or the public read API over Postgres behind the cache.
async fn run_storage_server(
    config: &Config,
    mode: Mode,
    shutdown_token: &CancellationToken,
) -> Result<(), BoxError> {
    let pool = build_db_pool(config.require_db_url()?).await?;
    let store: Arc<dyn ItemStore> = Arc::new(PgItemStore::new(pool));
    let cache = Arc::new(ItemCache::new(store.clone(), config.cache_ttl));
    let state = Arc::new(AppState::new(store, cache, shutdown_token.clone()));
    register_metrics(&state.registry).await;

    let (app, addr) = match mode {
        Mode::Rpc => (rpc::router(state.clone()), config.rpc_addr),
        _ => (api_router(state.clone()), config.api_addr),
    };
    let (_, handle) = server::serve(app, addr, state.shutdown_token.clone()).await?;
    handle.await??;
    Ok(())
}
