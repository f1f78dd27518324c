//! autonomic-engine - Event-sourced autonomic business engine
//!
//! Wires the event store, bus, agent runtime, SOP registry, projections,
//! and HTTP/SSE surface together and serves them.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autonomic_engine::agents::{AgentRuntime, IntakeAgent, OversightAgent, SopExecutorAgent};
use autonomic_engine::api::{self, AppState};
use autonomic_engine::bus::{DistributedBridge, EventBus, PgNotifyBridge};
use autonomic_engine::db;
use autonomic_engine::event_store::{ApprovalStore, EventStore};
use autonomic_engine::jobs::JobScheduler;
use autonomic_engine::projection::{ClientHealthView, ProjectionEngine};
use autonomic_engine::sop::{FilesystemSopSource, SopRegistry};
use autonomic_engine::Config;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autonomic_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("starting autonomic engine");
    tracing::info!("connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("database schema is not complete, run migrations first");
        return Err(anyhow::anyhow!("database schema incomplete"));
    }
    tracing::info!("database connected successfully");

    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool.clone());
    let bus = EventBus::new(store.clone(), config.bus_history_size, config.processed_set_capacity);

    let sops = Arc::new(
        SopRegistry::load(Box::new(FilesystemSopSource::new(config.sop_definitions_dir.clone())))
            .await?,
    );
    tracing::info!(sop_count = sops.len(), "SOP registry loaded");

    let mut runtime = AgentRuntime::new(store.clone(), bus.clone(), approvals.clone());
    runtime.register(Arc::new(IntakeAgent::new(config.confidence_threshold))).await?;
    runtime
        .register(Arc::new(OversightAgent::new(config.confidence_threshold, config.financial_limit)))
        .await?;
    runtime.register(Arc::new(SopExecutorAgent::new(sops.clone()))).await?;
    let agent_names = vec!["intake".to_string(), "oversight".to_string(), "sop_executor".to_string()];

    let client_health = ProjectionEngine::new(ClientHealthView, store.clone(), bus.clone());
    client_health.initialize().await?;

    let sse = Arc::new(api::sse::SseBroadcaster::new());
    bus.subscribe(sse.clone());

    PgNotifyBridge::new(store.clone()).start(bus.clone()).await?;

    let job_scheduler = JobScheduler::new(approvals.clone(), store.clone(), bus.clone(), sops.clone());
    job_scheduler.start();

    let state = AppState {
        store,
        bus,
        approvals,
        sops,
        sse,
        rate_limiter: Arc::new(api::middleware::RateLimiter::new(config.rate_limit_per_minute)),
        agent_names,
    };

    let app = api::create_router(state);

    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutting down...");
    runtime.shutdown_all().await;
    pool.close().await;
    tracing::info!("database connections closed, goodbye");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown...");
        },
    }
}
