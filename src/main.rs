use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use log::{error, info, warn};
use tokio_cron_scheduler::{Job, JobScheduler};
use warp::Filter;

use rate_watch::config::AppConfig;
use rate_watch::handlers::AppState;
use rate_watch::routes;
use rate_watch::services::db::DbStore;
use rate_watch::services::rate_source::HttpDocumentSource;

async fn seed_store(store: &DbStore, config: &AppConfig) {
    if let Some(path) = &config.rate_history_csv {
        match File::open(path) {
            Ok(file) => {
                if let Err(e) = store.load_rate_history(file).await {
                    error!("Failed to load rate history from {}: {}", path, e);
                }
            }
            Err(e) => error!("Cannot open rate history file {}: {}", path, e),
        }
    }

    if let Some(path) = &config.clients_csv {
        match File::open(path) {
            Ok(file) => {
                if let Err(e) = store.load_clients(file).await {
                    error!("Failed to load clients from {}: {}", path, e);
                }
            }
            Err(e) => error!("Cannot open clients file {}: {}", path, e),
        }
    }
}

async fn schedule_ingestion(state: Arc<AppState<HttpDocumentSource>>) -> anyhow::Result<JobScheduler> {
    let cron = state.config.ingest_cron.clone();
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create scheduler: {:?}", e))?;

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            info!("Scheduled rate ingestion starting");
            match state.ingestor.current_rates(true).await {
                Ok(rates) => info!("Scheduled ingestion finished: {} quotes ({:?})", rates.quotes.len(), rates.freshness),
                Err(e) => warn!("Scheduled ingestion failed: {}", e),
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid INGEST_CRON {:?}: {:?}", cron, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("failed to add ingestion job: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start scheduler: {:?}", e))?;
    info!("Rate ingestion scheduled on {}", cron);
    Ok(scheduler)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env();
    info!("Using PORT: {}", config.port);

    let store = Arc::new(DbStore::new());
    seed_store(&store, &config).await;

    let source = HttpDocumentSource::new(config.rate_source_url.clone(), config.fetch_timeout)
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let state = Arc::new(AppState::new(config, store, source));

    let _scheduler = schedule_ingestion(state.clone())
        .await
        .context("scheduling rate ingestion")?;

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET"]);

    let api = routes::routes(state).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}
