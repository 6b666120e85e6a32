#![allow(clippy::uninlined_format_args)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use meeting_stt::blobstore::StorageGateway;
use meeting_stt::pipeline::{Pipeline, Scheduler};
use meeting_stt::provider::TingwuClient;
use meeting_stt::storage::task::sqlite::SqliteTaskStorage;
use meeting_stt::utils::logger;
use meeting_stt::{
    AppContext, BUCKET, GATEWAY_URL, PROVIDER_API_KEY, PROVIDER_APP_KEY, PROVIDER_URL, REGION,
    SQLITE_PATH,
};

#[tokio::main]
async fn main() -> Result<()> {
    meeting_stt::init_env();
    let _guard = logger::init("./logs".to_string())?;

    info!("Starting meeting transcription service...");

    info!("Initializing Storage...");
    let storage = Arc::new(SqliteTaskStorage::new(&SQLITE_PATH).await?);

    info!("Initializing adapters...");
    let blobs = Arc::new(StorageGateway::new(GATEWAY_URL.clone(), BUCKET.clone())?);
    let provider = Arc::new(TingwuClient::new(
        PROVIDER_URL.clone(),
        PROVIDER_APP_KEY.clone(),
        PROVIDER_API_KEY.clone(),
    )?);

    let pipeline = Arc::new(Pipeline::new(storage, blobs, provider, REGION.clone()));
    let ctx = Arc::new(AppContext {
        pipeline: pipeline.clone(),
    });

    info!("Starting scheduler...");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(pipeline);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    info!("Starting HTTP server at http://{}", addr);

    match meeting_stt::web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;

    Ok(())
}
