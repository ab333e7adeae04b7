use std::sync::Arc;

use face_infernum::{InfernumEngine, SeetaFaceModel, config::ServerArgs, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();
    let config = args.into_config()?;

    let model = SeetaFaceModel::from_file(&config.model_path, config.detector)?;
    log::info!("Detector settings: {:?}", model.settings());
    let engine = Arc::new(InfernumEngine::with_workers(vec![model; config.workers]));

    let app = server::router(engine, config.max_upload_bytes);

    log::info!("🚀 Starting the server with {} detection worker(s)", config.workers);
    log::info!("🔥 Listening on: {}", config.addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
