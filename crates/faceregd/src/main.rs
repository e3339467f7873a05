use anyhow::{Context, Result};
use facereg_core::{FaceRegistry, IdentityStore, OnnxEmbedder};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceregd starting");

    let config = config::Config::load().context("loading configuration")?;
    tracing::info!(
        bind = %config.bind,
        db = %config.db_path.display(),
        model_dir = %config.model_dir.display(),
        model = %config.model,
        "configuration loaded"
    );

    // Load models synchronously so a missing file fails startup, not the first request.
    let embedder = OnnxEmbedder::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
    )
    .context("loading ONNX models")?;
    let registry = FaceRegistry::new(embedder, IdentityStore::new(&config.db_path), config.model);
    let engine = engine::spawn_engine(registry)?;

    let app = http::router(engine, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;

    tracing::info!(addr = %config.bind, "faceregd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("faceregd shutting down");
        })
        .await?;

    Ok(())
}
