use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use caption_core::{CaptionConfig, CaptionLoader};
use server::{router, AppState, LogBroadcaster, ServerConfig};
use speech_core::SpeechSynthesizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting caption-to-speech server...");

    let config = ServerConfig::from_env();
    config.ensure_dirs()?;
    info!(
        "Server configuration loaded: port={}, upload_dir={}, audio_dir={}",
        config.port,
        config.upload_dir.display(),
        config.audio_dir.display()
    );

    // The captioning model is loaded lazily on the first upload; the Piper
    // voice is small enough to load up front.
    let captioner = Arc::new(CaptionLoader::new(CaptionConfig {
        model_path: config.caption_model.clone(),
        tokenizer_path: config.caption_tokenizer.clone(),
    }));

    info!("Loading speech voice...");
    let speech = Arc::new(SpeechSynthesizer::new(
        &config.voice_config,
        config.audio_dir.clone(),
    )?);
    info!("Voice ready at {} Hz", speech.sample_rate());

    let state = AppState {
        captioner,
        speech,
        logs: LogBroadcaster::new(),
        config: config.clone(),
    };

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .into_inner(),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
