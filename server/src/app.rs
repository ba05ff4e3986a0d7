//! Router, application state, and request handlers.

use std::convert::Infallible;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::sse::{Event, Sse},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use futures_core::Stream;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::logs::{Consumed, LogBroadcaster};
use crate::templates::{self, PipelineResult};
use crate::validation::validate_audio_filename;

/// Seam over the captioning core so the HTTP layer can be exercised with a
/// stub pipeline in tests.
pub trait Captioner: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn ensure_loaded(&self) -> anyhow::Result<()>;
    fn caption(&self, image: &FsPath) -> anyhow::Result<String>;
}

impl Captioner for caption_core::CaptionLoader {
    fn is_loaded(&self) -> bool {
        caption_core::CaptionLoader::is_loaded(self)
    }

    fn ensure_loaded(&self) -> anyhow::Result<()> {
        caption_core::CaptionLoader::ensure_loaded(self).map(|_| ())
    }

    fn caption(&self, image: &FsPath) -> anyhow::Result<String> {
        caption_core::CaptionLoader::ensure_loaded(self)?.caption(image)
    }
}

pub trait SpeechSynth: Send + Sync {
    /// Synthesize `text` into the audio directory and return the filename.
    fn synthesize(&self, text: &str) -> anyhow::Result<String>;
}

impl SpeechSynth for speech_core::SpeechSynthesizer {
    fn synthesize(&self, text: &str) -> anyhow::Result<String> {
        speech_core::SpeechSynthesizer::synthesize(self, text)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub captioner: Arc<dyn Captioner>,
    pub speech: Arc<dyn SpeechSynth>,
    pub logs: LogBroadcaster,
    pub config: ServerConfig,
}

/// How long a `/logs` consumer waits before emitting a keep-alive comment.
const LOG_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub fn router(state: AppState) -> Router {
    // The request timeout stays off /logs: that stream is long-lived by
    // design and only ends when the client disconnects.
    let limited = Router::new()
        .route("/", get(index_page).post(upload_image))
        .route("/get_audio/{filename}", get(get_audio))
        .route("/health", get(health_check))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .merge(limited)
        .route("/logs", get(stream_logs))
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn index_page() -> Html<String> {
    Html(templates::index_page(None))
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, ApiError> {
    let mut saved: Option<PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("failed to read multipart body: {e}")))?
    {
        if field.name() != Some("imagefile") {
            continue;
        }
        if field.file_name().map_or(true, str::is_empty) {
            break;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("failed to read uploaded file: {e}")))?;

        let path = state
            .config
            .upload_dir
            .join(format!("{}.jpg", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ApiError::Pipeline(anyhow!("failed to save upload: {e}")))?;
        saved = Some(path);
        break;
    }

    let Some(image_path) = saved else {
        return Err(ApiError::InvalidInput("No image uploaded".to_string()));
    };

    let captioner = state.captioner.clone();
    let speech = state.speech.clone();
    let logs = state.logs.clone();

    // Model load, caption decode and synthesis are all CPU-bound.
    let result = tokio::task::spawn_blocking(move || {
        run_pipeline(captioner.as_ref(), speech.as_ref(), &logs, &image_path)
    })
    .await
    .map_err(|e| ApiError::Pipeline(anyhow!("task join error: {e}")))??;

    Ok(Html(templates::index_page(Some(&result))))
}

/// The per-request pipeline: ensure the model is loaded, caption the image,
/// synthesize the caption. Progress goes to the log broadcaster; any error
/// is published there too before it propagates.
fn run_pipeline(
    captioner: &dyn Captioner,
    speech: &dyn SpeechSynth,
    logs: &LogBroadcaster,
    image_path: &FsPath,
) -> anyhow::Result<PipelineResult> {
    let outcome = (|| {
        logs.publish("📥 Image received");

        if !captioner.is_loaded() {
            logs.publish("🔄 Loading image captioning model...");
            captioner.ensure_loaded()?;
            logs.publish("✅ Model loaded successfully");
        }

        logs.publish("🖼️ Preprocessing image");
        logs.publish("🤖 Generating caption");
        let caption = captioner.caption(image_path)?;
        logs.publish(format!("📝 Caption generated: {caption}"));

        logs.publish("🔊 Generating audio");
        let audio_filename = speech.synthesize(&caption)?;
        logs.publish("✅ Audio generated successfully");

        Ok(PipelineResult {
            caption,
            audio_filename,
        })
    })();

    if let Err(e) = &outcome {
        logs.publish(format!("❌ Error in prediction: {e}"));
    }
    outcome
}

pub async fn get_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    validate_audio_filename(&filename)?;

    let path = state.config.audio_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Audio file not found".to_string()));
        }
        Err(e) => return Err(ApiError::Pipeline(anyhow!("failed to read audio file: {e}"))),
    };

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response())
}

/// Long-lived event stream of status messages. Drains the shared log queue
/// with a short timeout; idle periods emit a comment line so proxies keep
/// the connection open. Terminates only when the client disconnects, which
/// drops the stream.
pub async fn stream_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let logs = state.logs.clone();
    let stream = async_stream::stream! {
        loop {
            match logs.consume(LOG_POLL_TIMEOUT).await {
                Consumed::Message(message) => {
                    yield Ok(Event::default().data(message));
                }
                Consumed::TimedOut => {
                    yield Ok(Event::default().comment(""));
                }
                Consumed::Closed => break,
            }
        }
    };
    Sse::new(stream)
}
