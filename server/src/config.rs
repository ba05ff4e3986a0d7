// Configuration for the server, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub caption_model: PathBuf,
    pub caption_tokenizer: PathBuf,
    pub voice_config: PathBuf,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            upload_dir: PathBuf::from("images"),
            audio_dir: PathBuf::from("Sound"),
            caption_model: PathBuf::from("models/blip-image-captioning-base-q4k.gguf"),
            caption_tokenizer: PathBuf::from("models/tokenizer.json"),
            voice_config: PathBuf::from("models/en_US-amy-medium.onnx.json"),
            request_timeout_secs: 60,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let audio_dir = std::env::var("AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.audio_dir);

        let caption_model = std::env::var("CAPTION_MODEL")
            .map(PathBuf::from)
            .unwrap_or(defaults.caption_model);

        let caption_tokenizer = std::env::var("CAPTION_TOKENIZER")
            .map(PathBuf::from)
            .unwrap_or(defaults.caption_tokenizer);

        let voice_config = std::env::var("VOICE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or(defaults.voice_config);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        Self {
            port,
            upload_dir,
            audio_dir,
            caption_model,
            caption_tokenizer,
            voice_config,
            request_timeout_secs,
            max_upload_bytes,
        }
    }

    /// Create the upload and audio directories if they do not exist yet.
    /// They live on non-persistent storage in cloud deployments, so this
    /// runs on every process start.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.audio_dir)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
