//! Common utilities for integration tests: stub pipeline implementations
//! and a router wired to temp directories.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::Router;
use server::{router, AppState, Captioner, LogBroadcaster, ServerConfig, SpeechSynth};
use tempfile::TempDir;

pub const STUB_CAPTION: &str = "a cat sitting on a mat";
pub const STUB_AUDIO_FILENAME: &str = "stub-audio.wav";

pub struct StubCaptioner {
    loaded: AtomicBool,
    pub caption_calls: AtomicUsize,
    caption: String,
    fail: bool,
}

impl StubCaptioner {
    pub fn new(caption: &str) -> Self {
        Self {
            loaded: AtomicBool::new(false),
            caption_calls: AtomicUsize::new(0),
            caption: caption.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }
}

impl Captioner for StubCaptioner {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn ensure_loaded(&self) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("model weights missing");
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn caption(&self, image: &Path) -> anyhow::Result<String> {
        self.ensure_loaded()?;
        self.caption_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(image.exists(), "uploaded image was not saved");
        Ok(self.caption.clone())
    }
}

pub struct StubSpeech {
    audio_dir: PathBuf,
}

impl SpeechSynth for StubSpeech {
    fn synthesize(&self, _text: &str) -> anyhow::Result<String> {
        std::fs::write(self.audio_dir.join(STUB_AUDIO_FILENAME), b"RIFF-stub-audio")?;
        Ok(STUB_AUDIO_FILENAME.to_string())
    }
}

pub struct TestApp {
    pub router: Router,
    pub logs: LogBroadcaster,
    pub captioner: Arc<StubCaptioner>,
    pub audio_dir: PathBuf,
    _tmp: TempDir,
}

pub fn create_test_app_with(captioner: StubCaptioner) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        upload_dir: tmp.path().join("images"),
        audio_dir: tmp.path().join("Sound"),
        ..ServerConfig::default()
    };
    config.ensure_dirs().unwrap();

    let logs = LogBroadcaster::new();
    let captioner = Arc::new(captioner);
    let speech = Arc::new(StubSpeech {
        audio_dir: config.audio_dir.clone(),
    });

    let state = AppState {
        captioner: captioner.clone(),
        speech,
        logs: logs.clone(),
        config: config.clone(),
    };

    TestApp {
        router: router(state),
        logs,
        captioner,
        audio_dir: config.audio_dir,
        _tmp: tmp,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(StubCaptioner::new(STUB_CAPTION))
}

const BOUNDARY: &str = "------------------------test0boundary";

/// Build a multipart/form-data body with a single file field. Returns the
/// content-type header value and the raw body.
pub fn multipart_upload(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; \
             name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// A few bytes that decode as a 1x1 PNG; enough for upload tests that never
/// reach a real model.
pub fn tiny_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
        0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
        0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x73, 0x75, 0x01,
        0x18, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}
