//! Speech synthesis core: wraps a Piper voice and turns caption text into
//! WAV files on disk. The returned filename is the contract with the HTTP
//! layer's audio-serving endpoint.

mod wav;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};

pub struct SpeechSynthesizer {
    synth: RwLock<PiperSpeechSynthesizer>,
    sample_rate: u32,
    audio_dir: PathBuf,
}

impl SpeechSynthesizer {
    /// Load a Piper voice from its JSON config. The audio directory must
    /// already exist; generated files are never deleted here.
    pub fn new(voice_config: impl AsRef<Path>, audio_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let voice_config = voice_config.as_ref();
        let sample_rate = read_sample_rate(voice_config)?;
        let model = piper_rs::from_config_path(voice_config)
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;

        Ok(Self {
            synth: RwLock::new(synth),
            sample_rate,
            audio_dir: audio_dir.into(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Synthesize `text` into a freshly named WAV file in the audio
    /// directory and return the bare filename. The file exists by the time
    /// this returns; synthesis errors propagate unchanged.
    pub fn synthesize(&self, text: &str) -> anyhow::Result<String> {
        let synth = self
            .synth
            .read()
            .map_err(|_| anyhow::anyhow!("synthesizer lock poisoned"))?;

        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?
                    .into_vec(),
            );
        }

        let filename = fresh_filename();
        let path = self.audio_dir.join(&filename);
        wav::write_wav(&path, &samples, self.sample_rate)?;
        tracing::debug!(file = %path.display(), samples = samples.len(), "audio written");
        Ok(filename)
    }
}

/// Random opaque name; collisions are avoided probabilistically.
fn fresh_filename() -> String {
    format!("{}.wav", uuid::Uuid::new_v4().simple())
}

/// Read the sample rate from a Piper voice config JSON.
fn read_sample_rate(cfg_path: &Path) -> anyhow::Result<u32> {
    let text = fs::read_to_string(cfg_path)
        .with_context(|| format!("failed to read voice config {}", cfg_path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "voice config is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("missing or invalid 'audio.sample_rate' in voice config"))?;

    Ok(sample_rate as u32)
}
