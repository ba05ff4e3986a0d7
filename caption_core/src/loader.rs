use std::sync::{Arc, Mutex, RwLock};

use crate::model::{CaptionConfig, CaptionModel};

/// One-time, fallible, thread-safe initialization of a shared resource.
///
/// Fast path: a read lock on the published slot. Cold path: callers
/// serialize behind the init mutex and re-check the slot inside it, so at
/// most one construction runs no matter how many callers race. If the
/// constructor fails the slot stays empty and the next caller retries the
/// full load.
pub struct SharedLoader<T> {
    slot: RwLock<Option<Arc<T>>>,
    init: Mutex<()>,
}

impl<T> Default for SharedLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedLoader<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// Cheap unlocked probe for the warm path.
    pub fn is_loaded(&self) -> bool {
        self.slot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().ok().and_then(|s| s.clone())
    }

    /// Return the shared value, constructing it exactly once on first use.
    pub fn get_or_try_init<F>(&self, construct: F) -> anyhow::Result<Arc<T>>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        if let Some(v) = self.get() {
            return Ok(v);
        }

        let _guard = self
            .init
            .lock()
            .map_err(|_| anyhow::anyhow!("loader init lock poisoned"))?;

        // Re-check inside the lock: another caller may have finished the
        // load while we were waiting.
        if let Some(v) = self.get() {
            return Ok(v);
        }

        let value = Arc::new(construct()?);
        *self
            .slot
            .write()
            .map_err(|_| anyhow::anyhow!("loader slot lock poisoned"))? = Some(value.clone());
        Ok(value)
    }
}

/// Lazily loaded captioning model, shared by all requests.
pub struct CaptionLoader {
    config: CaptionConfig,
    inner: SharedLoader<CaptionModel>,
}

impl CaptionLoader {
    pub fn new(config: CaptionConfig) -> Self {
        Self {
            config,
            inner: SharedLoader::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    /// Idempotent; safe to call from any number of concurrent requests.
    /// The first caller pays the full model load, everyone else either
    /// waits behind it (cold start) or returns immediately (warm).
    pub fn ensure_loaded(&self) -> anyhow::Result<Arc<CaptionModel>> {
        self.inner.get_or_try_init(|| {
            tracing::info!(
                model = %self.config.model_path.display(),
                "loading image captioning model"
            );
            CaptionModel::load(&self.config)
        })
    }
}
