//! Process-wide model cache with load-once semantics.
//!
//! The cache owns every loaded model and its label metadata. A model URL is
//! fetched at most once per process: the first `acquire` performs the load,
//! concurrent callers for the same URL block on the same in-flight
//! initialization, and later callers get the cached handle without network
//! I/O. A failed load leaves no entry behind, so the caller may retry by
//! calling `acquire` again; the cache itself never retries.

use crate::core::errors::ClassificationError;
use crate::core::model::{LabelMetadata, LoadedModel, ModelRuntime, OrtRuntime};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Connection timeout for remote fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall request timeout for remote fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fetches the remote resources behind the configured URLs.
///
/// The seam between the cache and the network: production code uses
/// [`HttpFetcher`], tests substitute an in-memory implementation.
pub trait ModelFetcher: Send + Sync {
    /// Fetches and parses the model at `url` into a prediction runtime.
    fn fetch_model(&self, url: &str) -> Result<Box<dyn ModelRuntime>, ClassificationError>;

    /// Fetches and parses the label metadata at `url`.
    fn fetch_metadata(&self, url: &str) -> Result<LabelMetadata, ClassificationError>;
}

/// HTTP implementation of [`ModelFetcher`].
#[derive(Debug)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Creates a fetcher with connect and request timeouts configured.
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self { agent }
    }

    fn get_response(&self, url: &str) -> Result<ureq::Response, FetchFailure> {
        match self.agent.get(url).call() {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(status, _)) => {
                Err(FetchFailure::Message(format!("server returned status {status}")))
            }
            Err(ureq::Error::Transport(t)) => Err(FetchFailure::Source(Box::new(t))),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Intermediate failure carrying either a message or a source error, so the
/// same fetch path can be mapped to model or metadata error variants.
enum FetchFailure {
    Message(String),
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl ModelFetcher for HttpFetcher {
    fn fetch_model(&self, url: &str) -> Result<Box<dyn ModelRuntime>, ClassificationError> {
        let resp = self.get_response(url).map_err(|f| match f {
            FetchFailure::Message(m) => ClassificationError::model_load_msg(url, m),
            FetchFailure::Source(s) => ClassificationError::ModelLoad {
                url: url.to_string(),
                context: "transport failure".to_string(),
                source: Some(s),
            },
        })?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ClassificationError::model_load(url, "failed to read response body", e))?;

        let runtime = OrtRuntime::from_bytes(url, &bytes)?;
        Ok(Box::new(runtime))
    }

    fn fetch_metadata(&self, url: &str) -> Result<LabelMetadata, ClassificationError> {
        let resp = self.get_response(url).map_err(|f| match f {
            FetchFailure::Message(m) => ClassificationError::metadata_load_msg(url, m),
            FetchFailure::Source(s) => ClassificationError::MetadataLoad {
                url: url.to_string(),
                context: "transport failure".to_string(),
                source: Some(s),
            },
        })?;

        serde_json::from_reader(resp.into_reader())
            .map_err(|e| ClassificationError::metadata_load(url, "failed to parse metadata JSON", e))
    }
}

/// Process-wide cache holding loaded models keyed by model URL.
///
/// Constructed once by the composition root and shared (`Arc`) with every
/// session. Reads are lock-free once an entry is populated; only the first
/// load per URL is serialized.
pub struct ModelCache {
    fetcher: Arc<dyn ModelFetcher>,
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<LoadedModel>>>>>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded = self
            .entries
            .lock()
            .map(|m| m.values().filter(|c| c.get().is_some()).count())
            .unwrap_or(0);
        f.debug_struct("ModelCache").field("loaded", &loaded).finish()
    }
}

impl ModelCache {
    /// Creates a cache backed by HTTP fetches.
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(HttpFetcher::new()))
    }

    /// Creates a cache backed by a custom fetcher.
    pub fn with_fetcher(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the model for `model_url`, loading it on first use.
    ///
    /// Exactly one load is attempted per distinct URL at a time: concurrent
    /// callers block on the same in-flight load and receive the identical
    /// handle. Metadata, if configured, is fetched once as a side effect of
    /// the first successful model load; a metadata failure degrades to
    /// synthesized labels rather than aborting.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::ModelLoad` if the model cannot be
    /// fetched or parsed. The failed URL stays unloaded, so a subsequent
    /// `acquire` retries.
    pub fn acquire(
        &self,
        model_url: &str,
        metadata_url: Option<&str>,
    ) -> Result<Arc<LoadedModel>, ClassificationError> {
        let cell = {
            let mut entries = self.entries.lock().map_err(|_| {
                ClassificationError::model_load_msg(model_url, "cache lock poisoned")
            })?;
            entries.entry(model_url.to_string()).or_default().clone()
        };

        if let Some(model) = cell.get() {
            tracing::debug!(url = model_url, "model cache hit");
            return Ok(model.clone());
        }

        cell.get_or_try_init(|| self.load(model_url, metadata_url))
            .cloned()
    }

    fn load(
        &self,
        model_url: &str,
        metadata_url: Option<&str>,
    ) -> Result<Arc<LoadedModel>, ClassificationError> {
        tracing::info!(url = model_url, "loading model");
        let runtime = self.fetcher.fetch_model(model_url)?;

        let metadata = match metadata_url {
            Some(url) => match self.fetcher.fetch_metadata(url) {
                Ok(metadata) => {
                    tracing::debug!(url, classes = metadata.labels.len(), "metadata loaded");
                    Some(metadata)
                }
                Err(e) => {
                    // Non-fatal: fall back to synthesized labels.
                    tracing::warn!(url, error = %e, "metadata load failed, using synthesized labels");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            url = model_url,
            spatial_size = runtime.input_spec().spatial_size,
            "model loaded"
        );
        Ok(Arc::new(LoadedModel::new(runtime, metadata)))
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}
