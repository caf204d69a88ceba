//! ==============================================================================
//! enrichment.rs - device metadata gateway
//! ==============================================================================
//!
//! purpose:
//!     attaches the assigned device record (name, brand, model, serie) to a
//!     sensor without ever slowing ingestion down. the registry drops sensor
//!     keys onto a bounded channel; this gateway drains it, asks the device
//!     directory, and merges the answer back.
//!
//! rules:
//!     - the directory call happens with no registry lock held; only the
//!       final merge takes the write lock.
//!     - not-found and network failures are merged as "no result", which the
//!       registry turns into a no-op. good metadata is never erased.
//!     - lookups run concurrently (up to max_in_flight) and may complete out
//!       of order: the last delivered non-empty answer wins, not necessarily
//!       the last requested one.
//!     - no retry, no backoff. the next reading queues a fresh lookup.
//!     - nothing cancels an in-flight lookup when its sensor is evicted; the
//!       late answer is discarded by the registry.
//!
//! relationships:
//!     - fed by: registry.rs (upsert -> request channel)
//!     - calls: registry.rs (merge_enrichment)
//!     - talks to: the device directory, GET /api/devices/by-sensor/{key}
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::DeviceMetadata;
use crate::error::{ConfigError, ConfigResult, LookupFailure};
use crate::metrics;
use crate::registry::{MergeOutcome, Registry};

/// result of asking the directory about one sensor
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(DeviceMetadata),
    /// no device assigned to this sensor
    NotFound,
    NetworkError(LookupFailure),
}

impl LookupOutcome {
    /// collapse to what the registry merges: data or nothing
    pub fn into_metadata(self) -> Option<DeviceMetadata> {
        match self {
            LookupOutcome::Found(device) if !device.is_empty() => Some(device),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "found",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::NetworkError(_) => "network_error",
        }
    }
}

/// anything that can resolve a sensor identity to its device record
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn lookup(&self, key: &str) -> LookupOutcome;
}

// ==============================================================================
// http directory - the dashboard backend
// ==============================================================================

/// directory backed by the dashboard's REST api
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> ConfigResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ConfigError::Invalid(format!("enrichment.base_url '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "enrichment.base_url '{}' cannot be a base url",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, key: &str) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["api", "devices", "by-sensor", key]);
        Some(url)
    }
}

fn transport_failure(e: reqwest::Error) -> LookupFailure {
    if e.is_timeout() {
        LookupFailure::Timeout
    } else {
        LookupFailure::Transport(e.to_string())
    }
}

#[async_trait]
impl DeviceDirectory for HttpDirectory {
    async fn lookup(&self, key: &str) -> LookupOutcome {
        let Some(url) = self.url_for(key) else {
            return LookupOutcome::NetworkError(LookupFailure::Transport("invalid base url".into()));
        };

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return LookupOutcome::NetworkError(transport_failure(e)),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return LookupOutcome::NotFound;
        }
        if !status.is_success() {
            return LookupOutcome::NetworkError(LookupFailure::UnexpectedStatus(status.as_u16()));
        }

        // the backend answers `null` for a sensor with no assignment
        match response.json::<Option<DeviceMetadata>>().await {
            Ok(Some(device)) if !device.is_empty() => LookupOutcome::Found(device),
            Ok(_) => LookupOutcome::NotFound,
            Err(e) if e.is_timeout() => LookupOutcome::NetworkError(LookupFailure::Timeout),
            Err(e) => LookupOutcome::NetworkError(LookupFailure::Decode(e.to_string())),
        }
    }
}

// ==============================================================================
// gateway - request queue consumer
// ==============================================================================

/// create the bounded request queue shared by registry and gateway
pub fn request_channel(capacity: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(capacity.max(1))
}

/// look up one sensor and merge the answer
pub async fn resolve(
    directory: &dyn DeviceDirectory,
    registry: &Registry,
    key: &str,
) -> MergeOutcome {
    let outcome = directory.lookup(key).await;
    metrics::ENRICHMENT_LOOKUPS_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
    if let LookupOutcome::NetworkError(failure) = &outcome {
        warn!(sensor = %key, "device lookup failed: {}", failure);
    }

    let merged = registry.merge_enrichment(key, outcome.into_metadata()).await;
    metrics::ENRICHMENT_MERGES_TOTAL
        .with_label_values(&[merged.as_str()])
        .inc();
    debug!(sensor = %key, outcome = merged.as_str(), "enrichment merged");
    merged
}

pub struct EnrichmentGateway;

impl EnrichmentGateway {
    /// start draining `requests`; the task ends when every sender is dropped
    pub fn spawn(
        directory: Arc<dyn DeviceDirectory>,
        registry: Registry,
        mut requests: mpsc::Receiver<String>,
        max_in_flight: usize,
    ) -> JoinHandle<()> {
        let limit = Arc::new(Semaphore::new(max_in_flight.max(1)));
        tokio::spawn(async move {
            info!("enrichment gateway started ({} lookups in flight max)", max_in_flight.max(1));
            while let Some(key) = requests.recv().await {
                let Ok(permit) = limit.clone().acquire_owned().await else {
                    break;
                };
                let directory = directory.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    resolve(directory.as_ref(), &registry, &key).await;
                    drop(permit);
                });
            }
            info!("enrichment gateway stopped");
        })
    }
}
