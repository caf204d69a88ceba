//! ==============================================================================
//! hub.rs - task wiring
//! ==============================================================================
//!
//! purpose:
//!     builds the registry and starts every background task that feeds or
//!     trims it, so main.rs and the integration tests share one wiring.
//!
//! ```text
//!     tasks started:
//!     - ingest worker      (always)
//!     - liveness sweeper   (always)
//!     - enrichment gateway (when a device directory is given)
//!     - websocket client   (when ingest.stream_url is set)
//! ```
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::config::HubConfig;
use crate::enrichment::{request_channel, DeviceDirectory, EnrichmentGateway, HttpDirectory};
use crate::error::{ConfigError, ConfigResult};
use crate::ingest::{IngestQueue, IngestWorker, StreamClient};
use crate::query::QuerySurface;
use crate::registry::Registry;
use crate::sweeper::Sweeper;

/// running hub: shared handles plus the background tasks
pub struct Hub {
    pub registry: Registry,
    pub queue: Arc<IngestQueue>,
    worker: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl Hub {
    /// directory described by `enrichment.base_url`, if any
    pub fn directory_from_config(
        config: &HubConfig,
    ) -> ConfigResult<Option<Arc<dyn DeviceDirectory>>> {
        match &config.enrichment.base_url {
            Some(base_url) => {
                let timeout = Duration::from_millis(config.enrichment.timeout_ms);
                let directory = HttpDirectory::new(base_url, timeout)?;
                Ok(Some(Arc::new(directory)))
            }
            None => Ok(None),
        }
    }

    /// start every task; must be called inside a tokio runtime
    pub fn start(
        config: &HubConfig,
        directory: Option<Arc<dyn DeviceDirectory>>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let stream_url = config
            .ingest
            .stream_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    ConfigError::Invalid(format!("ingest.stream_url '{}': {}", raw, e))
                })
            })
            .transpose()?;

        let mut registry = Registry::new(config.registry_config());
        let mut background = Vec::new();

        if let Some(directory) = directory {
            let (tx, rx) = request_channel(config.enrichment.queue_capacity);
            registry = registry.with_enrichment(tx);
            background.push(EnrichmentGateway::spawn(
                directory,
                registry.clone(),
                rx,
                config.enrichment.max_in_flight,
            ));
        } else {
            info!("no device directory configured, enrichment disabled");
        }

        background.push(Sweeper::new(registry.clone(), config.sweeper.period()).spawn());

        let queue = Arc::new(IngestQueue::new(
            config.ingest.queue_capacity,
            config.ingest.drop_policy,
        ));
        if let Some(url) = stream_url {
            let delay = Duration::from_millis(config.ingest.reconnect_delay_ms);
            background.push(StreamClient::new(url, queue.clone(), delay).spawn());
        }

        let worker = IngestWorker::new(
            queue.clone(),
            registry.clone(),
            config.logging.show_sensor_data,
        )
        .spawn();

        Ok(Self {
            registry,
            queue,
            worker,
            background,
        })
    }

    pub fn query(&self) -> QuerySurface {
        QuerySurface::new(self.registry.clone())
    }

    /// stop intake, let the worker drain what is queued, stop the rest
    pub async fn shutdown(self) {
        self.queue.close();
        for task in &self.background {
            task.abort();
        }
        let _ = self.worker.await;
        for task in self.background {
            let _ = task.await;
        }
        info!("hub stopped");
    }
}
