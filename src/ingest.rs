//! ==============================================================================
//! ingest.rs - inbound stream plumbing
//! ==============================================================================
//!
//! purpose:
//!     gets raw sensor messages from the outside world into the registry.
//!
//! ```text
//!     ┌──────────────┐   ┌──────────────┐
//!     │ websocket    │   │ POST         │
//!     │ stream client│   │ /api/readings│
//!     └──────┬───────┘   └──────┬───────┘
//!            └────────┬─────────┘
//!                     ▼
//!             ┌───────────────┐  bounded, drop-oldest or drop-newest
//!             │  IngestQueue  │
//!             └───────┬───────┘
//!                     ▼
//!             ┌───────────────┐
//!             │ IngestWorker  │  parse -> registry.upsert
//!             └───────────────┘
//!
//!     the queue bounds memory under bursts; the stream source is the
//!     system of record, so losing a reading under overload is acceptable.
//!     a bad payload is logged, counted and skipped, never fatal.
//! ```
//!
//! relationships:
//!     - uses: parser.rs, registry.rs
//!     - used by: main.rs (wiring), server.rs (push endpoint)
//!
//! ==============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::metrics;
use crate::parser::{parse_message, Inbound};
use crate::registry::{Registry, SensorSnapshot};

// ==============================================================================
// bounded queue
// ==============================================================================

/// what to throw away when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// keep the freshest data: evict the head to make room
    #[default]
    DropOldest,
    /// keep what is queued: refuse the new payload
    DropNewest,
}

impl DropPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropPolicy::DropOldest => "drop_oldest",
            DropPolicy::DropNewest => "drop_newest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// queued, but the oldest payload was discarded
    DroppedOldest,
    /// not queued
    DroppedNewest,
    /// queue closed, not queued
    Closed,
}

struct QueueState {
    items: VecDeque<String>,
    closed: bool,
}

/// bounded multi-producer queue of raw payloads
pub struct IngestQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: DropPolicy,
}

impl IngestQueue {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// offer one payload; never blocks
    pub fn push(&self, payload: String) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            if state.items.len() < self.capacity {
                state.items.push_back(payload);
                PushOutcome::Enqueued
            } else {
                match self.policy {
                    DropPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(payload);
                        PushOutcome::DroppedOldest
                    }
                    DropPolicy::DropNewest => PushOutcome::DroppedNewest,
                }
            }
        };

        match outcome {
            PushOutcome::Enqueued => self.notify.notify_one(),
            PushOutcome::DroppedOldest => {
                metrics::INGEST_DROPPED_TOTAL.with_label_values(&[self.policy.as_str()]).inc();
                debug!("ingest queue full, oldest payload dropped");
                self.notify.notify_one();
            }
            PushOutcome::DroppedNewest => {
                metrics::INGEST_DROPPED_TOTAL.with_label_values(&[self.policy.as_str()]).inc();
                debug!("ingest queue full, payload refused");
            }
            PushOutcome::Closed => {}
        }
        outcome
    }

    /// next payload; `None` once the queue is closed and drained
    pub async fn pop(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(payload) = state.items.pop_front() {
                    return Some(payload);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// stop accepting payloads; queued ones can still be popped
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ==============================================================================
// worker - queue -> parser -> registry
// ==============================================================================

pub struct IngestWorker {
    queue: Arc<IngestQueue>,
    registry: Registry,
    show_sensor_data: bool,
}

impl IngestWorker {
    pub fn new(queue: Arc<IngestQueue>, registry: Registry, show_sensor_data: bool) -> Self {
        Self {
            queue,
            registry,
            show_sensor_data,
        }
    }

    /// process one payload; returns the updated sensor for real readings
    pub async fn handle(&self, payload: &str) -> Option<SensorSnapshot> {
        match parse_message(payload) {
            Ok(Inbound::Reading(reading)) => {
                let snapshot = self.registry.upsert(reading).await;
                metrics::READINGS_INGESTED_TOTAL.inc();
                if self.show_sensor_data {
                    info!(
                        "[{}] Probe: {:.1}°C | Temp: {:.1}°C | Humidity: {:.1}%",
                        snapshot.key,
                        snapshot.latest.probe_temperature,
                        snapshot.latest.temperature,
                        snapshot.latest.humidity
                    );
                }
                if snapshot.has_alert() {
                    warn!(sensor = %snapshot.key, "{}", snapshot.alert_message);
                }
                Some(snapshot)
            }
            Ok(Inbound::Control) => {
                metrics::CONTROL_MESSAGES_TOTAL.inc();
                debug!("control frame ignored");
                None
            }
            Err(e) => {
                metrics::PARSE_FAILURES_TOTAL.with_label_values(&[e.reason()]).inc();
                warn!("dropping inbound payload: {}", e);
                None
            }
        }
    }

    /// drain the queue until it is closed
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("ingest worker started (queue capacity {})", self.queue.capacity());
            while let Some(payload) = self.queue.pop().await {
                self.handle(&payload).await;
            }
            info!("ingest worker stopped");
        })
    }
}

// ==============================================================================
// websocket stream client
// ==============================================================================

pub struct StreamClient {
    url: Url,
    queue: Arc<IngestQueue>,
    reconnect_delay: Duration,
}

impl StreamClient {
    pub fn new(url: Url, queue: Arc<IngestQueue>, reconnect_delay: Duration) -> Self {
        Self {
            url,
            queue,
            reconnect_delay,
        }
    }

    /// connect, forward frames, reconnect after `reconnect_delay` forever
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.run_once().await {
                    Ok(()) => info!("sensor stream closed by {}", self.url),
                    Err(e) => warn!("sensor stream error: {}", e),
                }
                debug!("reconnecting in {}ms", self.reconnect_delay.as_millis());
                tokio::time::sleep(self.reconnect_delay).await;
            }
        })
    }

    async fn run_once(&self) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (mut stream, _) = connect_async(self.url.as_str()).await?;
        info!("connected to sensor stream {}", self.url);

        while let Some(message) = stream.next().await {
            match message? {
                Message::Text(text) => {
                    self.queue.push(text);
                }
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        self.queue.push(text);
                    }
                    Err(_) => debug!("non utf-8 binary frame ignored"),
                },
                Message::Close(_) => break,
                // pings are answered by tungstenite itself
                _ => {}
            }
        }
        Ok(())
    }
}
