//! ==============================================================================
//! registry.rs - the live sensor registry
//! ==============================================================================
//!
//! purpose:
//!     owns the key -> SensorState map. every mutation (upsert, enrichment
//!     merge, eviction, sweep) goes through the write half of one rwlock, so
//!     writers are serialized; readers share the read half and always clone
//!     a whole entry, never a half-updated one.
//!
//! lifecycle of an entry:
//!     first reading for an unseen key  -> created with empty history
//!     every later reading              -> latest, history, alerts replaced
//!     enrichment resolved              -> metadata merged (never cleared)
//!     silent for >= ttl                -> hidden from queries, then removed
//!                                         by the sweeper
//!
//! relationships:
//!     - fed by: ingest.rs (upsert), enrichment.rs (merge_enrichment)
//!     - swept by: sweeper.rs
//!     - read by: query.rs
//!     - sends: lookup requests to enrichment.rs over a bounded channel
//!
//! ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::{unix_time_ms, DeviceMetadata, RawReading};
use crate::history::{HistorySnapshot, MetricHistory};
use crate::metrics;
use crate::thresholds::{render_alerts, AlertDescriptor, ThresholdTable};

/// registry tuning, usually built from `HubConfig`
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// K: values kept per metric
    pub history_capacity: usize,
    /// silence after which a sensor is considered gone
    pub ttl: Duration,
    pub thresholds: ThresholdTable,
    /// do not ask the directory again once a sensor has metadata
    pub skip_when_enriched: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            ttl: Duration::from_millis(5000),
            thresholds: ThresholdTable::default(),
            skip_when_enriched: false,
        }
    }
}

/// per-sensor state, only ever touched under the registry lock
#[derive(Debug, Clone)]
struct SensorState {
    key: String,
    latest: RawReading,
    history: MetricHistory,
    last_seen: Instant,
    last_seen_ms: u64,
    alerts: Vec<AlertDescriptor>,
    enrichment: Option<DeviceMetadata>,
    readings_seen: u64,
}

impl SensorState {
    fn new(reading: &RawReading, capacity: usize, now: Instant) -> Self {
        Self {
            key: reading.key.clone(),
            latest: reading.clone(),
            history: MetricHistory::new(capacity),
            last_seen: now,
            last_seen_ms: unix_time_ms(),
            alerts: Vec::new(),
            enrichment: None,
            readings_seen: 0,
        }
    }

    fn apply(&mut self, reading: RawReading, alerts: Vec<AlertDescriptor>, now: Instant) {
        self.history.record(&reading);
        self.latest = reading;
        self.alerts = alerts;
        self.last_seen = now;
        self.last_seen_ms = unix_time_ms();
        self.readings_seen += 1;
    }

    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < ttl
    }

    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            key: self.key.clone(),
            latest: self.latest.clone(),
            history: self.history.snapshot(),
            alert_message: render_alerts(&self.alerts),
            alerts: self.alerts.clone(),
            enrichment: self.enrichment.clone(),
            last_seen_ms: self.last_seen_ms,
            readings_seen: self.readings_seen,
        }
    }
}

/// consistent copy of one sensor, handed to readers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub key: String,
    pub latest: RawReading,
    pub history: HistorySnapshot,
    /// structured violations of the latest reading
    pub alerts: Vec<AlertDescriptor>,
    /// the same violations as one banner string (empty when none)
    pub alert_message: String,
    pub enrichment: Option<DeviceMetadata>,
    /// wall-clock arrival time of the last reading (unix ms)
    pub last_seen_ms: u64,
    pub readings_seen: u64,
}

impl SensorSnapshot {
    pub fn has_alert(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// what `merge_enrichment` did with a lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// metadata stored on the entry
    Applied,
    /// result was empty, previous metadata (if any) left untouched
    KeptPrevious,
    /// entry was evicted while the lookup was in flight
    Discarded,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOutcome::Applied => "applied",
            MergeOutcome::KeptPrevious => "kept_previous",
            MergeOutcome::Discarded => "discarded",
        }
    }
}

/// clone-able handle to the shared sensor map
#[derive(Clone)]
pub struct Registry {
    sensors: Arc<RwLock<HashMap<String, SensorState>>>,
    config: Arc<RegistryConfig>,
    enrichment_tx: Option<mpsc::Sender<String>>,
}

impl Registry {
    /// registry without an enrichment gateway attached
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sensors: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            enrichment_tx: None,
        }
    }

    /// attach the sending half of the gateway's request queue
    pub fn with_enrichment(mut self, tx: mpsc::Sender<String>) -> Self {
        self.enrichment_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// insert-or-update a sensor from one reading
    ///
    /// history and alerts are updated before this returns; the metadata
    /// lookup is only queued.
    pub async fn upsert(&self, reading: RawReading) -> SensorSnapshot {
        let key = reading.key.clone();
        let alerts = self.config.thresholds.evaluate(&reading);

        let (snapshot, wants_enrichment) = {
            let mut sensors = self.sensors.write().await;
            let now = Instant::now();
            let capacity = self.config.history_capacity;
            let state = sensors.entry(key.clone()).or_insert_with(|| {
                info!(sensor = %key, "new sensor registered");
                SensorState::new(&reading, capacity, now)
            });
            state.apply(reading, alerts, now);
            let wants = !(self.config.skip_when_enriched && state.enrichment.is_some());
            let snapshot = state.snapshot();
            metrics::TRACKED_SENSORS.set(sensors.len() as i64);
            (snapshot, wants)
        };

        if wants_enrichment {
            self.request_enrichment(&key);
        }
        snapshot
    }

    fn request_enrichment(&self, key: &str) {
        let Some(tx) = &self.enrichment_tx else {
            return;
        };
        match tx.try_send(key.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::ENRICHMENT_REQUESTS_DROPPED_TOTAL.inc();
                debug!(sensor = %key, "enrichment queue full, lookup skipped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(sensor = %key, "enrichment gateway stopped, lookup skipped");
            }
        }
    }

    /// merge a resolved lookup into the entry for `key`
    ///
    /// empty results never replace good metadata, and results for evicted
    /// sensors are dropped rather than recreating the entry.
    pub async fn merge_enrichment(
        &self,
        key: &str,
        result: Option<DeviceMetadata>,
    ) -> MergeOutcome {
        let mut sensors = self.sensors.write().await;
        let Some(state) = sensors.get_mut(key) else {
            return MergeOutcome::Discarded;
        };
        match result.filter(|device| !device.is_empty()) {
            Some(device) => {
                state.enrichment = Some(device);
                MergeOutcome::Applied
            }
            None => MergeOutcome::KeptPrevious,
        }
    }

    /// snapshot of one live sensor
    pub async fn get(&self, key: &str) -> Option<SensorSnapshot> {
        let sensors = self.sensors.read().await;
        let now = Instant::now();
        sensors
            .get(key)
            .filter(|s| s.is_live(now, self.config.ttl))
            .map(SensorState::snapshot)
    }

    /// every live sensor, ordered by key
    pub async fn list(&self) -> Vec<SensorSnapshot> {
        self.collect(|_| true).await
    }

    /// live sensors whose key contains `needle`, case-insensitive
    pub async fn list_matching(&self, needle: &str) -> Vec<SensorSnapshot> {
        let needle = needle.to_lowercase();
        self.collect(|key| key.to_lowercase().contains(&needle)).await
    }

    async fn collect(&self, mut keep: impl FnMut(&str) -> bool) -> Vec<SensorSnapshot> {
        let sensors = self.sensors.read().await;
        let now = Instant::now();
        let mut out: Vec<SensorSnapshot> = sensors
            .values()
            .filter(|s| s.is_live(now, self.config.ttl) && keep(&s.key))
            .map(SensorState::snapshot)
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// remove one sensor; returns whether it existed
    pub async fn evict(&self, key: &str) -> bool {
        let mut sensors = self.sensors.write().await;
        let removed = sensors.remove(key).is_some();
        if removed {
            metrics::SENSORS_EVICTED_TOTAL.inc();
            metrics::TRACKED_SENSORS.set(sensors.len() as i64);
        }
        removed
    }

    /// remove every sensor silent for at least the ttl, returning their keys
    ///
    /// `now` is read after the lock is taken, so a reading that won the race
    /// for the lock is always seen as fresh.
    pub async fn sweep(&self) -> Vec<String> {
        let mut sensors = self.sensors.write().await;
        let now = Instant::now();
        let ttl = self.config.ttl;
        let mut evicted: Vec<String> = sensors
            .values()
            .filter(|s| !s.is_live(now, ttl))
            .map(|s| s.key.clone())
            .collect();
        for key in &evicted {
            sensors.remove(key);
        }
        if !evicted.is_empty() {
            metrics::SENSORS_EVICTED_TOTAL.inc_by(evicted.len() as u64);
            metrics::TRACKED_SENSORS.set(sensors.len() as i64);
        }
        evicted.sort();
        evicted
    }

    /// entries held, including stale ones not yet swept
    pub async fn len(&self) -> usize {
        self.sensors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sensors.read().await.is_empty()
    }

    /// sensors heard from within the ttl, counted without snapshotting
    pub async fn live_count(&self) -> usize {
        let sensors = self.sensors.read().await;
        let now = Instant::now();
        sensors
            .values()
            .filter(|s| s.is_live(now, self.config.ttl))
            .count()
    }
}
