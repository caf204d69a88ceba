//! Read-only projections for presentation collaborators
//!
//! The dashboard polls these; nothing here mutates the registry or waits on
//! the enrichment gateway or the sweeper.

use serde::Serialize;

use crate::registry::{Registry, SensorSnapshot};

/// Compact card for the sensor grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSummary {
    pub key: String,
    pub probe_temperature: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub datetime: String,
    pub alert_message: String,
    pub device_name: Option<String>,
    pub last_seen_ms: u64,
}

impl From<&SensorSnapshot> for SensorSummary {
    fn from(s: &SensorSnapshot) -> Self {
        Self {
            key: s.key.clone(),
            probe_temperature: s.latest.probe_temperature,
            temperature: s.latest.temperature,
            humidity: s.latest.humidity,
            // dd/mm/yyyy, hh:mm:ss as on the dashboard cards
            datetime: s.latest.timestamp.format("%d/%m/%Y, %H:%M:%S").to_string(),
            alert_message: s.alert_message.clone(),
            device_name: s.enrichment.as_ref().map(|d| d.name.clone()),
            last_seen_ms: s.last_seen_ms,
        }
    }
}

/// Read-only view over the registry
#[derive(Clone)]
pub struct QuerySurface {
    registry: Registry,
}

impl QuerySurface {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Every live sensor with full history
    pub async fn list(&self) -> Vec<SensorSnapshot> {
        self.registry.list().await
    }

    /// One live sensor; `None` for evicted or never-seen keys
    pub async fn get(&self, key: &str) -> Option<SensorSnapshot> {
        self.registry.get(key).await
    }

    /// Live sensors whose key contains `needle` (case-insensitive)
    pub async fn list_matching(&self, needle: &str) -> Vec<SensorSnapshot> {
        self.registry.list_matching(needle).await
    }

    /// Grid cards, optionally filtered
    pub async fn summaries(&self, needle: Option<&str>) -> Vec<SensorSummary> {
        let sensors = match needle {
            Some(q) if !q.trim().is_empty() => self.list_matching(q.trim()).await,
            _ => self.list().await,
        };
        sensors.iter().map(SensorSummary::from).collect()
    }

    /// Sensors whose latest reading is out of range
    pub async fn alerting(&self) -> Vec<SensorSnapshot> {
        self.list().await.into_iter().filter(SensorSnapshot::has_alert).collect()
    }

    pub async fn active_count(&self) -> usize {
        self.registry.live_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawReading;
    use crate::registry::RegistryConfig;
    use chrono::{TimeZone, Utc};

    fn reading(key: &str, probe: f64) -> RawReading {
        RawReading {
            key: key.into(),
            probe_temperature: probe,
            temperature: 22.0,
            humidity: 45.0,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 29, 6, 20, 51).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_summaries_and_filter() {
        let registry = Registry::new(RegistryConfig::default());
        registry.upsert(reading("doctor03", 4.0)).await;
        registry.upsert(reading("nurse01", 8.0)).await;
        let query = QuerySurface::new(registry);

        let all = query.summaries(None).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].datetime, "29/03/2025, 06:20:51");

        let filtered = query.summaries(Some(" NURSE ")).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].key, "nurse01");
        assert!(!filtered[0].alert_message.is_empty());
        assert_eq!(query.summaries(Some("")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_alerting_and_absent() {
        let registry = Registry::new(RegistryConfig::default());
        registry.upsert(reading("doctor03", 4.0)).await;
        registry.upsert(reading("nurse01", 8.0)).await;
        let query = QuerySurface::new(registry);

        let alerting = query.alerting().await;
        assert_eq!(alerting.len(), 1);
        assert_eq!(alerting[0].key, "nurse01");
        assert!(query.get("ghost").await.is_none());
        assert_eq!(query.active_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_count_skips_unswept_sensors() {
        let registry = Registry::new(RegistryConfig::default());
        registry.upsert(reading("doctor03", 4.0)).await;
        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        registry.upsert(reading("nurse01", 4.0)).await;
        let query = QuerySurface::new(registry.clone());

        assert_eq!(query.active_count().await, 1);
        assert_eq!(query.list().await.len(), 1);
        assert_eq!(registry.len().await, 2);
    }
}
