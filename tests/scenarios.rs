// coldchain-hub - end-to-end registry scenarios
//
// These follow one sensor ("doctor03") through its lifecycle with the
// default threshold table, paused tokio time and a scripted device
// directory:
// 1. Alerts follow the latest reading
// 2. History stays bounded
// 3. Silent sensors disappear
// 4. Enrichment survives failed lookups

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coldchain_hub::{
    parse_message, DeviceDirectory, DeviceMetadata, EnrichmentGateway, Inbound, LookupFailure,
    LookupOutcome, Metric, RawReading, Registry, RegistryConfig, Sweeper,
};

fn payload(key: &str, ds: f64, temperature: f64, humidity: f64, second: u32) -> String {
    format!(
        r#"{{"username":"{}","temperature":{},"humidity":{},"dsTemperature":{},"datetime":"2025-03-29T06:20:{:02}Z"}}"#,
        key, temperature, humidity, ds, second
    )
}

fn reading(key: &str, ds: f64, temperature: f64, humidity: f64, second: u32) -> RawReading {
    match parse_message(&payload(key, ds, temperature, humidity, second)).unwrap() {
        Inbound::Reading(r) => r,
        Inbound::Control => unreachable!(),
    }
}

fn registry(capacity: usize) -> Registry {
    Registry::new(RegistryConfig {
        history_capacity: capacity,
        ttl: Duration::from_millis(5000),
        ..Default::default()
    })
}

// ============================================================================
// Alerts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_doctor03_alert_follows_latest_reading() {
    let registry = registry(100);

    registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, 0)).await;
    let snap = registry.get("doctor03").await.unwrap();
    assert!(snap.alerts.is_empty());
    assert_eq!(snap.alert_message, "");

    tokio::time::advance(Duration::from_secs(1)).await;
    registry.upsert(reading("doctor03", 7.0, 22.0, 45.0, 1)).await;
    let snap = registry.get("doctor03").await.unwrap();
    assert_eq!(snap.alerts.len(), 1);
    assert_eq!(snap.alerts[0].metric, Metric::ProbeTemperature);
    assert_eq!(snap.alerts[0].value, 7.0);
    assert!(snap.alert_message.contains("higher than 6"));
}

#[tokio::test(start_paused = true)]
async fn test_two_violations_reported_separately() {
    let registry = registry(100);
    let snap = registry.upsert(reading("doctor03", 7.0, 22.0, 65.0, 0)).await;
    let metrics: Vec<Metric> = snap.alerts.iter().map(|a| a.metric).collect();
    assert_eq!(metrics, vec![Metric::ProbeTemperature, Metric::Humidity]);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fifteen_readings_with_capacity_ten() {
    let registry = registry(10);
    for i in 1..=15u32 {
        registry
            .upsert(reading("doctor03", 3.0, 20.0 + i as f64, 45.0, i))
            .await;
    }
    let snap = registry.get("doctor03").await.unwrap();
    assert_eq!(snap.history.temperature.len(), 10);
    assert_eq!(snap.history.temperature[0], 26.0);
    assert_eq!(snap.history.labels[0], "06:20:06");
    assert_eq!(registry.len().await, 1);
}

// ============================================================================
// Liveness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_doctor03_absent_after_six_silent_seconds() {
    let registry = registry(100);
    let sweeper = Sweeper::new(registry.clone(), Duration::from_millis(5000)).spawn();

    registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, 0)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    registry.upsert(reading("doctor03", 7.0, 22.0, 45.0, 1)).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(registry.get("doctor03").await.is_none());
    assert!(registry.list().await.is_empty());

    // the sweeper ticked at t=10s, after ttl expired at t=6s
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(registry.is_empty().await);

    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_sensor_reappears_after_eviction() {
    let registry = registry(100);
    registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, 0)).await;
    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(registry.sweep().await, vec!["doctor03".to_string()]);

    let snap = registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, 7)).await;
    assert_eq!(snap.readings_seen, 1);
    assert_eq!(snap.history.probe_temperature.len(), 1);
}

// ============================================================================
// Enrichment
// ============================================================================

/// first call succeeds, every later call fails with a network error
struct FlakyDirectory {
    calls: AtomicUsize,
}

#[async_trait]
impl DeviceDirectory for FlakyDirectory {
    async fn lookup(&self, _key: &str) -> LookupOutcome {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            LookupOutcome::Found(DeviceMetadata {
                name: "Vaccine fridge 2".into(),
                brand: "Dometic".into(),
                model: "CFX3".into(),
                serie: "DM-2291".into(),
            })
        } else {
            LookupOutcome::NetworkError(LookupFailure::Transport("connection reset".into()))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_keeps_prior_enrichment() {
    let (tx, rx) = coldchain_hub::enrichment::request_channel(16);
    let registry = registry(100).with_enrichment(tx);
    let directory = Arc::new(FlakyDirectory {
        calls: AtomicUsize::new(0),
    });
    let gateway = EnrichmentGateway::spawn(directory.clone(), registry.clone(), rx, 1);

    registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, 0)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        registry.get("doctor03").await.unwrap().enrichment.unwrap().serie,
        "DM-2291"
    );

    for second in 1..4 {
        registry.upsert(reading("doctor03", 4.0, 22.0, 45.0, second)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(directory.calls.load(Ordering::SeqCst), 4);
    let enrichment = registry.get("doctor03").await.unwrap().enrichment.unwrap();
    assert_eq!(enrichment.name, "Vaccine fridge 2");

    gateway.abort();
}
