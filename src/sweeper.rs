//! ==============================================================================
//! sweeper.rs - liveness sweeper
//! ==============================================================================
//!
//! purpose:
//!     evicts sensors that stopped reporting. wakes every `period`, takes the
//!     registry write lock for one scan, drops every entry silent for at
//!     least `ttl`, and goes back to sleep.
//!
//! timing bound:
//!     period and ttl are independent. a sensor that goes silent at t is
//!     hidden from queries from t + ttl, and physically removed at the first
//!     tick after that, i.e. somewhere in [t + ttl, t + ttl + period).
//!
//! states:
//!     Idle ──tick──> Sweeping ──scan done──> Idle
//!
//! ==============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Sweeping,
}

pub struct Sweeper {
    registry: Registry,
    period: Duration,
    state: SweepState,
}

impl Sweeper {
    pub fn new(registry: Registry, period: Duration) -> Self {
        Self {
            registry,
            period,
            state: SweepState::Idle,
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// one scan-and-evict pass; returns the evicted keys
    pub async fn sweep_once(&mut self) -> Vec<String> {
        self.state = SweepState::Sweeping;
        let evicted = self.registry.sweep().await;
        self.state = SweepState::Idle;

        if evicted.is_empty() {
            debug!("sweep: nothing stale");
        } else {
            info!("sweep: evicted {} silent sensor(s): {}", evicted.len(), evicted.join(", "));
        }
        evicted
    }

    /// run forever on a fixed period; abort the handle to stop
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately, nothing can be stale yet
            ticker.tick().await;
            info!(
                "liveness sweeper started ({}ms period, {}ms ttl)",
                self.period.as_millis(),
                self.registry.config().ttl.as_millis()
            );
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawReading;
    use crate::registry::RegistryConfig;
    use chrono::Utc;

    fn reading(key: &str) -> RawReading {
        RawReading {
            key: key.into(),
            probe_temperature: 4.0,
            temperature: 22.0,
            humidity: 45.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_once_returns_to_idle() {
        let registry = Registry::new(RegistryConfig::default());
        registry.upsert(reading("doctor03")).await;

        let mut sweeper = Sweeper::new(registry.clone(), Duration::from_secs(5));
        assert!(sweeper.sweep_once().await.is_empty());
        assert_eq!(sweeper.state(), SweepState::Idle);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(sweeper.sweep_once().await, vec!["doctor03".to_string()]);
        assert_eq!(sweeper.state(), SweepState::Idle);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_evicts_silent_sensor() {
        let registry = Registry::new(RegistryConfig {
            ttl: Duration::from_millis(5000),
            ..Default::default()
        });
        let handle = Sweeper::new(registry.clone(), Duration::from_millis(5000)).spawn();

        registry.upsert(reading("doctor03")).await;
        registry.upsert(reading("nurse01")).await;

        // nurse01 keeps reporting, doctor03 goes quiet
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            registry.upsert(reading("nurse01")).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        registry.upsert(reading("nurse01")).await;

        assert_eq!(registry.len().await, 1);
        assert!(registry.get("nurse01").await.is_some());
        assert!(registry.get("doctor03").await.is_none());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reading_during_sweep_is_not_lost() {
        let registry = Registry::new(RegistryConfig {
            ttl: Duration::from_millis(1000),
            ..Default::default()
        });
        registry.upsert(reading("doctor03")).await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        let mut sweeper = Sweeper::new(registry.clone(), Duration::from_millis(1000));
        let (evicted, snap) =
            tokio::join!(sweeper.sweep_once(), registry.upsert(reading("doctor03")));

        // whichever took the lock first, the fresh reading survives
        assert_eq!(snap.key, "doctor03");
        assert!(evicted.len() <= 1);
        assert!(registry.get("doctor03").await.is_some());
    }
}
