//! Bounded per-metric history rings
//!
//! Each sensor keeps the last `capacity` values of every tracked metric plus
//! a parallel ring of reading timestamps. Order is arrival order; a reading
//! delivered late is still appended at the tail.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Metric, RawReading};

/// Rolling history for one sensor
#[derive(Debug, Clone)]
pub struct MetricHistory {
    capacity: usize,
    probe_temperature: VecDeque<f64>,
    temperature: VecDeque<f64>,
    humidity: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl MetricHistory {
    /// Create an empty history; a zero capacity is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            probe_temperature: VecDeque::with_capacity(capacity),
            temperature: VecDeque::with_capacity(capacity),
            humidity: VecDeque::with_capacity(capacity),
            timestamps: VecDeque::with_capacity(capacity),
        }
    }

    /// Append every metric of `reading`, dropping the oldest entries at capacity
    pub fn record(&mut self, reading: &RawReading) {
        let capacity = self.capacity;
        for metric in Metric::ALL {
            push_bounded(self.ring_mut(metric), reading.value(metric), capacity);
        }
        push_bounded(&mut self.timestamps, reading.timestamp, capacity);
    }

    /// Values of one metric, oldest first
    pub fn values(&self, metric: Metric) -> &VecDeque<f64> {
        match metric {
            Metric::ProbeTemperature => &self.probe_temperature,
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
        }
    }

    pub fn timestamps(&self) -> &VecDeque<DateTime<Utc>> {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Owned copy for the query surface
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            probe_temperature: self.probe_temperature.iter().copied().collect(),
            temperature: self.temperature.iter().copied().collect(),
            humidity: self.humidity.iter().copied().collect(),
            timestamps: self.timestamps.iter().copied().collect(),
            labels: self
                .timestamps
                .iter()
                .map(|t| t.format("%H:%M:%S").to_string())
                .collect(),
        }
    }

    fn ring_mut(&mut self, metric: Metric) -> &mut VecDeque<f64> {
        match metric {
            Metric::ProbeTemperature => &mut self.probe_temperature,
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, value: T, capacity: usize) {
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(value);
}

/// Chart-ready copy of a sensor's history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub probe_temperature: Vec<f64>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// `HH:MM:SS` axis labels, parallel to `timestamps`
    pub labels: Vec<String>,
}

impl HistorySnapshot {
    pub fn values(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::ProbeTemperature => &self.probe_temperature,
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
        }
    }
}
