//! ==============================================================================
//! thresholds.rs - safety range evaluation
//! ==============================================================================
//!
//! purpose:
//!     maps the latest reading of a sensor to the list of safe-range
//!     violations it shows right now. pure: no history, no hysteresis, so an
//!     alert disappears on the first reading back in range.
//!
//! default table:
//!     probeTemperature  2 .. 6   °C  (vaccine / blood cold chain)
//!     humidity         30 .. 60   %
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::{Metric, RawReading};
use crate::error::{ConfigError, ConfigResult};

/// one `{metric, min, max}` row of the threshold table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: Metric,
    pub min: f64,
    pub max: f64,
}

/// which side of the safe range was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Below,
    Above,
}

/// a single violation found by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDescriptor {
    pub metric: Metric,
    /// offending value
    pub value: f64,
    pub bound: Bound,
    /// the limit that was crossed (`min` for Below, `max` for Above)
    pub limit: f64,
}

impl AlertDescriptor {
    /// human-readable line, as shown on the dashboard banner
    pub fn message(&self) -> String {
        let direction = match self.bound {
            Bound::Above => "higher",
            Bound::Below => "lower",
        };
        let unit = self.metric.unit();
        format!(
            "Warning: {} ({}{}) is {} than {}{}.",
            self.metric.label(),
            self.value,
            unit,
            direction,
            self.limit,
            unit
        )
    }
}

/// ordered set of threshold rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    rules: Vec<ThresholdRule>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            rules: vec![
                ThresholdRule {
                    metric: Metric::ProbeTemperature,
                    min: 2.0,
                    max: 6.0,
                },
                ThresholdRule {
                    metric: Metric::Humidity,
                    min: 30.0,
                    max: 60.0,
                },
            ],
        }
    }
}

impl ThresholdTable {
    /// build a table, rejecting inverted, non-finite or duplicated rows
    pub fn new(rules: Vec<ThresholdRule>) -> ConfigResult<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    /// a table that never alerts
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            let invalid = |reason: &str| ConfigError::InvalidThreshold {
                metric: rule.metric.name().to_string(),
                reason: reason.to_string(),
            };
            if !rule.min.is_finite() || !rule.max.is_finite() {
                return Err(invalid("bounds must be finite"));
            }
            if rule.min > rule.max {
                return Err(invalid("min greater than max"));
            }
            if !seen.insert(rule.metric) {
                return Err(invalid("metric listed twice"));
            }
        }
        Ok(())
    }

    /// every violation shown by `latest`, in table order
    pub fn evaluate(&self, latest: &RawReading) -> Vec<AlertDescriptor> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let value = latest.value(rule.metric);
                if value < rule.min {
                    Some(AlertDescriptor {
                        metric: rule.metric,
                        value,
                        bound: Bound::Below,
                        limit: rule.min,
                    })
                } else if value > rule.max {
                    Some(AlertDescriptor {
                        metric: rule.metric,
                        value,
                        bound: Bound::Above,
                        limit: rule.max,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// join alert messages into the single banner string (empty when no alerts)
pub fn render_alerts(alerts: &[AlertDescriptor]) -> String {
    alerts
        .iter()
        .map(AlertDescriptor::message)
        .collect::<Vec<_>>()
        .join(" ")
}
