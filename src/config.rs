//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `hub.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: where the query api listens.
//!     - RegistryConfig: history depth (K).
//!     - SweeperConfig: sweep period and ttl, independently tunable.
//!     - thresholds: the {metric, min, max} table.
//!     - EnrichmentConfig: device directory url and lookup queue sizing.
//!     - IngestConfig: websocket stream url and inbound queue policy.
//!     - LoggingConfig: default log level, per-reading log lines.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::ingest::DropPolicy;
use crate::registry;
use crate::thresholds::ThresholdTable;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub sweeper: SweeperConfig,
    pub thresholds: ThresholdTable,
    pub enrichment: EnrichmentConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    pub history_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweeperConfig {
    pub period_ms: u64,
    pub ttl_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            period_ms: 5000,
            ttl_ms: 5000,
        }
    }
}

impl SweeperConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// device directory root, e.g. "http://localhost:4000"; unset disables lookups
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub skip_when_enriched: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 3000,
            queue_capacity: 256,
            max_in_flight: 8,
            skip_when_enriched: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// websocket url of the sensor stream; unset means http push only
    pub stream_url: Option<String>,
    pub queue_capacity: usize,
    pub drop_policy: DropPolicy,
    pub reconnect_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream_url: None,
            queue_capacity: 1024,
            drop_policy: DropPolicy::DropOldest,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a toml document
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    ///
    /// an explicit path must load. the conventional locations are optional,
    /// but a file found there that does not load or validate is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            info!("[CONFIG] Loaded from {}", path.display());
            return Ok(config);
        }

        let paths = [
            PathBuf::from("config").join("hub.toml"),
            PathBuf::from("..").join("config").join("hub.toml"),
        ];
        match Self::load_first_existing(&paths)? {
            Some(config) => Ok(config),
            None => {
                warn!("[CONFIG] No config file found - using defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_first_existing(paths: &[PathBuf]) -> ConfigResult<Option<Self>> {
        let Some(path) = paths.iter().find(|p| p.exists()) else {
            return Ok(None);
        };
        let config = Self::load(path)?;
        info!("[CONFIG] Loaded from {}", path.display());
        Ok(Some(config))
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = |value: u64, name: &str| {
            if value == 0 {
                Err(ConfigError::Invalid(format!("{} must be greater than zero", name)))
            } else {
                Ok(())
            }
        };
        positive(self.registry.history_capacity as u64, "registry.history_capacity")?;
        positive(self.sweeper.period_ms, "sweeper.period_ms")?;
        positive(self.sweeper.ttl_ms, "sweeper.ttl_ms")?;
        positive(self.enrichment.queue_capacity as u64, "enrichment.queue_capacity")?;
        positive(self.enrichment.max_in_flight as u64, "enrichment.max_in_flight")?;
        positive(self.enrichment.timeout_ms, "enrichment.timeout_ms")?;
        positive(self.ingest.queue_capacity as u64, "ingest.queue_capacity")?;
        self.thresholds.validate()?;
        Ok(())
    }

    /// Registry tuning derived from this config
    pub fn registry_config(&self) -> registry::RegistryConfig {
        registry::RegistryConfig {
            history_capacity: self.registry.history_capacity,
            ttl: self.sweeper.ttl(),
            thresholds: self.thresholds.clone(),
            skip_when_enriched: self.enrichment.skip_when_enriched,
        }
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        info!("┌─────────────────────────────────────────┐");
        info!("│            HUB CONFIGURATION            │");
        info!("├─────────────────────────────────────────┤");
        info!("│ Bind: {}", self.server.bind);
        info!("│ History capacity: {}", self.registry.history_capacity);
        info!("│ Sweep period: {}ms, TTL: {}ms", self.sweeper.period_ms, self.sweeper.ttl_ms);
        for rule in self.thresholds.rules() {
            info!("│ Threshold {}: {} .. {}", rule.metric, rule.min, rule.max);
        }
        info!("│ Directory: {}", self.enrichment.base_url.as_deref().unwrap_or("(disabled)"));
        info!("│ Stream: {}", self.ingest.stream_url.as_deref().unwrap_or("(http push only)"));
        info!("│ Log Level: {}", self.logging.level);
        info!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metric;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.registry.history_capacity, 100);
        assert_eq!(config.sweeper.period(), Duration::from_millis(5000));
        assert_eq!(config.sweeper.ttl(), Duration::from_millis(5000));
        assert_eq!(config.thresholds.rules().len(), 2);
        assert!(config.enrichment.base_url.is_none());
        assert_eq!(config.ingest.drop_policy, DropPolicy::DropOldest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = HubConfig::from_toml(
            r#"
            [registry]
            history_capacity = 10

            [sweeper]
            ttl_ms = 8000
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.history_capacity, 10);
        assert_eq!(config.sweeper.ttl_ms, 8000);
        assert_eq!(config.sweeper.period_ms, 5000);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_full_file() {
        let config = HubConfig::from_toml(
            r#"
            [server]
            bind = "127.0.0.1:8080"

            [[thresholds]]
            metric = "probeTemperature"
            min = 2.0
            max = 8.0

            [[thresholds]]
            metric = "temperature"
            min = 15.0
            max = 25.0

            [enrichment]
            base_url = "http://localhost:4000"
            skip_when_enriched = true

            [ingest]
            stream_url = "wss://bio-data.example.com"
            drop_policy = "drop_newest"
            queue_capacity = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.rules().len(), 2);
        assert_eq!(config.thresholds.rules()[1].metric, Metric::Temperature);
        assert_eq!(config.enrichment.base_url.as_deref(), Some("http://localhost:4000"));
        assert!(config.registry_config().skip_when_enriched);
        assert_eq!(config.ingest.drop_policy, DropPolicy::DropNewest);
        assert_eq!(config.ingest.queue_capacity, 64);
    }

    #[test]
    fn test_registry_config_carries_ttl() {
        let mut config = HubConfig::default();
        config.sweeper.ttl_ms = 1234;
        config.registry.history_capacity = 7;
        let registry = config.registry_config();
        assert_eq!(registry.ttl, Duration::from_millis(1234));
        assert_eq!(registry.history_capacity, 7);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = HubConfig::from_toml("[registry]\nhistory_capacity = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_threshold() {
        let result = HubConfig::from_toml(
            "[[thresholds]]\nmetric = \"humidity\"\nmin = 60.0\nmax = 30.0\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn test_rejects_unknown_metric() {
        let result = HubConfig::from_toml(
            "[[thresholds]]\nmetric = \"pressure\"\nmin = 1.0\nmax = 2.0\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sweeper]\nperiod_ms = 1000").unwrap();
        let config = HubConfig::load(file.path()).unwrap();
        assert_eq!(config.sweeper.period_ms, 1000);

        let explicit = HubConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(explicit.sweeper.period_ms, 1000);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = HubConfig::load_or_default(Some(Path::new("/nonexistent/hub.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_broken_conventional_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("hub.toml");
        std::fs::write(
            &broken,
            "[registry]\nhistory_capacity = 0\n\n[sweeper]\nttl_ms = 60000\n",
        )
        .unwrap();
        let missing = dir.path().join("absent.toml");

        let result = HubConfig::load_first_existing(&[missing.clone(), broken]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let unparsable = dir.path().join("garbled.toml");
        std::fs::write(&unparsable, "[sweeper\nttl_ms = ").unwrap();
        let result = HubConfig::load_first_existing(&[unparsable]);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        assert!(HubConfig::load_first_existing(&[missing]).unwrap().is_none());
    }

    #[test]
    fn test_first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, "[sweeper]\nttl_ms = 60000\n").unwrap();
        std::fs::write(&second, "[sweeper]\nttl_ms = 1000\n").unwrap();

        let config = HubConfig::load_first_existing(&[first, second]).unwrap().unwrap();
        assert_eq!(config.sweeper.ttl_ms, 60000);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let shipped = HubConfig::from_toml(include_str!("../config/hub.toml")).unwrap();
        let defaults = HubConfig::default();
        assert!(shipped.validate().is_ok());
        assert_eq!(shipped.server.bind, defaults.server.bind);
        assert_eq!(shipped.sweeper.ttl_ms, defaults.sweeper.ttl_ms);
        assert_eq!(shipped.thresholds.rules(), defaults.thresholds.rules());
        assert_eq!(shipped.ingest.queue_capacity, defaults.ingest.queue_capacity);
        assert!(shipped.enrichment.base_url.is_none());
    }
}
