//! ==============================================================================
//! coldchain-hub - live telemetry aggregator
//! ==============================================================================
//!
//! purpose:
//!     consumes a continuous stream of per-device cold-chain readings (probe
//!     temperature, ambient temperature, humidity), keeps a bounded rolling
//!     history per device, flags safe-range violations, attaches device
//!     metadata looked up out-of-band, and forgets devices that go silent.
//!     the dashboard reads the result over http.
//!
//! architecture:
//!
//! ```text
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                        coldchain-hub                        │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ ingest      │  │ web server  │  │ liveness sweeper    │  │
//!     │  │ ws + push   │  │ query api   │  │ (5s tick)           │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         │ upsert         │ read               │ evict       │
//!     │         └────────────────┼────────────────────┘             │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │ registry  │ <- registry.rs             │
//!     │                    └─────┬─────┘                            │
//!     │              lookup key  │  ▲ merge_enrichment              │
//!     │                    ┌─────▼──┴──┐                            │
//!     │                    │ enrichment│ <- enrichment.rs           │
//!     │                    └─────┬─────┘                            │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                                │ http
//!                        ┌───────▼────────┐
//!                        │ device directory│
//!                        └────────────────┘
//! ```
//!
//! ==============================================================================

pub mod config;
pub mod domain;
pub mod enrichment;
pub mod error;
pub mod history;
pub mod hub;
pub mod ingest;
pub mod metrics;
pub mod parser;
pub mod query;
pub mod registry;
pub mod server;
pub mod sweeper;
pub mod thresholds;

pub use config::HubConfig;
pub use domain::{DeviceMetadata, Metric, RawReading};
pub use enrichment::{DeviceDirectory, EnrichmentGateway, HttpDirectory, LookupOutcome};
pub use error::{ConfigError, LookupFailure, ParseError};
pub use hub::Hub;
pub use ingest::{DropPolicy, IngestQueue, IngestWorker, PushOutcome};
pub use parser::{parse_message, Inbound};
pub use query::{QuerySurface, SensorSummary};
pub use registry::{MergeOutcome, Registry, RegistryConfig, SensorSnapshot};
pub use sweeper::{SweepState, Sweeper};
pub use thresholds::{AlertDescriptor, Bound, ThresholdRule, ThresholdTable};
