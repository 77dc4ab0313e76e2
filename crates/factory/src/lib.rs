//! Engine selection, fallback and usage metrics for megascan.
//!
//! [`EngineOrchestrator`] owns the engine instances of a scanning session. It
//! asks the capability detector which engine suits the host, remembers the
//! last engine that worked, and walks forward through the engine priority
//! order when one fails to initialize.

pub mod error;
mod metrics;
mod orchestrator;
mod registry;
mod report;
mod settings;
mod store;

pub use crate::metrics::{
    EngineUsage, ErrorRecord, FallbackRecord, Metrics, Percentiles, PersistedMetrics, ScanRecord,
};
pub use crate::orchestrator::EngineOrchestrator;
pub use crate::registry::{Constructor, Registry};
pub use crate::report::{
    AnalyticsReport, EngineAvailability, FactoryEvent, FactoryStats, Priority, Recommendation, RecommendationKind,
};
pub use crate::settings::{FactorySettings, Thresholds};
pub use crate::store::{KeyValueStore, MemoryStore};
