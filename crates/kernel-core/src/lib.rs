//! Seeded multi-zone crowd simulation: phase machines, density fields, alerts, and history.

pub mod alerts;
pub mod density;
pub mod engine;
pub mod fallback;
pub mod history;
pub mod insight;
pub mod metro;
pub mod monitor;
pub mod phase;
pub mod registry;
pub mod responders;

pub use alerts::AlertEvaluator;
pub use engine::{DensityTick, MetroTick, SimulationEngine};
pub use history::{BoundedLog, HistoryEntry, HistoryRecorder, SeriesKind};
pub use insight::{ActionPlan, CrowdInsights, IncidentReport, InsightProvider, RuleBasedInsights};
pub use metro::{MetroNetwork, MetroStation};
pub use monitor::{CrowdMonitor, DensityOutcome, MetroOutcome, MonitorError};
pub use phase::{advance, PhaseChange, PhaseProfile, ZoneState};
pub use registry::{RegistryError, TransitPairing, ZoneRegistry};
pub use responders::{NearbyResponder, ResponderFleet};
