//! Async runtime around the crowd kernel: broadcast hub, periodic producers, external feeds,
//! configuration, and the HTTP/WebSocket surface.

pub mod config;
pub mod control;
pub mod hub;
pub mod scheduler;
pub mod sources;
pub mod state;

mod server;

pub use config::{load as load_config, ConfigError};
pub use control::{ControlStats, SimulationControl};
pub use hub::{BroadcastHub, BroadcastReport, HubError, Registration, SubscriberId};
pub use scheduler::{Producer, ProducerError, Scheduler, TickOutcome};
pub use server::{serve, ServerError};
pub use sources::{ExternalSources, SourceError};
pub use state::AppState;
