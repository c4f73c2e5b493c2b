use std::sync::Arc;

use contracts::SimulationConfig;
use kernel_core::{CrowdMonitor, InsightProvider, RuleBasedInsights, SimulationEngine};
use tokio::sync::Mutex;

use crate::control::SimulationControl;
use crate::hub::BroadcastHub;
use crate::sources::{ExternalSources, SourceError};

#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
    pub control: Arc<SimulationControl>,
    /// Everything the density and metro producers mutate. One lock keeps a single writer.
    pub sim: Arc<Mutex<CrowdMonitor>>,
    pub config: Arc<SimulationConfig>,
    pub insights: Arc<dyn InsightProvider>,
    pub sources: Arc<ExternalSources>,
}

impl AppState {
    pub fn new(config: SimulationConfig) -> Result<Self, SourceError> {
        let sources = ExternalSources::new(config.weather.clone(), config.bus_feed.clone())?;
        let engine = SimulationEngine::bengaluru(config.seed);
        Ok(Self {
            hub: BroadcastHub::new(),
            control: Arc::new(SimulationControl::new()),
            sim: Arc::new(Mutex::new(CrowdMonitor::new(engine, config.thresholds))),
            config: Arc::new(config),
            insights: Arc::new(RuleBasedInsights),
            sources: Arc::new(sources),
        })
    }
}
