//! One density or metro tick end to end: step the engine, evaluate alerts, record history.
//!
//! The server producers and the headless CLI both drive the simulation through this type, so
//! what gets recorded per tick is defined once.

use chrono::{DateTime, Utc};
use contracts::{
    Alert, AlertPrediction, DensityField, DensityPoint, MetroPoint, MetroStationFlow, Thresholds,
    Trend, ZoneDensitySummary,
};
use thiserror::Error;

use crate::alerts::AlertEvaluator;
use crate::engine::{DensityTick, MetroTick, SimulationEngine};
use crate::history::{HistoryEntry, HistoryRecorder, SeriesKind};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("density tick produced no field for primary zone {0}")]
    MissingZone(String),
}

/// Result of [`CrowdMonitor::density_tick`], already recorded in history.
#[derive(Debug, Clone)]
pub struct DensityOutcome {
    pub tick: DensityTick,
    /// Field of the registry's primary zone, the one the density series tracks.
    pub primary: DensityField,
    pub alerts: Vec<Alert>,
    pub trend: Trend,
    pub prediction: Option<AlertPrediction>,
}

#[derive(Debug, Clone)]
pub struct MetroOutcome {
    pub tick: MetroTick,
    /// Station paired with a monitored zone, when the network has one.
    pub paired: Option<MetroStationFlow>,
    pub alert: Option<Alert>,
    pub trend: Trend,
}

/// Engine plus everything derived from its ticks. Single writer, like the engine.
#[derive(Debug)]
pub struct CrowdMonitor {
    pub engine: SimulationEngine,
    pub history: HistoryRecorder,
    pub thresholds: Thresholds,
    pub latest_summary: Option<ZoneDensitySummary>,
    pub latest_metro: Option<MetroStationFlow>,
}

impl CrowdMonitor {
    pub fn new(engine: SimulationEngine, thresholds: Thresholds) -> Self {
        Self {
            engine,
            history: HistoryRecorder::new(),
            thresholds,
            latest_summary: None,
            latest_metro: None,
        }
    }

    /// `tick_secs` is the density interval, used to turn the predicted tick count into minutes.
    pub fn density_tick(
        &mut self,
        now: DateTime<Utc>,
        tick_secs: u64,
    ) -> Result<DensityOutcome, MonitorError> {
        let thresholds = self.thresholds;
        let tick = self.engine.step_density(&thresholds, now);
        let alerts = AlertEvaluator::new(self.engine.registry(), thresholds).evaluate(
            &tick.fields,
            self.latest_metro.as_ref(),
            now,
        );

        let primary_id = &self.engine.registry().primary_zone().id;
        let primary = tick
            .fields
            .get(primary_id)
            .cloned()
            .ok_or_else(|| MonitorError::MissingZone(primary_id.clone()))?;

        self.history
            .record(HistoryEntry::Density(DensityPoint::from_field(&primary, now)));
        for transition in &tick.transitions {
            self.history
                .record(HistoryEntry::PhaseTransition(transition.clone()));
        }
        for alert in &alerts {
            self.history.record(HistoryEntry::Alert(alert.clone()));
        }
        self.latest_summary = Some(tick.summary.clone());

        Ok(DensityOutcome {
            trend: self.history.trend(SeriesKind::Density),
            prediction: self.history.predict_next_alert(&thresholds, tick_secs),
            tick,
            primary,
            alerts,
        })
    }

    pub fn metro_tick(&mut self, hour: u32, now: DateTime<Utc>) -> MetroOutcome {
        let tick = self.engine.step_metro(hour, now);
        let paired = self
            .engine
            .registry()
            .pairing()
            .and_then(|pairing| tick.station(&pairing.station_id))
            .cloned();

        let mut alert = None;
        if let Some(flow) = &paired {
            self.history.record(HistoryEntry::Metro(MetroPoint::from(flow)));
            alert = AlertEvaluator::new(self.engine.registry(), self.thresholds)
                .evaluate_metro(flow, now);
            if let Some(alert) = &alert {
                self.history.record(HistoryEntry::Alert(alert.clone()));
            }
            self.latest_metro = Some(flow.clone());
        }

        MetroOutcome {
            trend: self.history.trend(SeriesKind::Metro),
            tick,
            paired,
            alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn density_tick_records_primary_zone_transitions_and_alerts() {
        let mut monitor = CrowdMonitor::new(SimulationEngine::bengaluru(11), Thresholds::default());
        let start = Utc::now();
        let mut alerts = 0;
        let mut transitions = 0;
        for n in 0..40 {
            let outcome = monitor
                .density_tick(start + Duration::seconds(30 * n), 30)
                .expect("primary zone present");
            assert_eq!(outcome.primary.zone_id, "stadium");
            alerts += outcome.alerts.len();
            transitions += outcome.tick.transitions.len();
        }

        let counts = monitor.history.counts();
        assert_eq!(counts.density_points, 40);
        assert_eq!(counts.total_alerts, alerts.min(crate::history::ALERT_CAPACITY));
        assert_eq!(
            counts.total_phase_transitions,
            transitions.min(crate::history::TRANSITION_CAPACITY)
        );
        assert!(monitor.latest_summary.is_some());
    }

    #[test]
    fn metro_tick_keeps_paired_station_for_combined_alert() {
        let mut monitor = CrowdMonitor::new(SimulationEngine::bengaluru(5), Thresholds::default());
        let outcome = monitor.metro_tick(18, Utc::now());

        let paired = outcome.paired.expect("stadium is paired with a station");
        assert_eq!(paired.station_id, "mg_road");
        assert_eq!(monitor.latest_metro.as_ref(), Some(&paired));
        assert_eq!(monitor.history.metro().len(), 1);
        assert_eq!(outcome.trend, Trend::Stable);
    }
}
