//! Threshold checks over one tick's density fields and metro flow.
//!
//! Every tick is evaluated on its own. A zone that stays critical produces a critical alert on
//! every tick it stays critical.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{
    Alert, AlertCategory, AlertLevel, DensityField, MetroStationFlow, Thresholds, Zone,
};

use crate::registry::ZoneRegistry;

const CRITICAL_DENSITY_ACTION: &str =
    "Open auxiliary exits, deploy additional marshals, and hold further entry";
const WARNING_DENSITY_ACTION: &str = "Monitor closely and stage crowd-control staff nearby";
const COMBINED_ACTION: &str =
    "Coordinate with metro operations to stagger train arrivals and meter platform access";
const METRO_FLOW_ACTION: &str = "Add platform staff and hold arrivals at station entrances";

pub struct AlertEvaluator<'a> {
    registry: &'a ZoneRegistry,
    thresholds: Thresholds,
}

impl<'a> AlertEvaluator<'a> {
    pub fn new(registry: &'a ZoneRegistry, thresholds: Thresholds) -> Self {
        Self {
            registry,
            thresholds,
        }
    }

    /// Per-zone alerts in registry order, then the combined alert if it fires.
    pub fn evaluate(
        &self,
        fields: &BTreeMap<String, DensityField>,
        metro: Option<&MetroStationFlow>,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for zone in self.registry.zones() {
            let Some(field) = fields.get(&zone.id) else {
                continue;
            };
            if let Some(alert) = self.density_alert(zone, field, now) {
                alerts.push(alert);
            }
        }

        if let Some(alert) = self.combined_alert(fields, metro, now) {
            alerts.push(alert);
        }

        alerts
    }

    /// Warns when the paired station's exit rate alone exceeds the metro threshold.
    pub fn evaluate_metro(&self, flow: &MetroStationFlow, now: DateTime<Utc>) -> Option<Alert> {
        let pairing = self.registry.pairing()?;
        if flow.station_id != pairing.station_id || flow.exit_rate <= self.thresholds.metro_flow {
            return None;
        }

        Some(Alert {
            level: AlertLevel::Warning,
            category: AlertCategory::MetroFlow,
            zone_id: pairing.zone_id.clone(),
            zone_name: flow.station_name.clone(),
            message: format!(
                "High metro exit flow at {}: {} passengers/min",
                flow.station_name, flow.exit_rate
            ),
            value: f64::from(flow.exit_rate),
            threshold: f64::from(self.thresholds.metro_flow),
            recommendation: METRO_FLOW_ACTION.to_string(),
            location: flow.location,
            timestamp: now,
        })
    }

    fn density_alert(&self, zone: &Zone, field: &DensityField, now: DateTime<Utc>) -> Option<Alert> {
        let (level, threshold, message, recommendation) =
            if field.max_density > self.thresholds.density_critical {
                (
                    AlertLevel::Critical,
                    self.thresholds.density_critical,
                    format!("Critical crowd density at {}", zone.name),
                    CRITICAL_DENSITY_ACTION,
                )
            } else if field.max_density > self.thresholds.density_warning {
                (
                    AlertLevel::Warning,
                    self.thresholds.density_warning,
                    format!("Elevated crowd density at {}", zone.name),
                    WARNING_DENSITY_ACTION,
                )
            } else {
                return None;
            };

        Some(Alert {
            level,
            category: AlertCategory::CrowdDensity,
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            message,
            value: f64::from(field.max_density),
            threshold: f64::from(threshold),
            recommendation: recommendation.to_string(),
            location: field
                .hotspots
                .first()
                .map(|hotspot| contracts::GeoPoint::new(hotspot.lat, hotspot.lon))
                .unwrap_or(zone.center),
            timestamp: now,
        })
    }

    fn combined_alert(
        &self,
        fields: &BTreeMap<String, DensityField>,
        metro: Option<&MetroStationFlow>,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let pairing = self.registry.pairing()?;
        let flow = metro.filter(|flow| flow.station_id == pairing.station_id)?;
        let field = fields.get(&pairing.zone_id)?;
        let zone = self.registry.get(&pairing.zone_id)?;

        let dense = field.max_density > self.thresholds.density_warning;
        let draining = flow.exit_rate > self.thresholds.metro_flow;
        if !(dense && draining) {
            return None;
        }

        Some(Alert {
            level: AlertLevel::Critical,
            category: AlertCategory::Combined,
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            message: format!(
                "High density at {} while {} exits {} passengers/min",
                zone.name, flow.station_name, flow.exit_rate
            ),
            value: f64::from(flow.exit_rate),
            threshold: f64::from(self.thresholds.metro_flow),
            recommendation: COMBINED_ACTION.to_string(),
            location: zone.center,
            timestamp: now,
        })
    }
}
