//! Owns every piece of mutable simulation state. Single writer: callers that share an engine
//! across tasks wrap it in a lock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{
    BusFleetUpdate, DensityField, DensityStatus, GeoPoint, MetroNetworkSummary, MetroStationFlow,
    PhaseTransition, RespondersUpdate, Thresholds, ZoneDensitySummary,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::density;
use crate::fallback;
use crate::metro::{self, MetroNetwork};
use crate::phase::{self, ZoneState};
use crate::registry::ZoneRegistry;
use crate::responders::ResponderFleet;

/// Output of one density tick, keyed by zone id.
#[derive(Debug, Clone)]
pub struct DensityTick {
    pub tick: u64,
    pub fields: BTreeMap<String, DensityField>,
    pub transitions: Vec<PhaseTransition>,
    pub summary: ZoneDensitySummary,
}

#[derive(Debug, Clone)]
pub struct MetroTick {
    pub flows: Vec<MetroStationFlow>,
    pub summary: MetroNetworkSummary,
}

impl MetroTick {
    pub fn station(&self, station_id: &str) -> Option<&MetroStationFlow> {
        self.flows.iter().find(|flow| flow.station_id == station_id)
    }
}

#[derive(Debug)]
pub struct SimulationEngine {
    registry: ZoneRegistry,
    metro: MetroNetwork,
    zones: BTreeMap<String, ZoneState>,
    responders: ResponderFleet,
    rng: ChaCha8Rng,
    tick: u64,
}

impl SimulationEngine {
    pub fn new(registry: ZoneRegistry, metro: MetroNetwork, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let responders = ResponderFleet::spawn(&mut rng);
        Self {
            registry,
            metro,
            zones: BTreeMap::new(),
            responders,
            rng,
            tick: 0,
        }
    }

    pub fn bengaluru(seed: u64) -> Self {
        Self::new(ZoneRegistry::bengaluru(), MetroNetwork::bengaluru(), seed)
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn metro(&self) -> &MetroNetwork {
        &self.metro
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn zone_states(&self) -> &BTreeMap<String, ZoneState> {
        &self.zones
    }

    pub fn zone_state(&self, zone_id: &str) -> Option<&ZoneState> {
        self.zones.get(zone_id)
    }

    pub fn responders(&self) -> &ResponderFleet {
        &self.responders
    }

    /// Advances every zone one phase step and builds its density field.
    pub fn step_density(&mut self, thresholds: &Thresholds, now: DateTime<Utc>) -> DensityTick {
        self.tick = self.tick.saturating_add(1);
        let mut fields = BTreeMap::new();
        let mut transitions = Vec::new();

        for zone in self.registry.zones() {
            let rng = &mut self.rng;
            let current = self
                .zones
                .entry(zone.id.clone())
                .or_insert_with(|| ZoneState::seeded(zone, rng));

            let (next, change) = phase::advance(current, zone, rng);
            *current = next;

            if let Some(change) = change {
                info!(
                    zone = %zone.id,
                    from = %change.from,
                    to = %change.to,
                    intensity = change.intensity,
                    "zone.phase_changed"
                );
                transitions.push(PhaseTransition {
                    timestamp: now,
                    zone_id: zone.id.clone(),
                    from_phase: change.from,
                    to_phase: change.to,
                    intensity: change.intensity,
                });
            }

            let field = density::generate(current, zone, thresholds, rng);
            fields.insert(zone.id.clone(), field);
        }

        let summary = self.summarize(&fields);
        debug!(
            tick = self.tick,
            max_density = summary.max_density_overall,
            critical = summary.critical_zones.len(),
            warning = summary.warning_zones.len(),
            "density.tick"
        );

        DensityTick {
            tick: self.tick,
            fields,
            transitions,
            summary,
        }
    }

    pub fn step_metro(&mut self, hour: u32, now: DateTime<Utc>) -> MetroTick {
        let flows = self.metro.sample(&self.zones, hour, now, &mut self.rng);
        let crowd_phase = self
            .zones
            .get(&self.registry.primary_zone().id)
            .map(|state| state.phase);
        let summary = metro::summarize(&flows, crowd_phase);
        MetroTick { flows, summary }
    }

    pub fn step_responders(&mut self, now: DateTime<Utc>) -> RespondersUpdate {
        self.responders.step(&mut self.rng);
        self.responders.snapshot(now)
    }

    pub fn demo_buses(&mut self, center: GeoPoint, now: DateTime<Utc>) -> BusFleetUpdate {
        fallback::demo_buses(center, now, &mut self.rng)
    }

    fn summarize(&self, fields: &BTreeMap<String, DensityField>) -> ZoneDensitySummary {
        let mut summary = ZoneDensitySummary {
            total_zones: fields.len(),
            total_people_estimate: 0,
            max_density_overall: 0,
            critical_zones: Vec::new(),
            warning_zones: Vec::new(),
            all_hotspots: Vec::new(),
        };

        for zone in self.registry.zones() {
            let Some(field) = fields.get(&zone.id) else {
                continue;
            };
            summary.total_people_estimate += (field.avg_density * 100.0) as u64;
            summary.max_density_overall = summary.max_density_overall.max(field.max_density);
            match field.status {
                DensityStatus::Critical => summary.critical_zones.push(zone.name.clone()),
                DensityStatus::Warning => summary.warning_zones.push(zone.name.clone()),
                DensityStatus::Normal => {}
            }
            summary.all_hotspots.extend(field.hotspots.iter().copied());
        }

        summary
    }
}
