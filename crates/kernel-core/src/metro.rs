//! Metro passenger flow, coupled to nearby zone phases where a station serves a zone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{CrowdPhase, FlowStatus, GeoPoint, MetroNetworkSummary, MetroStationFlow};
use rand::Rng;

use crate::phase::ZoneState;

/// Rates below are quoted for a station of this capacity.
const BASE_STATION_CAPACITY: f64 = 15_000.0;
const RATE_NOISE: i64 = 5;
const MIN_RATE: i64 = 10;
/// Intensity at which arrivals saturate during `building`.
const ARRIVAL_SATURATION: f64 = 180.0;
/// Ticks over which departures taper during `dispersing`.
const DEPARTURE_TAPER_TICKS: f64 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MetroStation {
    pub id: String,
    pub name: String,
    pub line: String,
    pub location: GeoPoint,
    pub capacity: u32,
    /// Zone whose phase drives this station; `None` follows time-of-day patterns.
    pub coupled_zone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetroNetwork {
    stations: Vec<MetroStation>,
}

struct BaseFlow {
    entry: i64,
    exit: i64,
    status: FlowStatus,
    reason: &'static str,
}

impl MetroNetwork {
    pub fn new(stations: Vec<MetroStation>) -> Self {
        Self { stations }
    }

    pub fn bengaluru() -> Self {
        Self::new(vec![
            station("mg_road", "MG Road Metro", "Blue Line", 12.9756, 77.6057, 15_000, Some("mg_road_metro")),
            station("majestic", "Majestic Metro", "Green Line", 12.9767, 77.5713, 20_000, Some("majestic")),
            station("indiranagar", "Indiranagar Metro", "Purple Line", 12.9784, 77.6408, 12_000, Some("indiranagar")),
            station("electronic_city", "Electronic City Metro", "Yellow Line", 12.8450, 77.6628, 18_000, None),
        ])
    }

    pub fn stations(&self) -> &[MetroStation] {
        &self.stations
    }

    pub fn get(&self, station_id: &str) -> Option<&MetroStation> {
        self.stations.iter().find(|station| station.id == station_id)
    }

    /// Samples every station, in catalog order.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        zones: &BTreeMap<String, ZoneState>,
        hour: u32,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<MetroStationFlow> {
        self.stations
            .iter()
            .map(|station| {
                let zone = station
                    .coupled_zone
                    .as_deref()
                    .and_then(|zone_id| zones.get(zone_id));
                station_flow(station, zone, hour, now, rng)
            })
            .collect()
    }
}

pub fn station_flow<R: Rng + ?Sized>(
    station: &MetroStation,
    zone: Option<&ZoneState>,
    hour: u32,
    now: DateTime<Utc>,
    rng: &mut R,
) -> MetroStationFlow {
    let base = match zone {
        Some(state) => phase_flow(state, rng),
        None => hourly_flow(hour, rng),
    };

    let scale = f64::from(station.capacity) / BASE_STATION_CAPACITY;
    let entry = ((base.entry as f64 * scale) as i64 + rng.gen_range(-RATE_NOISE..=RATE_NOISE))
        .max(MIN_RATE) as u32;
    let exit = ((base.exit as f64 * scale) as i64 + rng.gen_range(-RATE_NOISE..=RATE_NOISE))
        .max(MIN_RATE) as u32;
    let total = entry + exit;
    let max_flow = (station.capacity / 100).max(1);

    MetroStationFlow {
        station_id: station.id.clone(),
        station_name: station.name.clone(),
        line: station.line.clone(),
        location: station.location,
        entry_rate: entry,
        exit_rate: exit,
        total_flow: total,
        capacity: station.capacity,
        capacity_percent: (total.saturating_mul(100) / max_flow).min(100),
        status: base.status,
        flow_reason: base.reason.to_string(),
        crowd_phase: zone.map(|state| state.phase),
        timestamp: now,
    }
}

pub fn summarize(flows: &[MetroStationFlow], crowd_phase: Option<CrowdPhase>) -> MetroNetworkSummary {
    let total_entry_rate: u32 = flows.iter().map(|flow| flow.entry_rate).sum();
    let total_exit_rate: u32 = flows.iter().map(|flow| flow.exit_rate).sum();
    MetroNetworkSummary {
        total_stations: flows.len(),
        total_entry_rate,
        total_exit_rate,
        total_flow: total_entry_rate + total_exit_rate,
        crowd_phase,
    }
}

fn phase_flow<R: Rng + ?Sized>(state: &ZoneState, rng: &mut R) -> BaseFlow {
    match state.phase {
        CrowdPhase::Building => {
            let arriving = (state.intensity / ARRIVAL_SATURATION).min(1.0);
            BaseFlow {
                entry: rng.gen_range(30..=45),
                exit: (50.0 + arriving * 50.0) as i64,
                status: FlowStatus::High,
                reason: "Arrivals",
            }
        }
        CrowdPhase::Peak => BaseFlow {
            entry: rng.gen_range(25..=40),
            exit: rng.gen_range(35..=55),
            status: FlowStatus::Moderate,
            reason: "Stable",
        },
        CrowdPhase::Dispersing => {
            let progress = (f64::from(state.phase_duration) / DEPARTURE_TAPER_TICKS).min(1.0);
            BaseFlow {
                entry: rng.gen_range(20..=35),
                exit: (90.0 - progress * 40.0) as i64,
                status: FlowStatus::High,
                reason: "Departures",
            }
        }
        CrowdPhase::Low => BaseFlow {
            entry: rng.gen_range(15..=25),
            exit: rng.gen_range(15..=25),
            status: FlowStatus::Low,
            reason: "Normal",
        },
    }
}

fn hourly_flow<R: Rng + ?Sized>(hour: u32, rng: &mut R) -> BaseFlow {
    match hour {
        8..=10 => BaseFlow {
            entry: rng.gen_range(60..=90),
            exit: rng.gen_range(30..=50),
            status: FlowStatus::High,
            reason: "Morning Rush",
        },
        17..=20 => BaseFlow {
            entry: rng.gen_range(40..=60),
            exit: rng.gen_range(70..=100),
            status: FlowStatus::High,
            reason: "Evening Rush",
        },
        _ => BaseFlow {
            entry: rng.gen_range(20..=35),
            exit: rng.gen_range(20..=35),
            status: FlowStatus::Moderate,
            reason: "Normal",
        },
    }
}

fn station(
    id: &str,
    name: &str,
    line: &str,
    lat: f64,
    lon: f64,
    capacity: u32,
    coupled_zone: Option<&str>,
) -> MetroStation {
    MetroStation {
        id: id.to_string(),
        name: name.to_string(),
        line: line.to_string(),
        location: GeoPoint::new(lat, lon),
        capacity,
        coupled_zone: coupled_zone.map(str::to_string),
    }
}
