//! Emergency-responder fleet patrolling fixed sectors of the district.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{GeoPoint, ResponderKind, ResponderPosition, ResponderStatus, RespondersUpdate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const KM_PER_DEGREE: f64 = 111.0;
/// Beyond this many degrees from its target a unit drives toward it instead of patrolling.
const APPROACH_DISTANCE: f64 = 0.02;
const APPROACH_FRACTION: f64 = 0.1;
const PATROL_STEP: f64 = 0.002;
const SPAWN_SPREAD: f64 = 0.01;
const RETARGET_CHANCE: f64 = 0.05;

const CITY_CENTER: GeoPoint = GeoPoint::new(12.9716, 77.5946);
const SECTOR_OFFSET: f64 = 0.03;

#[derive(Debug, Clone, PartialEq)]
pub struct PatrolZone {
    pub name: &'static str,
    pub location: GeoPoint,
}

pub fn patrol_zones() -> Vec<PatrolZone> {
    vec![
        PatrolZone { name: "Stadium Zone", location: GeoPoint::new(12.9789, 77.5993) },
        PatrolZone { name: "Metro Station", location: GeoPoint::new(12.9756, 77.6057) },
        PatrolZone { name: "City Center", location: CITY_CENTER },
        PatrolZone {
            name: "North Sector",
            location: GeoPoint::new(CITY_CENTER.lat + SECTOR_OFFSET, CITY_CENTER.lon),
        },
        PatrolZone {
            name: "South Sector",
            location: GeoPoint::new(CITY_CENTER.lat - SECTOR_OFFSET, CITY_CENTER.lon),
        },
        PatrolZone {
            name: "East Sector",
            location: GeoPoint::new(CITY_CENTER.lat, CITY_CENTER.lon + SECTOR_OFFSET),
        },
        PatrolZone {
            name: "West Sector",
            location: GeoPoint::new(CITY_CENTER.lat, CITY_CENTER.lon - SECTOR_OFFSET),
        },
    ]
}

struct KindProfile {
    kind: ResponderKind,
    label: &'static str,
    count: usize,
    speed_kmh: (u32, u32),
}

static FLEET: [KindProfile; 4] = [
    KindProfile { kind: ResponderKind::Police, label: "Police Patrol", count: 6, speed_kmh: (30, 60) },
    KindProfile { kind: ResponderKind::Ambulance, label: "Ambulance", count: 4, speed_kmh: (40, 80) },
    KindProfile { kind: ResponderKind::Fire, label: "Fire Truck", count: 3, speed_kmh: (35, 70) },
    KindProfile { kind: ResponderKind::Emergency, label: "Emergency Response", count: 2, speed_kmh: (45, 85) },
];

fn profile(kind: ResponderKind) -> &'static KindProfile {
    match kind {
        ResponderKind::Police => &FLEET[0],
        ResponderKind::Ambulance => &FLEET[1],
        ResponderKind::Fire => &FLEET[2],
        ResponderKind::Emergency => &FLEET[3],
    }
}

#[derive(Debug, Clone)]
pub struct Responder {
    pub id: String,
    pub vehicle_id: String,
    pub kind: ResponderKind,
    pub position: GeoPoint,
    pub target: usize,
    pub status: ResponderStatus,
    pub speed_kmh: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyResponder {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ResponderKind,
    pub name: String,
    pub status: ResponderStatus,
    pub distance_km: f64,
    pub eta_minutes: f64,
}

#[derive(Debug, Clone)]
pub struct ResponderFleet {
    zones: Vec<PatrolZone>,
    units: Vec<Responder>,
}

impl ResponderFleet {
    pub fn spawn<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let zones = patrol_zones();
        let mut units = Vec::new();
        let mut serial = 0_usize;

        for fleet_entry in FLEET.iter() {
            for index in 1..=fleet_entry.count {
                serial += 1;
                let target = serial % zones.len();
                let home = zones[target].location;
                let kind_tag = format!("{:?}", fleet_entry.kind).to_uppercase();
                units.push(Responder {
                    id: format!("{kind_tag}-{index:02}"),
                    vehicle_id: format!("KA01-{}-{}", &kind_tag[..2], 1000 + serial),
                    kind: fleet_entry.kind,
                    position: GeoPoint::new(
                        home.lat + rng.gen_range(-SPAWN_SPREAD..=SPAWN_SPREAD),
                        home.lon + rng.gen_range(-SPAWN_SPREAD..=SPAWN_SPREAD),
                    ),
                    target,
                    status: ResponderStatus::Patrolling,
                    speed_kmh: rng.gen_range(fleet_entry.speed_kmh.0..=fleet_entry.speed_kmh.1),
                });
            }
        }

        Self { zones, units }
    }

    pub fn units(&self) -> &[Responder] {
        &self.units
    }

    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for unit in &mut self.units {
            let target = self.zones[unit.target].location;
            let lat_gap = target.lat - unit.position.lat;
            let lon_gap = target.lon - unit.position.lon;

            if lat_gap.abs() > APPROACH_DISTANCE || lon_gap.abs() > APPROACH_DISTANCE {
                unit.position.lat +=
                    lat_gap * APPROACH_FRACTION + rng.gen_range(-PATROL_STEP..=PATROL_STEP);
                unit.position.lon +=
                    lon_gap * APPROACH_FRACTION + rng.gen_range(-PATROL_STEP..=PATROL_STEP);
            } else {
                unit.position.lat += rng.gen_range(-PATROL_STEP..=PATROL_STEP);
                unit.position.lon += rng.gen_range(-PATROL_STEP..=PATROL_STEP);
            }

            if rng.gen_bool(RETARGET_CHANCE) {
                unit.target = rng.gen_range(0..self.zones.len());
                unit.status = [
                    ResponderStatus::Patrolling,
                    ResponderStatus::Responding,
                    ResponderStatus::OnScene,
                    ResponderStatus::Available,
                ]
                .choose(rng)
                .copied()
                .unwrap_or(ResponderStatus::Patrolling);
            }

            let range = profile(unit.kind).speed_kmh;
            unit.speed_kmh = rng.gen_range(range.0..=range.1);
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RespondersUpdate {
        let mut responders: Vec<ResponderPosition> = self
            .units
            .iter()
            .map(|unit| ResponderPosition {
                id: unit.id.clone(),
                vehicle_id: unit.vehicle_id.clone(),
                kind: unit.kind,
                name: profile(unit.kind).label.to_string(),
                lat: unit.position.lat,
                lon: unit.position.lon,
                speed: unit.speed_kmh,
                status: unit.status,
                zone: self.zones[unit.target].name.to_string(),
                timestamp: now,
            })
            .collect();
        responders.sort_by(|a, b| (a.kind, &a.id).cmp(&(b.kind, &b.id)));

        let mut active_units = BTreeMap::new();
        for responder in &responders {
            *active_units.entry(responder.kind).or_insert(0) += 1;
        }

        RespondersUpdate {
            count: responders.len(),
            responders,
            active_units,
            timestamp: now,
        }
    }

    /// Units within `radius_deg` of a point, nearest first.
    pub fn nearby(&self, location: GeoPoint, radius_deg: f64) -> Vec<NearbyResponder> {
        let mut found: Vec<NearbyResponder> = self
            .units
            .iter()
            .filter_map(|unit| {
                let degrees = unit.position.degrees_to(&location);
                if degrees > radius_deg {
                    return None;
                }
                let distance_km = degrees * KM_PER_DEGREE;
                Some(NearbyResponder {
                    id: unit.id.clone(),
                    kind: unit.kind,
                    name: profile(unit.kind).label.to_string(),
                    status: unit.status,
                    distance_km,
                    eta_minutes: distance_km / (f64::from(unit.speed_kmh.max(1)) / 60.0),
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        found
    }
}
