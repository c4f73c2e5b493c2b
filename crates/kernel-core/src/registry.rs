//! Static catalog of monitored zones.

use std::collections::BTreeSet;

use contracts::{GeoPoint, Zone, ZoneType};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("zone registry is empty")]
    Empty,
    #[error("duplicate zone id: {0}")]
    DuplicateZone(String),
    #[error("zone {0} has zero capacity")]
    ZeroCapacity(String),
    #[error("designated zone {0} is not registered")]
    UnknownZone(String),
}

/// A transit zone whose density is cross-checked against a metro station's exit rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitPairing {
    pub zone_id: String,
    pub station_id: String,
}

/// Immutable after construction. Iteration order is registration order.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    primary_zone: String,
    pairing: Option<TransitPairing>,
}

impl ZoneRegistry {
    pub fn new(
        zones: Vec<Zone>,
        primary_zone: impl Into<String>,
        pairing: Option<TransitPairing>,
    ) -> Result<Self, RegistryError> {
        if zones.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = BTreeSet::new();
        for zone in &zones {
            if !seen.insert(zone.id.as_str()) {
                return Err(RegistryError::DuplicateZone(zone.id.clone()));
            }
            if zone.capacity == 0 {
                return Err(RegistryError::ZeroCapacity(zone.id.clone()));
            }
        }

        let primary_zone = primary_zone.into();
        if !seen.contains(primary_zone.as_str()) {
            return Err(RegistryError::UnknownZone(primary_zone));
        }
        if let Some(pairing) = &pairing {
            if !seen.contains(pairing.zone_id.as_str()) {
                return Err(RegistryError::UnknownZone(pairing.zone_id.clone()));
            }
        }

        Ok(Self {
            zones,
            primary_zone,
            pairing,
        })
    }

    /// The district the dashboard ships with.
    pub fn bengaluru() -> Self {
        let zones = vec![
            zone("stadium", "Chinnaswamy Stadium", 12.9789, 77.5993, 500.0, 40_000, ZoneType::EventVenue),
            zone("mg_road_metro", "MG Road Metro", 12.9756, 77.6057, 300.0, 45_000, ZoneType::Transit),
            zone("majestic", "Majestic Bus Stand", 12.9767, 77.5713, 400.0, 50_000, ZoneType::Transit),
            zone("electronic_city", "Electronic City", 12.8450, 77.6628, 800.0, 35_000, ZoneType::Commercial),
            zone("koramangala", "Koramangala", 12.9352, 77.6245, 600.0, 30_000, ZoneType::Commercial),
            zone("indiranagar", "Indiranagar", 12.9784, 77.6408, 500.0, 25_000, ZoneType::Mixed),
            zone("cubbon_park", "Cubbon Park", 12.9763, 77.5929, 700.0, 20_000, ZoneType::Tourist),
        ];
        let pairing = TransitPairing {
            zone_id: "mg_road_metro".to_string(),
            station_id: "mg_road".to_string(),
        };

        Self {
            zones,
            primary_zone: "stadium".to_string(),
            pairing: Some(pairing),
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == zone_id)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn primary_zone(&self) -> &Zone {
        // Validated at construction.
        self.get(&self.primary_zone).unwrap_or(&self.zones[0])
    }

    pub fn pairing(&self) -> Option<&TransitPairing> {
        self.pairing.as_ref()
    }
}

fn zone(
    id: &str,
    name: &str,
    lat: f64,
    lon: f64,
    radius_m: f64,
    capacity: u32,
    zone_type: ZoneType,
) -> Zone {
    Zone {
        id: id.to_string(),
        name: name.to_string(),
        center: GeoPoint::new(lat, lon),
        radius_m,
        capacity,
        zone_type,
    }
}
