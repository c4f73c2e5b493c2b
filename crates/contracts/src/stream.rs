//! Events pushed to dashboard subscribers over the duplex channel, discriminated by `type`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Alert, AlertPrediction, CrowdPhase, DensityField, GeoPoint, Hotspot, MetroStationFlow, Trend,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// Live data from the upstream provider.
    Success,
    /// Synthesized because no credentials are configured or the fetch failed.
    Simulated,
    /// Synthesized fleet standing in for an unavailable live feed.
    Demo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u32,
    pub wind_speed: f64,
    pub description: String,
    pub icon: String,
    pub status: FeedStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusPosition {
    pub id: String,
    pub route: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusFleetUpdate {
    pub count: usize,
    pub buses: Vec<BusPosition>,
    pub status: FeedStatus,
    pub timestamp: DateTime<Utc>,
}

impl BusFleetUpdate {
    pub fn new(buses: Vec<BusPosition>, status: FeedStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            count: buses.len(),
            buses,
            status,
            timestamp,
        }
    }
}

/// Legacy single-station feed for the paired transit station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroUpdate {
    #[serde(flatten)]
    pub flow: MetroStationFlow,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroNetworkSummary {
    pub total_stations: usize,
    pub total_entry_rate: u32,
    pub total_exit_rate: u32,
    pub total_flow: u32,
    pub crowd_phase: Option<CrowdPhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiMetroUpdate {
    pub stations: Vec<MetroStationFlow>,
    pub summary: MetroNetworkSummary,
    pub timestamp: DateTime<Utc>,
}

/// Legacy single-zone feed for the registry's primary zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityUpdate {
    pub zone_id: String,
    pub grid: Vec<Vec<u32>>,
    pub hotspots: Vec<Hotspot>,
    pub avg_density: f64,
    pub max_density: u32,
    pub phase: CrowdPhase,
    pub center_location: GeoPoint,
    pub grid_size: usize,
    pub trend: Trend,
    pub prediction: Option<AlertPrediction>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneDensitySummary {
    pub total_zones: usize,
    pub total_people_estimate: u64,
    pub max_density_overall: u32,
    pub critical_zones: Vec<String>,
    pub warning_zones: Vec<String>,
    pub all_hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiZoneDensityUpdate {
    pub zones: BTreeMap<String, DensityField>,
    pub summary: ZoneDensitySummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Police,
    Ambulance,
    Fire,
    Emergency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResponderStatus {
    Patrolling,
    Responding,
    OnScene,
    Available,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponderPosition {
    pub id: String,
    pub vehicle_id: String,
    #[serde(rename = "type")]
    pub kind: ResponderKind,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: u32,
    pub status: ResponderStatus,
    pub zone: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RespondersUpdate {
    pub count: usize,
    pub responders: Vec<ResponderPosition>,
    pub active_units: BTreeMap<ResponderKind, usize>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connection {
        message: String,
        subscriber_id: u64,
        timestamp: DateTime<Utc>,
    },
    Test {
        message: String,
        active_connections: usize,
        timestamp: DateTime<Utc>,
    },
    Echo {
        received: Value,
        timestamp: DateTime<Utc>,
    },
    GpsUpdate(BusFleetUpdate),
    WeatherUpdate(WeatherReport),
    MetroUpdate(MetroUpdate),
    MultiMetroUpdate(MultiMetroUpdate),
    DensityUpdate(DensityUpdate),
    MultiZoneDensityUpdate(MultiZoneDensityUpdate),
    FirstRespondersUpdate(RespondersUpdate),
    Alert(Alert),
}

impl StreamEvent {
    pub fn connection(subscriber_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self::Connection {
            message: "Successfully connected to the crowd safety feed".to_string(),
            subscriber_id,
            timestamp,
        }
    }

    /// Wraps parsed client JSON for the echo reply.
    pub fn echo(received: Value, timestamp: DateTime<Utc>) -> Self {
        Self::Echo {
            received,
            timestamp,
        }
    }

    /// Wire name of the `type` discriminator, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Test { .. } => "test",
            Self::Echo { .. } => "echo",
            Self::GpsUpdate(_) => "gps_update",
            Self::WeatherUpdate(_) => "weather_update",
            Self::MetroUpdate(_) => "metro_update",
            Self::MultiMetroUpdate(_) => "multi_metro_update",
            Self::DensityUpdate(_) => "density_update",
            Self::MultiZoneDensityUpdate(_) => "multi_zone_density_update",
            Self::FirstRespondersUpdate(_) => "first_responders_update",
            Self::Alert(_) => "alert",
        }
    }
}
