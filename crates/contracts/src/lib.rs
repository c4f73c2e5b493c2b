//! v1 cross-boundary contracts for the crowd kernel, broadcast API, and dashboard clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod serde_u64_string;
pub mod stream;

pub use stream::{
    BusFleetUpdate, BusPosition, DensityUpdate, FeedStatus, MetroNetworkSummary, MetroUpdate,
    MultiMetroUpdate, MultiZoneDensityUpdate, ResponderKind, ResponderPosition, ResponderStatus,
    RespondersUpdate, StreamEvent, WeatherReport, ZoneDensitySummary,
};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Side length of every zone density grid.
pub const GRID_SIZE: usize = 10;

/// Capacity that maps to a capacity-scaled max intensity of exactly [`BASE_MAX_INTENSITY`].
pub const REFERENCE_CAPACITY: f64 = 50_000.0;
pub const BASE_MAX_INTENSITY: f64 = 200.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    EventVenue,
    Transit,
    Commercial,
    Mixed,
    Tourist,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar distance in degrees. Good enough at city scale.
    pub fn degrees_to(&self, other: &GeoPoint) -> f64 {
        ((self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub capacity: u32,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
}

impl Zone {
    /// `200 × capacity / 50000`: larger venues sustain a higher absolute intensity.
    pub fn max_intensity(&self) -> f64 {
        BASE_MAX_INTENSITY * (f64::from(self.capacity) / REFERENCE_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CrowdPhase {
    Low,
    Building,
    Peak,
    Dispersing,
}

impl CrowdPhase {
    pub const ALL: [CrowdPhase; 4] = [
        CrowdPhase::Low,
        CrowdPhase::Building,
        CrowdPhase::Peak,
        CrowdPhase::Dispersing,
    ];

    /// The only phase this one may transition into.
    pub fn successor(self) -> Self {
        match self {
            Self::Low => Self::Building,
            Self::Building => Self::Peak,
            Self::Peak => Self::Dispersing,
            Self::Dispersing => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Building => "building",
            Self::Peak => "peak",
            Self::Dispersing => "dispersing",
        }
    }
}

impl fmt::Display for CrowdPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fractional grid coordinate of a hotspot center. Kept off-lattice so hotspots do not line up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GridPoint {
    pub i: f64,
    pub j: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Hotspot {
    pub lat: f64,
    pub lon: f64,
    pub intensity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DensityStatus {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityField {
    pub zone_id: String,
    pub zone_name: String,
    pub grid: Vec<Vec<u32>>,
    pub hotspots: Vec<Hotspot>,
    pub avg_density: f64,
    pub max_density: u32,
    pub phase: CrowdPhase,
    pub center: GeoPoint,
    pub capacity: u32,
    pub occupancy_percent: f64,
    pub status: DensityStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroStationFlow {
    pub station_id: String,
    pub station_name: String,
    pub line: String,
    pub location: GeoPoint,
    pub entry_rate: u32,
    pub exit_rate: u32,
    pub total_flow: u32,
    pub capacity: u32,
    pub capacity_percent: u32,
    pub status: FlowStatus,
    pub flow_reason: String,
    /// Phase of the coupled zone; `None` for stations running on time-of-day patterns.
    pub crowd_phase: Option<CrowdPhase>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    CrowdDensity,
    MetroFlow,
    Combined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub category: AlertCategory,
    pub zone_id: String,
    pub zone_name: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub recommendation: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thresholds {
    pub density_warning: u32,
    pub density_critical: u32,
    pub metro_flow: u32,
}

impl Thresholds {
    pub const WARNING_RANGE: (u32, u32) = (50, 300);
    pub const CRITICAL_RANGE: (u32, u32) = (100, 400);
    pub const METRO_RANGE: (u32, u32) = (20, 150);

    /// Applies whichever values are present, each clamped to its operating range.
    pub fn apply(&mut self, update: &ThresholdUpdate) {
        if let Some(warning) = update.warning {
            self.density_warning = warning.clamp(Self::WARNING_RANGE.0, Self::WARNING_RANGE.1);
        }
        if let Some(critical) = update.critical {
            self.density_critical =
                critical.clamp(Self::CRITICAL_RANGE.0, Self::CRITICAL_RANGE.1);
        }
        if let Some(metro) = update.metro {
            self.metro_flow = metro.clamp(Self::METRO_RANGE.0, Self::METRO_RANGE.1);
        }
    }

    pub fn classify(&self, max_density: u32) -> DensityStatus {
        if max_density > self.density_critical {
            DensityStatus::Critical
        } else if max_density > self.density_warning {
            DensityStatus::Warning
        } else {
            DensityStatus::Normal
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            density_warning: 150,
            density_critical: 200,
            metro_flow: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdUpdate {
    pub warning: Option<u32>,
    pub critical: Option<u32>,
    pub metro: Option<u32>,
}

// ---------------------------------------------------------------------------
// History records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityPoint {
    pub timestamp: DateTime<Utc>,
    pub zone_id: String,
    pub max_density: u32,
    pub avg_density: f64,
    pub phase: CrowdPhase,
    pub hotspot_count: usize,
}

impl DensityPoint {
    pub fn from_field(field: &DensityField, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            zone_id: field.zone_id.clone(),
            max_density: field.max_density,
            avg_density: field.avg_density,
            phase: field.phase,
            hotspot_count: field.hotspots.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroPoint {
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    pub entry_rate: u32,
    pub exit_rate: u32,
    pub total_flow: u32,
    pub status: FlowStatus,
    pub flow_reason: String,
}

impl From<&MetroStationFlow> for MetroPoint {
    fn from(flow: &MetroStationFlow) -> Self {
        Self {
            timestamp: flow.timestamp,
            station_id: flow.station_id.clone(),
            entry_rate: flow.entry_rate,
            exit_rate: flow.exit_rate,
            total_flow: flow.total_flow,
            status: flow.status,
            flow_reason: flow.flow_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub timestamp: DateTime<Utc>,
    pub zone_id: String,
    pub from_phase: CrowdPhase,
    pub to_phase: CrowdPhase,
    pub intensity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPrediction {
    pub level: AlertLevel,
    pub threshold: u32,
    pub estimated_minutes: u32,
    pub current_density: u32,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTrends {
    pub density: Trend,
    pub metro: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryCounts {
    pub total_alerts: usize,
    pub total_phase_transitions: usize,
    pub density_points: usize,
    pub metro_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistorySummary {
    pub density_history: Vec<DensityPoint>,
    pub metro_history: Vec<MetroPoint>,
    pub alert_history: Vec<Alert>,
    pub phase_transitions: Vec<PhaseTransition>,
    pub trends: HistoryTrends,
    pub prediction: Option<AlertPrediction>,
    pub counts: HistoryCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityChartPoint {
    /// `HH:MM` in UTC.
    pub time: String,
    pub max: u32,
    pub avg: f64,
    pub phase: CrowdPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetroChartPoint {
    pub time: String,
    pub entry: u32,
    pub exit: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub density_chart: Vec<DensityChartPoint>,
    pub metro_chart: Vec<MetroChartPoint>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fixed producer periods in seconds, before the speed multiplier is applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProducerIntervals {
    pub density_secs: u64,
    pub metro_secs: u64,
    pub bus_secs: u64,
    pub weather_secs: u64,
    pub responders_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for ProducerIntervals {
    fn default() -> Self {
        Self {
            density_secs: 30,
            metro_secs: 60,
            bus_secs: 30,
            weather_secs: 300,
            responders_secs: 15,
            heartbeat_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeatherSourceConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub city: String,
    pub location: GeoPoint,
    pub timeout_secs: u64,
}

impl Default for WeatherSourceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            city: "Bengaluru".to_string(),
            location: GeoPoint::new(12.9716, 77.5946),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusFeedConfig {
    /// `None` disables the live feed; the demo fleet is used instead.
    pub url: Option<String>,
    pub routes: Vec<String>,
    pub routes_per_fetch: usize,
    pub buses_per_route: usize,
    pub timeout_secs: u64,
}

impl Default for BusFeedConfig {
    fn default() -> Self {
        Self {
            url: Some("http://bmtcmob.hostg.in/api/itsroutewise/details".to_string()),
            routes: ["356", "500", "G4", "335E", "KIA-9"]
                .into_iter()
                .map(String::from)
                .collect(),
            routes_per_fetch: 2,
            buses_per_route: 10,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub schema_version: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub thresholds: Thresholds,
    pub intervals: ProducerIntervals,
    pub frontend_origin: String,
    pub weather: WeatherSourceConfig,
    pub bus_feed: BusFeedConfig,
    #[serde(skip_serializing)]
    pub insights_api_key: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: 1337,
            thresholds: Thresholds::default(),
            intervals: ProducerIntervals::default(),
            frontend_origin: "http://localhost:3000".to_string(),
            weather: WeatherSourceConfig::default(),
            bus_feed: BusFeedConfig::default(),
            insights_api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// API errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidQuery,
    InvalidCommand,
    NotFound,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
