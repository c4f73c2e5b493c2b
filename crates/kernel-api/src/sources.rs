//! Weather and bus feeds. Every failure degrades to a synthesized value; nothing here
//! surfaces an error to subscribers.

use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use contracts::{
    BusFeedConfig, BusFleetUpdate, BusPosition, FeedStatus, WeatherReport, WeatherSourceConfig,
};
use kernel_core::fallback;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} source is not configured")]
    NotConfigured(&'static str),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Payload(String),
    #[error("feed returned no usable records")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    name: Option<String>,
    main: OwmMain,
    wind: Option<OwmWind>,
    #[serde(default)]
    weather: Vec<OwmCondition>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
    icon: String,
}

impl OwmResponse {
    fn into_report(self, fallback_city: &str, now: DateTime<Utc>) -> WeatherReport {
        let condition = self.weather.into_iter().next();
        WeatherReport {
            city: self.name.unwrap_or_else(|| fallback_city.to_string()),
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            humidity: self.main.humidity.round().max(0.0) as u32,
            wind_speed: self.wind.map(|wind| wind.speed).unwrap_or(0.0),
            description: condition
                .as_ref()
                .map(|c| c.description.clone())
                .unwrap_or_default(),
            icon: condition.map(|c| c.icon).unwrap_or_default(),
            status: FeedStatus::Success,
            timestamp: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    config: WeatherSourceConfig,
}

impl WeatherClient {
    pub fn new(config: WeatherSourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn city(&self) -> &str {
        &self.config.city
    }

    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<WeatherReport, SourceError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(SourceError::NotConfigured("weather"));
        };

        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&[
                ("lat", self.config.location.lat.to_string()),
                ("lon", self.config.location.lon.to_string()),
                ("appid", api_key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: OwmResponse = response.json().await?;
        Ok(body.into_report(&self.config.city, now))
    }
}

#[derive(Debug, Clone)]
pub struct BusFeedClient {
    http: reqwest::Client,
    url: String,
    config: BusFeedConfig,
}

impl BusFeedClient {
    /// `None` when no feed url is configured.
    pub fn new(config: BusFeedConfig) -> Result<Option<Self>, SourceError> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Some(Self { http, url, config }))
    }

    /// Queries the first few routes; a route that fails is skipped rather than failing the batch.
    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<BusFleetUpdate, SourceError> {
        let mut buses = Vec::new();
        let mut last_error = None;

        for route in self.config.routes.iter().take(self.config.routes_per_fetch) {
            match self.fetch_route(route, now).await {
                Ok(mut found) => buses.append(&mut found),
                Err(err) => {
                    debug!(route = %route, error = %err, "source.bus_route_failed");
                    last_error = Some(err);
                }
            }
        }

        if buses.is_empty() {
            return Err(last_error.unwrap_or(SourceError::Empty));
        }
        Ok(BusFleetUpdate::new(buses, FeedStatus::Success, now))
    }

    async fn fetch_route(
        &self,
        route: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BusPosition>, SourceError> {
        let payload: Value = self
            .http
            .post(&self.url)
            .json(&json!({ "direction": "UP", "routeNO": route }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records = payload
            .as_array()
            .ok_or_else(|| SourceError::Payload(format!("route {route}: expected a list")))?;
        Ok(parse_bus_records(records, route, self.config.buses_per_route, now))
    }
}

/// Keeps records with usable non-zero coordinates. Coordinates may arrive as numbers or strings.
pub fn parse_bus_records(
    records: &[Value],
    route: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<BusPosition> {
    records
        .iter()
        .take(limit)
        .enumerate()
        .filter_map(|(index, record)| {
            let lat = number_field(record, "latitude")?;
            let lon = number_field(record, "longitude")?;
            if lat == 0.0 || lon == 0.0 {
                return None;
            }
            let id = ["busId", "vehicleNo"]
                .iter()
                .find_map(|key| record.get(*key).and_then(text_field))
                .unwrap_or_else(|| format!("bus_{route}_{index}"));
            Some(BusPosition {
                id,
                route: route.to_string(),
                lat,
                lon,
                speed: number_field(record, "speed").unwrap_or(0.0),
                timestamp: now,
            })
        })
        .collect()
}

fn number_field(record: &Value, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Live clients plus their synthesized fallbacks.
#[derive(Debug, Clone)]
pub struct ExternalSources {
    weather: WeatherClient,
    buses: Option<BusFeedClient>,
}

impl ExternalSources {
    pub fn new(weather: WeatherSourceConfig, buses: BusFeedConfig) -> Result<Self, SourceError> {
        Ok(Self {
            weather: WeatherClient::new(weather)?,
            buses: BusFeedClient::new(buses)?,
        })
    }

    /// Live weather, or the hour-of-day stand-in when the key is missing or the fetch fails.
    pub async fn weather(&self, now: DateTime<Utc>) -> WeatherReport {
        match self.weather.fetch(now).await {
            Ok(report) => report,
            Err(SourceError::NotConfigured(_)) => self.simulated_weather(now),
            Err(err) => {
                warn!(error = %err, "source.weather_fallback");
                self.simulated_weather(now)
            }
        }
    }

    /// Live buses, or `None` so the caller can substitute the demo fleet.
    pub async fn live_buses(&self, now: DateTime<Utc>) -> Option<BusFleetUpdate> {
        let client = self.buses.as_ref()?;
        match client.fetch(now).await {
            Ok(update) => Some(update),
            Err(err) => {
                warn!(error = %err, "source.bus_fallback");
                None
            }
        }
    }

    fn simulated_weather(&self, now: DateTime<Utc>) -> WeatherReport {
        fallback::simulated_weather(self.weather.city(), Local::now().hour(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_records_accept_string_coordinates() {
        let records: Vec<Value> = serde_json::from_value(json!([
            {"busId": "KA57F1234", "latitude": "12.97", "longitude": "77.59", "speed": 22},
            {"vehicleNo": "KA01F9", "latitude": 12.95, "longitude": 77.60},
            {"busId": "zero", "latitude": 0, "longitude": 77.6},
            {"latitude": "north", "longitude": 77.6},
            {"latitude": 12.9, "longitude": 77.5}
        ]))
        .expect("records");

        let buses = parse_bus_records(&records, "500", 10, Utc::now());
        assert_eq!(buses.len(), 3);
        assert_eq!(buses[0].id, "KA57F1234");
        assert_eq!(buses[0].speed, 22.0);
        assert_eq!(buses[1].id, "KA01F9");
        assert_eq!(buses[1].speed, 0.0);
        assert_eq!(buses[2].id, "bus_500_4");
        assert!(buses.iter().all(|bus| bus.route == "500"));
    }

    #[test]
    fn bus_records_respect_per_route_limit() {
        let records: Vec<Value> = (0..15)
            .map(|n| json!({"busId": format!("B{n}"), "latitude": 12.9, "longitude": 77.6}))
            .collect();
        assert_eq!(parse_bus_records(&records, "G4", 10, Utc::now()).len(), 10);
    }

    #[test]
    fn weather_payload_maps_to_report() {
        let body: OwmResponse = serde_json::from_value(json!({
            "name": "Bengaluru",
            "main": {"temp": 28.4, "feels_like": 29.1, "humidity": 61},
            "wind": {"speed": 4.2},
            "weather": [{"description": "scattered clouds", "icon": "03d"}]
        }))
        .expect("payload");

        let report = body.into_report("Fallback", Utc::now());
        assert_eq!(report.city, "Bengaluru");
        assert_eq!(report.humidity, 61);
        assert_eq!(report.icon, "03d");
        assert_eq!(report.status, FeedStatus::Success);
    }

    #[tokio::test]
    async fn missing_key_falls_back_to_simulated_weather() {
        let mut bus = BusFeedConfig::default();
        bus.url = None;
        let sources =
            ExternalSources::new(WeatherSourceConfig::default(), bus).expect("sources");

        let report = sources.weather(Utc::now()).await;
        assert_eq!(report.status, FeedStatus::Simulated);
        assert_eq!(report.city, "Bengaluru");
        assert!(sources.live_buses(Utc::now()).await.is_none());
    }
}
