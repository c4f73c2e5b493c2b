//! Deterministic stand-ins for the weather and bus feeds.

use chrono::{DateTime, Utc};
use contracts::{BusFleetUpdate, BusPosition, FeedStatus, GeoPoint, WeatherReport};
use rand::Rng;

pub const DEMO_ROUTES: [&str; 8] = ["356", "500", "G4", "335E", "KIA-9", "41C", "201A", "283D"];
const DEMO_SPREAD: f64 = 0.05;
const DEMO_SPEED_KMH: (u32, u32) = (10, 40);

/// Hour-of-day weather, so the dashboard reads sensibly without an API key.
pub fn simulated_weather(city: &str, hour: u32, now: DateTime<Utc>) -> WeatherReport {
    let (temperature, description, icon) = match hour {
        6..=11 => (26.0, "Clear morning", "01d"),
        12..=17 => (30.0, "Partly cloudy", "02d"),
        18..=21 => (27.0, "Clear evening", "01n"),
        _ => (24.0, "Clear night", "01n"),
    };

    WeatherReport {
        city: city.to_string(),
        temperature,
        feels_like: temperature + 2.0,
        humidity: 65,
        wind_speed: 3.5,
        description: description.to_string(),
        icon: icon.to_string(),
        status: FeedStatus::Simulated,
        timestamp: now,
    }
}

/// One bus per demo route scattered around `center`.
pub fn demo_buses<R: Rng + ?Sized>(center: GeoPoint, now: DateTime<Utc>, rng: &mut R) -> BusFleetUpdate {
    let buses = DEMO_ROUTES
        .iter()
        .enumerate()
        .map(|(index, route)| BusPosition {
            id: format!("KA01AB{}", 1000 + index),
            route: (*route).to_string(),
            lat: center.lat + rng.gen_range(-DEMO_SPREAD..=DEMO_SPREAD),
            lon: center.lon + rng.gen_range(-DEMO_SPREAD..=DEMO_SPREAD),
            speed: f64::from(rng.gen_range(DEMO_SPEED_KMH.0..=DEMO_SPEED_KMH.1)),
            timestamp: now,
        })
        .collect();

    BusFleetUpdate::new(buses, FeedStatus::Demo, now)
}
