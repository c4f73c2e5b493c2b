use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use contracts::{
    Alert, AlertCategory, AlertLevel, CrowdPhase, DensityPoint, GeoPoint, Thresholds, Trend,
    Zone, ZoneType,
};
use kernel_core::density::{self, NOISE_BOUND};
use kernel_core::history::{ALERT_CAPACITY, DENSITY_CAPACITY, TRANSITION_CAPACITY};
use kernel_core::{
    advance, HistoryEntry, HistoryRecorder, SeriesKind, SimulationEngine, ZoneState,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn stadium() -> Zone {
    Zone {
        id: "stadium".to_string(),
        name: "Chinnaswamy Stadium".to_string(),
        center: GeoPoint::new(12.9789, 77.5993),
        radius_m: 500.0,
        capacity: 40_000,
        zone_type: ZoneType::EventVenue,
    }
}

fn point(max_density: u32) -> HistoryEntry {
    HistoryEntry::Density(DensityPoint {
        timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap(),
        zone_id: "stadium".to_string(),
        max_density,
        avg_density: f64::from(max_density) / 3.0,
        phase: CrowdPhase::Peak,
        hotspot_count: 2,
    })
}

fn alert(value: f64) -> HistoryEntry {
    HistoryEntry::Alert(Alert {
        level: AlertLevel::Warning,
        category: AlertCategory::CrowdDensity,
        zone_id: "stadium".to_string(),
        zone_name: "Chinnaswamy Stadium".to_string(),
        message: "Elevated crowd density".to_string(),
        value,
        threshold: 150.0,
        recommendation: "Monitor".to_string(),
        location: GeoPoint::new(12.9789, 77.5993),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap(),
    })
}

#[test]
fn event_venue_builds_to_peak_within_rate_bound() {
    let zone = stadium();
    let mut rng = ChaCha8Rng::seed_from_u64(2026);
    let mut state = ZoneState::new("stadium");
    state.phase = CrowdPhase::Building;

    // Slowest event-venue buildup is 10/tick, so 15 ticks always clear 0.9 × 160.
    let mut reached_at = None;
    for tick in 1..=15 {
        let (next, change) = advance(&state, &zone, &mut rng);
        state = next;
        if let Some(change) = change {
            assert_eq!(change.to, CrowdPhase::Peak);
            assert!(change.intensity > 144.0);
            reached_at = Some(tick);
            break;
        }
    }
    assert!(reached_at.is_some(), "never reached peak");
    assert_eq!(state.phase, CrowdPhase::Peak);
}

#[test]
fn peak_lasts_exactly_its_drawn_duration() {
    let zone = stadium();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut state = ZoneState::new("stadium");
    state.phase = CrowdPhase::Peak;
    state.intensity = 190.0;
    state.phase_limit = Some(10);

    for tick in 1..=10 {
        let (next, change) = advance(&state, &zone, &mut rng);
        assert!(change.is_none(), "left peak early at tick {tick}");
        assert!(next.intensity <= zone.max_intensity());
        state = next;
    }

    let (next, change) = advance(&state, &zone, &mut rng);
    assert_eq!(change.map(|c| c.to), Some(CrowdPhase::Dispersing));
    assert_eq!(next.phase, CrowdPhase::Dispersing);
    assert_eq!(next.phase_duration, 0);
}

#[test]
fn history_logs_stay_bounded_and_fifo() {
    let mut history = HistoryRecorder::new();
    for value in 0..250_u32 {
        history.record(point(value));
        history.record(alert(f64::from(value)));
    }

    assert_eq!(history.density().len(), DENSITY_CAPACITY);
    assert_eq!(history.alerts().len(), ALERT_CAPACITY);
    assert_eq!(history.transitions().len(), 0);
    assert!(TRANSITION_CAPACITY > 0);
    assert_eq!(history.density().iter().next().map(|p| p.max_density), Some(150));
    assert_eq!(history.alerts().iter().next().map(|a| a.value), Some(230.0));
}

proptest! {
    #[test]
    fn density_fields_respect_bounds(seed in 1_u64..5_000, ticks in 1_usize..60) {
        let mut engine = SimulationEngine::bengaluru(seed);
        let thresholds = Thresholds::default();
        let now = Utc::now();

        for _ in 0..ticks {
            let tick = engine.step_density(&thresholds, now);
            for zone in engine.registry().zones() {
                let field = &tick.fields[&zone.id];
                prop_assert!(field.avg_density >= 0.0);
                prop_assert!(field.avg_density <= f64::from(field.max_density));
                prop_assert!(
                    f64::from(field.max_density) <= zone.max_intensity() + f64::from(NOISE_BOUND)
                );
                prop_assert!(field.hotspots.len() <= density::MAX_HOTSPOTS);
            }
            for state in engine.zone_states().values() {
                prop_assert!(state.intensity >= 0.0);
            }
        }
    }

    #[test]
    fn phases_only_follow_the_cycle(seed in 1_u64..5_000) {
        let mut engine = SimulationEngine::bengaluru(seed);
        let thresholds = Thresholds::default();
        let now = Utc::now();
        let mut last: BTreeMap<String, CrowdPhase> = BTreeMap::new();

        for _ in 0..120 {
            let tick = engine.step_density(&thresholds, now);
            for transition in &tick.transitions {
                prop_assert_eq!(transition.to_phase, transition.from_phase.successor());
            }
            for (zone_id, state) in engine.zone_states() {
                if let Some(previous) = last.get(zone_id) {
                    prop_assert!(
                        state.phase == *previous || state.phase == previous.successor(),
                        "{} jumped from {} to {}", zone_id, previous, state.phase
                    );
                }
                last.insert(zone_id.clone(), state.phase);
            }
        }
    }

    #[test]
    fn hotspot_ranking_is_already_sorted(seed in 1_u64..10_000, intensity in 0.0_f64..160.0) {
        let zone = stadium();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut state = ZoneState::new("stadium");
        state.phase = CrowdPhase::Peak;
        state.intensity = intensity;

        let field = density::generate(&state, &zone, &Thresholds::default(), &mut rng);
        let mut resorted = field.hotspots.clone();
        resorted.sort_by(|a, b| b.intensity.cmp(&a.intensity));
        prop_assert_eq!(resorted, field.hotspots);
    }

    #[test]
    fn trend_is_stable_below_three_points(values in proptest::collection::vec(0_u32..400, 0..3)) {
        let mut history = HistoryRecorder::new();
        for value in values {
            history.record(point(value));
        }
        prop_assert_eq!(history.trend(SeriesKind::Density), Trend::Stable);
        prop_assert_eq!(history.trend(SeriesKind::Metro), Trend::Stable);
        prop_assert!(history.predict_next_alert(&Thresholds::default(), 30).is_none());
    }

    #[test]
    fn same_seed_replays_identically(seed in 1_u64..10_000, ticks in 1_usize..20) {
        let now = Utc::now();
        let mut a = SimulationEngine::bengaluru(seed);
        let mut b = SimulationEngine::bengaluru(seed);
        for _ in 0..ticks {
            let left = a.step_density(&Thresholds::default(), now);
            let right = b.step_density(&Thresholds::default(), now);
            prop_assert_eq!(left.fields, right.fields);
        }
        prop_assert_eq!(a.zone_states(), b.zone_states());
    }
}
