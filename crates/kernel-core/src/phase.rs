//! Per-zone crowd lifecycle: `low → building → peak → dispersing → low`.

use contracts::{CrowdPhase, GridPoint, Zone, ZoneType};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Dispersing zones fall back to `low` once intensity drops below this.
pub const DISPERSED_FLOOR: f64 = 30.0;
/// `low` decays toward this and never below it.
pub const LOW_FLOOR: f64 = 5.0;
pub const LOW_DECAY_PER_TICK: f64 = 2.0;
/// Fraction of the capacity-scaled max at which `building` tips into `peak`.
pub const PEAK_ENTRY_RATIO: f64 = 0.9;

const CENTER_SPREAD: (f64, f64) = (2.0, 7.0);

/// Type-dependent rate parameters. Ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseProfile {
    pub buildup_rate: (f64, f64),
    pub dispersal_rate: (f64, f64),
    pub peak_ticks: (u32, u32),
    pub low_ticks: (u32, u32),
    pub peak_jitter: f64,
}

impl PhaseProfile {
    pub fn for_type(zone_type: ZoneType) -> Self {
        match zone_type {
            ZoneType::EventVenue => Self {
                buildup_rate: (10.0, 18.0),
                dispersal_rate: (12.0, 20.0),
                peak_ticks: (10, 15),
                low_ticks: (6, 12),
                peak_jitter: 8.0,
            },
            ZoneType::Transit => Self {
                buildup_rate: (8.0, 14.0),
                dispersal_rate: (16.0, 24.0),
                peak_ticks: (5, 8),
                low_ticks: (3, 6),
                peak_jitter: 10.0,
            },
            ZoneType::Commercial => Self {
                buildup_rate: (6.0, 12.0),
                dispersal_rate: (8.0, 15.0),
                peak_ticks: (8, 12),
                low_ticks: (4, 8),
                peak_jitter: 6.0,
            },
            ZoneType::Mixed => Self {
                buildup_rate: (7.0, 13.0),
                dispersal_rate: (9.0, 16.0),
                peak_ticks: (6, 10),
                low_ticks: (4, 10),
                peak_jitter: 8.0,
            },
            ZoneType::Tourist => Self {
                buildup_rate: (5.0, 10.0),
                dispersal_rate: (7.0, 14.0),
                peak_ticks: (7, 11),
                low_ticks: (5, 10),
                peak_jitter: 5.0,
            },
        }
    }

    fn sample_limit<R: Rng + ?Sized>(&self, phase: CrowdPhase, rng: &mut R) -> Option<u32> {
        let (lo, hi) = match phase {
            CrowdPhase::Peak => self.peak_ticks,
            CrowdPhase::Low => self.low_ticks,
            CrowdPhase::Building | CrowdPhase::Dispersing => return None,
        };
        Some(rng.gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub zone_id: String,
    pub phase: CrowdPhase,
    pub intensity: f64,
    pub hotspot_centers: Vec<GridPoint>,
    /// Completed `low → building` restarts.
    pub cycle_count: u64,
    /// Ticks spent in the current phase.
    pub phase_duration: u32,
    /// Ticks the current timed phase (`peak` or `low`) lasts; drawn once on entry.
    pub phase_limit: Option<u32>,
}

impl ZoneState {
    /// The zero-valued state. [`advance`] accepts it as-is.
    pub fn new(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            phase: CrowdPhase::Low,
            intensity: 0.0,
            hotspot_centers: Vec::new(),
            cycle_count: 0,
            phase_duration: 0,
            phase_limit: None,
        }
    }

    /// Freshly created and never advanced. Entering low always samples a limit, so a zone
    /// that dispersed back to low is never mistaken for this.
    fn is_zero(&self) -> bool {
        self.phase_limit.is_none() && self.phase_duration == 0 && self.intensity == 0.0
    }

    /// Staggered starting point so zones do not move in lockstep.
    pub fn seeded<R: Rng + ?Sized>(zone: &Zone, rng: &mut R) -> Self {
        let upper = (30.0 * f64::from(zone.capacity) / contracts::REFERENCE_CAPACITY)
            .floor()
            .max(10.0) as u32;
        let phase = CrowdPhase::ALL[rng.gen_range(0..CrowdPhase::ALL.len())];
        let mut state = Self::new(zone.id.clone());
        state.phase = phase;
        state.intensity = f64::from(rng.gen_range(10..=upper));
        state.hotspot_centers = scatter_centers(rng, 2..=4);
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseChange {
    pub from: CrowdPhase,
    pub to: CrowdPhase,
    pub intensity: f64,
}

/// Random fractional grid coordinates away from the border.
pub fn scatter_centers<R: Rng + ?Sized>(
    rng: &mut R,
    count: std::ops::RangeInclusive<usize>,
) -> Vec<GridPoint> {
    let n = rng.gen_range(count);
    (0..n)
        .map(|_| GridPoint {
            i: rng.gen_range(CENTER_SPREAD.0..=CENTER_SPREAD.1),
            j: rng.gen_range(CENTER_SPREAD.0..=CENTER_SPREAD.1),
        })
        .collect()
}

/// One tick of the zone's state machine. Returns the next state and the transition taken, if any.
pub fn advance<R: Rng + ?Sized>(
    state: &ZoneState,
    zone: &Zone,
    rng: &mut R,
) -> (ZoneState, Option<PhaseChange>) {
    let profile = PhaseProfile::for_type(zone.zone_type);
    let max_intensity = zone.max_intensity();
    let mut next = state.clone();
    next.phase_duration = next.phase_duration.saturating_add(1);

    if next.hotspot_centers.is_empty() && (state.is_zero() || next.phase != CrowdPhase::Low) {
        next.hotspot_centers = scatter_centers(rng, 2..=4);
    }

    let mut entered = None;
    match next.phase {
        CrowdPhase::Building => {
            let rate = rng.gen_range(profile.buildup_rate.0..=profile.buildup_rate.1);
            next.intensity += rate;
            if next.intensity > PEAK_ENTRY_RATIO * max_intensity {
                entered = Some(CrowdPhase::Peak);
            }
        }
        CrowdPhase::Peak => {
            let jitter = rng.gen_range(-profile.peak_jitter..=profile.peak_jitter);
            next.intensity += jitter;
            let limit = match next.phase_limit {
                Some(limit) => limit,
                None => {
                    let limit = profile
                        .sample_limit(CrowdPhase::Peak, rng)
                        .unwrap_or(profile.peak_ticks.1);
                    next.phase_limit = Some(limit);
                    limit
                }
            };
            if next.phase_duration > limit {
                entered = Some(CrowdPhase::Dispersing);
            }
        }
        CrowdPhase::Dispersing => {
            let rate = rng.gen_range(profile.dispersal_rate.0..=profile.dispersal_rate.1);
            next.intensity -= rate;
            if next.intensity < DISPERSED_FLOOR {
                entered = Some(CrowdPhase::Low);
            }
        }
        CrowdPhase::Low => {
            next.intensity = (next.intensity - LOW_DECAY_PER_TICK).max(LOW_FLOOR);
            let limit = match next.phase_limit {
                Some(limit) => limit,
                None => {
                    let limit = profile
                        .sample_limit(CrowdPhase::Low, rng)
                        .unwrap_or(profile.low_ticks.1);
                    next.phase_limit = Some(limit);
                    limit
                }
            };
            if next.phase_duration > limit {
                entered = Some(CrowdPhase::Building);
            }
        }
    }

    next.intensity = next.intensity.clamp(0.0, max_intensity);

    let change = entered.map(|to| {
        let from = next.phase;
        next.phase = to;
        next.phase_duration = 0;
        next.phase_limit = profile.sample_limit(to, rng);
        match to {
            CrowdPhase::Low => next.hotspot_centers.clear(),
            CrowdPhase::Building => {
                next.cycle_count = next.cycle_count.saturating_add(1);
                next.hotspot_centers = scatter_centers(rng, 2..=4);
            }
            CrowdPhase::Peak | CrowdPhase::Dispersing => {}
        }
        PhaseChange {
            from,
            to,
            intensity: next.intensity,
        }
    });

    (next, change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::GeoPoint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn zone(zone_type: ZoneType, capacity: u32) -> Zone {
        Zone {
            id: "z".to_string(),
            name: "Z".to_string(),
            center: GeoPoint::new(12.97, 77.59),
            radius_m: 300.0,
            capacity,
            zone_type,
        }
    }

    #[test]
    fn zero_state_self_initializes_hotspots() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (next, change) = advance(&ZoneState::new("z"), &zone(ZoneType::Mixed, 25_000), &mut rng);
        assert!(change.is_none());
        assert!((2..=4).contains(&next.hotspot_centers.len()));
        assert_eq!(next.intensity, LOW_FLOOR);
        assert!(next.phase_limit.is_some());
    }

    #[test]
    fn building_tips_into_peak_above_ninety_percent() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let venue = zone(ZoneType::EventVenue, 40_000);
        let mut state = ZoneState::new("z");
        state.phase = CrowdPhase::Building;
        state.intensity = 140.0;

        let (next, change) = advance(&state, &venue, &mut rng);
        let change = change.expect("140 + at least 10 crosses 144");
        assert_eq!(change.from, CrowdPhase::Building);
        assert_eq!(change.to, CrowdPhase::Peak);
        assert_eq!(next.phase_duration, 0);
        assert!(next.intensity <= 160.0);
        let limit = next.phase_limit.expect("peak limit drawn on entry");
        assert!((10..=15).contains(&limit));
    }

    #[test]
    fn dispersing_to_low_clears_hotspots() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = ZoneState::new("z");
        state.phase = CrowdPhase::Dispersing;
        state.intensity = 31.0;
        state.cycle_count = 2;
        state.hotspot_centers = vec![GridPoint { i: 4.0, j: 4.0 }];

        let (next, change) = advance(&state, &zone(ZoneType::Transit, 45_000), &mut rng);
        assert_eq!(change.map(|c| c.to), Some(CrowdPhase::Low));
        assert!(next.hotspot_centers.is_empty());
        assert!(next.intensity < DISPERSED_FLOOR);

        // Stays empty while low after a completed cycle.
        let (later, _) = advance(&next, &zone(ZoneType::Transit, 45_000), &mut rng);
        assert!(later.hotspot_centers.is_empty());
    }

    #[test]
    fn first_cycle_dispersal_keeps_low_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let zone = zone(ZoneType::EventVenue, 50_000);
        let mut state = ZoneState::seeded(&zone, &mut rng);
        state.phase = CrowdPhase::Dispersing;
        state.intensity = 31.0;
        assert_eq!(state.cycle_count, 0);

        let (low, change) = advance(&state, &zone, &mut rng);
        assert_eq!(change.map(|c| c.to), Some(CrowdPhase::Low));
        assert!(low.hotspot_centers.is_empty());

        let (later, _) = advance(&low, &zone, &mut rng);
        assert_eq!(later.phase, CrowdPhase::Low);
        assert!(later.hotspot_centers.is_empty());
    }

    #[test]
    fn low_restarts_building_with_fresh_centers() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut state = ZoneState::new("z");
        state.cycle_count = 1;
        state.phase_limit = Some(3);
        state.phase_duration = 3;
        state.intensity = 12.0;

        let (next, change) = advance(&state, &zone(ZoneType::Tourist, 20_000), &mut rng);
        assert_eq!(change.map(|c| c.to), Some(CrowdPhase::Building));
        assert_eq!(next.cycle_count, 2);
        assert!((2..=4).contains(&next.hotspot_centers.len()));
        assert_eq!(next.phase_limit, None);
        assert_eq!(next.intensity, 10.0);
    }

    #[test]
    fn peak_is_clamped_to_capacity_scaled_max() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let venue = zone(ZoneType::EventVenue, 40_000);
        let mut state = ZoneState::new("z");
        state.phase = CrowdPhase::Peak;
        state.intensity = 190.0;
        state.phase_limit = Some(50);

        for _ in 0..20 {
            let (next, _) = advance(&state, &venue, &mut rng);
            assert!(next.intensity <= 160.0);
            assert!(next.intensity >= 0.0);
            state = next;
        }
    }
}
