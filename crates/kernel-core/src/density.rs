//! Turns a zone's phase and intensity into a density grid and ranked hotspots.

use contracts::{DensityField, GridPoint, Hotspot, Thresholds, Zone, GRID_SIZE};
use rand::Rng;

use crate::phase::{scatter_centers, ZoneState};

/// Largest value ambient noise plus additive noise can add on top of the hotspot signal.
pub const NOISE_BOUND: u32 = AMBIENT_MAX + ADDITIVE_NOISE as u32;
pub const MAX_HOTSPOTS: usize = 3;
/// Cells above this fraction of base intensity become hotspot candidates.
pub const HOTSPOT_RATIO: f64 = 0.7;

const AMBIENT_MAX: u32 = 5;
const ADDITIVE_NOISE: f64 = 5.0;
const FALLOFF_JITTER: (f64, f64) = (0.8, 1.2);
/// Degrees per grid cell when projecting candidates back onto the map.
const CELL_DEGREES: f64 = 0.002;
const OFFSET_JITTER: f64 = 0.3;

pub fn generate<R: Rng + ?Sized>(
    state: &ZoneState,
    zone: &Zone,
    thresholds: &Thresholds,
    rng: &mut R,
) -> DensityField {
    let synthesized;
    let centers: &[GridPoint] = if state.hotspot_centers.is_empty() {
        synthesized = scatter_centers(rng, 2..=3);
        &synthesized
    } else {
        &state.hotspot_centers
    };

    let intensity = state.intensity.max(0.0);
    let saturation = zone.max_intensity();
    let half = (GRID_SIZE / 2) as f64;

    let mut grid = vec![vec![0_u32; GRID_SIZE]; GRID_SIZE];
    let mut candidates = Vec::new();

    for (i, row) in grid.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut signal = 0.0;
            for center in centers {
                let distance = ((i as f64 - center.i).powi(2) + (j as f64 - center.j).powi(2)).sqrt();
                signal += if distance < 0.1 {
                    intensity
                } else {
                    intensity / (1.0 + distance * distance)
                        * rng.gen_range(FALLOFF_JITTER.0..=FALLOFF_JITTER.1)
                };
            }
            // Overlapping hotspots saturate at what the zone can physically hold.
            let ambient = f64::from(rng.gen_range(0..=AMBIENT_MAX));
            let value = ambient
                + signal.min(saturation)
                + rng.gen_range(-ADDITIVE_NOISE..=ADDITIVE_NOISE);
            *cell = value.max(0.0) as u32;

            if f64::from(*cell) > HOTSPOT_RATIO * intensity {
                let lat_offset = (i as f64 - half + rng.gen_range(-OFFSET_JITTER..=OFFSET_JITTER))
                    * CELL_DEGREES;
                let lon_offset = (j as f64 - half + rng.gen_range(-OFFSET_JITTER..=OFFSET_JITTER))
                    * CELL_DEGREES;
                candidates.push(Hotspot {
                    lat: zone.center.lat + lat_offset,
                    lon: zone.center.lon + lon_offset,
                    intensity: *cell,
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.intensity.cmp(&a.intensity));
    candidates.truncate(MAX_HOTSPOTS);

    let cells = (GRID_SIZE * GRID_SIZE) as f64;
    let total: u64 = grid.iter().flatten().map(|&v| u64::from(v)).sum();
    let max_density = grid.iter().flatten().copied().max().unwrap_or(0);
    let avg_density = total as f64 / cells;

    DensityField {
        zone_id: zone.id.clone(),
        zone_name: zone.name.clone(),
        grid,
        hotspots: candidates,
        avg_density,
        max_density,
        phase: state.phase,
        center: zone.center,
        capacity: zone.capacity,
        occupancy_percent: avg_density / (f64::from(zone.capacity) / 100.0),
        status: thresholds.classify(max_density),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CrowdPhase, DensityStatus, GeoPoint, ZoneType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn venue() -> Zone {
        Zone {
            id: "stadium".to_string(),
            name: "Stadium".to_string(),
            center: GeoPoint::new(12.9789, 77.5993),
            radius_m: 500.0,
            capacity: 40_000,
            zone_type: ZoneType::EventVenue,
        }
    }

    #[test]
    fn field_without_centers_is_never_blank() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut state = ZoneState::new("stadium");
        state.phase = CrowdPhase::Building;
        state.intensity = 120.0;

        let field = generate(&state, &venue(), &Thresholds::default(), &mut rng);
        assert_eq!(field.grid.len(), GRID_SIZE);
        assert!(field.grid.iter().all(|row| row.len() == GRID_SIZE));
        // Nearest cell to any center sits within ~0.71 cells of it.
        assert!(field.max_density >= 50, "max was {}", field.max_density);
        assert!(state.hotspot_centers.is_empty(), "input state is not mutated");
    }

    #[test]
    fn summary_statistics_match_the_grid() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut state = ZoneState::new("stadium");
        state.phase = CrowdPhase::Peak;
        state.intensity = 155.0;
        state.hotspot_centers = vec![GridPoint { i: 4.5, j: 4.5 }, GridPoint { i: 4.6, j: 4.4 }];

        let field = generate(&state, &venue(), &Thresholds::default(), &mut rng);
        let flat: Vec<u32> = field.grid.iter().flatten().copied().collect();
        let mean = flat.iter().map(|&v| f64::from(v)).sum::<f64>() / flat.len() as f64;
        assert_eq!(field.max_density, *flat.iter().max().expect("non-empty"));
        assert!((field.avg_density - mean).abs() < 1e-9);
        assert!(field.avg_density <= f64::from(field.max_density));
        assert!(field.max_density <= 160 + NOISE_BOUND);
        assert!((field.occupancy_percent - field.avg_density / 400.0).abs() < 1e-9);
        assert_eq!(field.status, Thresholds::default().classify(field.max_density));
    }

    #[test]
    fn hotspots_are_ranked_and_capped() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut state = ZoneState::new("stadium");
        state.phase = CrowdPhase::Peak;
        state.intensity = 150.0;
        state.hotspot_centers = vec![
            GridPoint { i: 2.5, j: 2.5 },
            GridPoint { i: 6.5, j: 6.5 },
            GridPoint { i: 3.0, j: 6.0 },
        ];

        let field = generate(&state, &venue(), &Thresholds::default(), &mut rng);
        assert!(field.hotspots.len() <= MAX_HOTSPOTS);
        assert!(field
            .hotspots
            .windows(2)
            .all(|pair| pair[0].intensity >= pair[1].intensity));
        for hotspot in &field.hotspots {
            assert!((hotspot.lat - 12.9789).abs() < 0.012);
            assert!((hotspot.lon - 77.5993).abs() < 0.012);
        }
    }

    #[test]
    fn quiet_zone_classifies_normal() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let mut state = ZoneState::new("stadium");
        state.intensity = 5.0;
        state.hotspot_centers = vec![GridPoint { i: 5.0, j: 5.0 }];

        let field = generate(&state, &venue(), &Thresholds::default(), &mut rng);
        assert_eq!(field.status, DensityStatus::Normal);
        assert!(field.max_density <= 5 + NOISE_BOUND);
    }
}
