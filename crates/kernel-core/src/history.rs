//! Bounded in-memory time series with trend and threshold-crossing prediction.

use std::collections::VecDeque;

use contracts::{
    Alert, AlertLevel, AlertPrediction, ChartData, DensityChartPoint, DensityPoint, HistoryCounts,
    HistorySummary, HistoryTrends, MetroChartPoint, MetroPoint, PhaseTransition, Thresholds, Trend,
};

pub const DENSITY_CAPACITY: usize = 100;
pub const METRO_CAPACITY: usize = 50;
pub const ALERT_CAPACITY: usize = 20;
pub const TRANSITION_CAPACITY: usize = 20;
pub const CHART_POINTS: usize = 20;

const TREND_WINDOW: usize = 3;
const DENSITY_TREND_MARGIN: f64 = 10.0;
const METRO_TREND_MARGIN: f64 = 5.0;

/// FIFO that evicts its oldest entry once full.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Density,
    Metro,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Density(DensityPoint),
    Metro(MetroPoint),
    Alert(Alert),
    PhaseTransition(PhaseTransition),
}

#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    density: BoundedLog<DensityPoint>,
    metro: BoundedLog<MetroPoint>,
    alerts: BoundedLog<Alert>,
    transitions: BoundedLog<PhaseTransition>,
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self {
            density: BoundedLog::with_capacity(DENSITY_CAPACITY),
            metro: BoundedLog::with_capacity(METRO_CAPACITY),
            alerts: BoundedLog::with_capacity(ALERT_CAPACITY),
            transitions: BoundedLog::with_capacity(TRANSITION_CAPACITY),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        match entry {
            HistoryEntry::Density(point) => self.density.push(point),
            HistoryEntry::Metro(point) => self.metro.push(point),
            HistoryEntry::Alert(alert) => self.alerts.push(alert),
            HistoryEntry::PhaseTransition(transition) => self.transitions.push(transition),
        }
    }

    pub fn density(&self) -> &BoundedLog<DensityPoint> {
        &self.density
    }

    pub fn metro(&self) -> &BoundedLog<MetroPoint> {
        &self.metro
    }

    pub fn alerts(&self) -> &BoundedLog<Alert> {
        &self.alerts
    }

    pub fn transitions(&self) -> &BoundedLog<PhaseTransition> {
        &self.transitions
    }

    pub fn trend(&self, kind: SeriesKind) -> Trend {
        let (values, margin) = match kind {
            SeriesKind::Density => (
                self.density
                    .tail(TREND_WINDOW)
                    .map(|point| f64::from(point.max_density))
                    .collect::<Vec<_>>(),
                DENSITY_TREND_MARGIN,
            ),
            SeriesKind::Metro => (
                self.metro
                    .tail(TREND_WINDOW)
                    .map(|point| f64::from(point.total_flow))
                    .collect::<Vec<_>>(),
                METRO_TREND_MARGIN,
            ),
        };

        let Some(delta) = average_delta(&values) else {
            return Trend::Stable;
        };
        if delta > margin {
            Trend::Increasing
        } else if delta < -margin {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    /// Extrapolates the recent density slope to the next unmet threshold.
    ///
    /// `None` unless density is trending up and at least one threshold is still ahead.
    pub fn predict_next_alert(
        &self,
        thresholds: &Thresholds,
        tick_secs: u64,
    ) -> Option<AlertPrediction> {
        if self.trend(SeriesKind::Density) != Trend::Increasing {
            return None;
        }

        let recent: Vec<f64> = self
            .density
            .tail(TREND_WINDOW)
            .map(|point| f64::from(point.max_density))
            .collect();
        let rate = average_delta(&recent)?;
        let current = self.density.last()?.max_density;

        let (level, threshold) = [
            (AlertLevel::Warning, thresholds.density_warning),
            (AlertLevel::Critical, thresholds.density_critical),
        ]
        .into_iter()
        .find(|(_, threshold)| current <= *threshold)?;

        // Alerts fire strictly above the threshold.
        let ticks = (f64::from(threshold.saturating_add(1) - current) / rate).ceil().max(1.0);
        let minutes = (ticks * tick_secs as f64 / 60.0).ceil() as u32;

        Some(AlertPrediction {
            level,
            threshold,
            estimated_minutes: minutes,
            current_density: current,
            rate,
        })
    }

    pub fn summary(&self, thresholds: &Thresholds, tick_secs: u64) -> HistorySummary {
        HistorySummary {
            density_history: self.density.to_vec(),
            metro_history: self.metro.to_vec(),
            alert_history: self.alerts.to_vec(),
            phase_transitions: self.transitions.to_vec(),
            trends: HistoryTrends {
                density: self.trend(SeriesKind::Density),
                metro: self.trend(SeriesKind::Metro),
            },
            prediction: self.predict_next_alert(thresholds, tick_secs),
            counts: self.counts(),
        }
    }

    pub fn counts(&self) -> HistoryCounts {
        HistoryCounts {
            total_alerts: self.alerts.len(),
            total_phase_transitions: self.transitions.len(),
            density_points: self.density.len(),
            metro_points: self.metro.len(),
        }
    }

    pub fn chart_data(&self) -> ChartData {
        ChartData {
            density_chart: self
                .density
                .tail(CHART_POINTS)
                .map(|point| DensityChartPoint {
                    time: point.timestamp.format("%H:%M").to_string(),
                    max: point.max_density,
                    avg: (point.avg_density * 10.0).round() / 10.0,
                    phase: point.phase,
                })
                .collect(),
            metro_chart: self
                .metro
                .tail(CHART_POINTS)
                .map(|point| MetroChartPoint {
                    time: point.timestamp.format("%H:%M").to_string(),
                    entry: point.entry_rate,
                    exit: point.exit_rate,
                    total: point.total_flow,
                })
                .collect(),
        }
    }

    pub fn clear(&mut self) {
        self.density.clear();
        self.metro.clear();
        self.alerts.clear();
        self.transitions.clear();
    }
}

fn average_delta(values: &[f64]) -> Option<f64> {
    if values.len() < TREND_WINDOW {
        return None;
    }
    let deltas: Vec<f64> = values.windows(2).map(|pair| pair[1] - pair[0]).collect();
    Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
}
