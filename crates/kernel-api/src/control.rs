//! Pause, speed, demo mode, and session counters shared by every producer and route.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 5.0;
pub const DEMO_SPEED: f64 = 2.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ControlStats {
    pub is_paused: bool,
    pub speed_multiplier: f64,
    pub demo_mode: bool,
    pub total_alerts: u64,
    pub total_messages: u64,
    pub phase_transitions: u64,
    pub session_start: DateTime<Utc>,
    pub uptime_seconds: i64,
}

#[derive(Debug)]
pub struct SimulationControl {
    paused: AtomicBool,
    speed_bits: AtomicU64,
    demo_mode: AtomicBool,
    total_alerts: AtomicU64,
    total_messages: AtomicU64,
    phase_transitions: AtomicU64,
    session_start_ms: AtomicI64,
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self {
            paused: AtomicBool::new(false),
            speed_bits: AtomicU64::new(1.0_f64.to_bits()),
            demo_mode: AtomicBool::new(false),
            total_alerts: AtomicU64::new(0),
            total_messages: AtomicU64::new(0),
            phase_transitions: AtomicU64::new(0),
            session_start_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }
}

impl SimulationControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Flips the paused flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Stores the multiplier clamped to the supported range and returns what was stored.
    pub fn set_speed(&self, multiplier: f64) -> f64 {
        let clamped = if multiplier.is_finite() {
            multiplier.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        };
        self.speed_bits.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    pub fn demo_mode(&self) -> bool {
        self.demo_mode.load(Ordering::Relaxed)
    }

    pub fn set_demo_mode(&self, enabled: bool) {
        self.demo_mode.store(enabled, Ordering::Relaxed);
        self.set_speed(if enabled { DEMO_SPEED } else { 1.0 });
    }

    /// Producer sleep interval after applying the speed multiplier.
    pub fn scaled(&self, interval: Duration) -> Duration {
        Duration::try_from_secs_f64(interval.as_secs_f64() / self.speed()).unwrap_or(Duration::MAX)
    }

    pub fn record_alerts(&self, count: usize) {
        self.total_alerts.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_messages(&self, count: usize) {
        self.total_messages.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_transitions(&self, count: usize) {
        self.phase_transitions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn reset_stats(&self) {
        self.total_alerts.store(0, Ordering::Relaxed);
        self.total_messages.store(0, Ordering::Relaxed);
        self.phase_transitions.store(0, Ordering::Relaxed);
        self.session_start_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn stats(&self) -> ControlStats {
        let now = Utc::now();
        let session_start = Utc
            .timestamp_millis_opt(self.session_start_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or(now);
        ControlStats {
            is_paused: self.is_paused(),
            speed_multiplier: self.speed(),
            demo_mode: self.demo_mode(),
            total_alerts: self.total_alerts.load(Ordering::Relaxed),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            phase_transitions: self.phase_transitions.load(Ordering::Relaxed),
            session_start,
            uptime_seconds: (now - session_start).num_seconds().max(0),
        }
    }
}
