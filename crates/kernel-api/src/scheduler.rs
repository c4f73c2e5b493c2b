//! Periodic producers. Each runs on its own task, sleeps its scaled interval, and pushes what
//! it produced through the hub. A failing or panicking tick is logged and the loop carries on.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use contracts::{
    DensityUpdate, MetroUpdate, MultiMetroUpdate, MultiZoneDensityUpdate, ProducerIntervals,
    StreamEvent, GRID_SIZE,
};
use futures_util::FutureExt;
use kernel_core::MonitorError;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::hub::HubError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    Density,
    Metro,
    BusGps,
    Weather,
    Responders,
    Heartbeat,
}

impl Producer {
    pub const ALL: [Producer; 6] = [
        Producer::Density,
        Producer::Metro,
        Producer::BusGps,
        Producer::Weather,
        Producer::Responders,
        Producer::Heartbeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Density => "density",
            Self::Metro => "metro",
            Self::BusGps => "bus_gps",
            Self::Weather => "weather",
            Self::Responders => "responders",
            Self::Heartbeat => "heartbeat",
        }
    }

    pub fn interval(self, intervals: &ProducerIntervals) -> Duration {
        Duration::from_secs(match self {
            Self::Density => intervals.density_secs,
            Self::Metro => intervals.metro_secs,
            Self::BusGps => intervals.bus_secs,
            Self::Weather => intervals.weather_secs,
            Self::Responders => intervals.responders_secs,
            Self::Heartbeat => intervals.heartbeat_secs,
        })
    }

    /// Staggered start so the first burst after boot is spread out.
    pub fn initial_delay(self) -> Duration {
        Duration::from_secs(match self {
            Self::Density => 10,
            Self::Metro => 7,
            Self::BusGps => 5,
            Self::Weather => 1,
            Self::Responders => 3,
            Self::Heartbeat => 2,
        })
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran,
    Paused,
    Failed,
    Panicked,
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(state: AppState) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let handles = Producer::ALL
            .into_iter()
            .map(|producer| tokio::spawn(run_producer(producer, state.clone(), signal.clone())))
            .collect();
        info!(producers = Producer::ALL.len(), "scheduler.started");
        Self { shutdown, handles }
    }

    /// Signals every producer and waits for them to leave their loops.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "scheduler.join_failed");
            }
        }
        info!("scheduler.stopped");
    }
}

async fn run_producer(producer: Producer, state: AppState, mut shutdown: watch::Receiver<bool>) {
    if !sleep_or_shutdown(producer.initial_delay(), &mut shutdown).await {
        return;
    }
    loop {
        cycle(producer, &state).await;
        let interval = state
            .control
            .scaled(producer.interval(&state.config.intervals));
        if !sleep_or_shutdown(interval, &mut shutdown).await {
            break;
        }
    }
    debug!(producer = %producer, "producer.stopped");
}

/// `false` once shutdown has been requested.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}

/// One scheduled invocation. Paused producers skip the work but keep their clock.
pub async fn cycle(producer: Producer, state: &AppState) -> TickOutcome {
    if state.control.is_paused() {
        return TickOutcome::Paused;
    }
    match AssertUnwindSafe(run_tick(producer, state, Utc::now()))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => TickOutcome::Ran,
        Ok(Err(err)) => {
            warn!(producer = %producer, error = %err, "producer.tick_failed");
            TickOutcome::Failed
        }
        Err(_) => {
            error!(producer = %producer, "producer.tick_panicked");
            TickOutcome::Panicked
        }
    }
}

pub async fn run_tick(
    producer: Producer,
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<(), ProducerError> {
    match producer {
        Producer::Density => density_tick(state, now).await,
        Producer::Metro => metro_tick(state, now).await,
        Producer::BusGps => bus_tick(state, now).await,
        Producer::Weather => weather_tick(state, now).await,
        Producer::Responders => responders_tick(state, now).await,
        Producer::Heartbeat => heartbeat_tick(state, now).await,
    }
}

async fn density_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    let outcome = state
        .sim
        .lock()
        .await
        .density_tick(now, state.config.intervals.density_secs)?;

    let field = outcome.primary;
    let legacy = DensityUpdate {
        zone_id: field.zone_id,
        grid: field.grid,
        hotspots: field.hotspots,
        avg_density: field.avg_density,
        max_density: field.max_density,
        phase: field.phase,
        center_location: field.center,
        grid_size: GRID_SIZE,
        trend: outcome.trend,
        prediction: outcome.prediction,
        timestamp: now,
    };

    state.control.record_alerts(outcome.alerts.len());
    state.control.record_transitions(outcome.tick.transitions.len());
    let mut events = vec![
        StreamEvent::MultiZoneDensityUpdate(MultiZoneDensityUpdate {
            zones: outcome.tick.fields,
            summary: outcome.tick.summary,
            timestamp: now,
        }),
        StreamEvent::DensityUpdate(legacy),
    ];
    events.extend(outcome.alerts.into_iter().map(StreamEvent::Alert));
    publish(state, events).await
}

async fn metro_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    let hour = Local::now().hour();
    let outcome = state.sim.lock().await.metro_tick(hour, now);

    let mut events = Vec::new();
    if let Some(flow) = outcome.paired {
        events.push(StreamEvent::MetroUpdate(MetroUpdate {
            flow,
            trend: outcome.trend,
        }));
    }
    events.push(StreamEvent::MultiMetroUpdate(MultiMetroUpdate {
        stations: outcome.tick.flows,
        summary: outcome.tick.summary,
        timestamp: now,
    }));
    if let Some(alert) = outcome.alert {
        state.control.record_alerts(1);
        events.push(StreamEvent::Alert(alert));
    }
    publish(state, events).await
}

async fn bus_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    if state.hub.subscriber_count().await == 0 {
        return Ok(());
    }
    let update = match state.sources.live_buses(now).await {
        Some(update) => update,
        None => {
            let mut sim = state.sim.lock().await;
            sim.engine.demo_buses(state.config.weather.location, now)
        }
    };
    publish(state, vec![StreamEvent::GpsUpdate(update)]).await
}

async fn weather_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    if state.hub.subscriber_count().await == 0 {
        return Ok(());
    }
    let report = state.sources.weather(now).await;
    publish(state, vec![StreamEvent::WeatherUpdate(report)]).await
}

async fn responders_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    if state.hub.subscriber_count().await == 0 {
        return Ok(());
    }
    let update = {
        let mut sim = state.sim.lock().await;
        sim.engine.step_responders(now)
    };
    publish(state, vec![StreamEvent::FirstRespondersUpdate(update)]).await
}

async fn heartbeat_tick(state: &AppState, now: DateTime<Utc>) -> Result<(), ProducerError> {
    let active_connections = state.hub.subscriber_count().await;
    if active_connections == 0 {
        return Ok(());
    }
    let event = StreamEvent::Test {
        message: format!("Heartbeat: {active_connections} active connection(s)"),
        active_connections,
        timestamp: now,
    };
    publish(state, vec![event]).await
}

async fn publish(state: &AppState, events: Vec<StreamEvent>) -> Result<(), ProducerError> {
    for event in &events {
        let report = state.hub.broadcast(event).await?;
        debug!(kind = event.kind(), delivered = report.delivered, "producer.published");
    }
    state.control.record_messages(events.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SimulationConfig;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn offline_state() -> AppState {
        let mut config = SimulationConfig::default();
        config.bus_feed.url = None;
        config.seed = 11;
        AppState::new(config).expect("state")
    }

    async fn drain_kinds(rx: &mut mpsc::Receiver<crate::hub::Frame>) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: Value = serde_json::from_str(&frame).expect("json frame");
            kinds.push(value["type"].as_str().unwrap_or_default().to_string());
        }
        kinds
    }

    #[tokio::test]
    async fn density_tick_records_and_publishes() {
        let state = offline_state();
        let (tx, mut rx) = mpsc::channel(64);
        state.hub.register(tx).await.expect("register");

        assert_eq!(cycle(Producer::Density, &state).await, TickOutcome::Ran);

        let kinds = drain_kinds(&mut rx).await;
        assert_eq!(&kinds[..3], ["connection", "multi_zone_density_update", "density_update"]);
        assert!(kinds[3..].iter().all(|kind| kind == "alert"));

        let sim = state.sim.lock().await;
        assert_eq!(sim.engine.tick(), 1);
        assert_eq!(sim.history.density().len(), 1);
        assert!(sim.latest_summary.is_some());
        assert_eq!(state.control.stats().total_messages, kinds.len() as u64 - 1);
    }

    #[tokio::test]
    async fn paused_producers_do_not_advance() {
        let state = offline_state();
        state.control.set_paused(true);
        assert_eq!(cycle(Producer::Density, &state).await, TickOutcome::Paused);
        assert_eq!(state.sim.lock().await.engine.tick(), 0);

        state.control.set_paused(false);
        assert_eq!(cycle(Producer::Density, &state).await, TickOutcome::Ran);
        assert_eq!(state.sim.lock().await.engine.tick(), 1);
    }

    #[tokio::test]
    async fn metro_tick_tracks_paired_station() {
        let state = offline_state();
        let (tx, mut rx) = mpsc::channel(64);
        state.hub.register(tx).await.expect("register");

        run_tick(Producer::Metro, &state, Utc::now()).await.expect("metro tick");

        let kinds = drain_kinds(&mut rx).await;
        assert_eq!(&kinds[..3], ["connection", "metro_update", "multi_metro_update"]);
        let sim = state.sim.lock().await;
        assert_eq!(sim.history.metro().len(), 1);
        assert_eq!(
            sim.latest_metro.as_ref().map(|flow| flow.station_id.as_str()),
            Some("mg_road")
        );
    }

    #[tokio::test]
    async fn feeds_stay_quiet_without_subscribers() {
        let state = offline_state();
        for producer in [
            Producer::BusGps,
            Producer::Weather,
            Producer::Responders,
            Producer::Heartbeat,
        ] {
            run_tick(producer, &state, Utc::now()).await.expect("tick");
        }
        assert_eq!(state.control.stats().total_messages, 0);

        let (tx, mut rx) = mpsc::channel(64);
        state.hub.register(tx).await.expect("register");
        run_tick(Producer::BusGps, &state, Utc::now()).await.expect("bus tick");
        run_tick(Producer::Heartbeat, &state, Utc::now()).await.expect("heartbeat");

        let frames: Vec<Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| serde_json::from_str(&frame).expect("json"))
            .collect();
        assert_eq!(frames[1]["type"], "gps_update");
        assert_eq!(frames[1]["status"], "demo");
        assert_eq!(frames[1]["count"], 8);
        assert_eq!(frames[2]["type"], "test");
        assert_eq!(frames[2]["active_connections"], 1);
    }

    #[tokio::test]
    async fn shutdown_stops_sleeping_producers() {
        let state = offline_state();
        let scheduler = Scheduler::spawn(state.clone());
        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .expect("producers stop promptly");
        assert_eq!(state.sim.lock().await.engine.tick(), 0);
    }
}
