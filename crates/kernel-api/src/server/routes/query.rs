#[derive(Debug, Serialize)]
struct StatusResponse {
    schema_version: String,
    backend_status: &'static str,
    websocket_connections: usize,
    timestamp: chrono::DateTime<Utc>,
    history_counts: contracts::HistoryCounts,
    alert_count: usize,
    trends: contracts::HistoryTrends,
    control: crate::control::ControlStats,
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    schema_version: String,
    thresholds: contracts::Thresholds,
    intervals: contracts::ProducerIntervals,
    frontend_origin: String,
    live_weather: bool,
    live_bus_feed: bool,
    insight_provider: String,
    control: crate::control::ControlStats,
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "online",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let websocket_connections = state.hub.subscriber_count().await;
    let (history_counts, trends) = {
        let sim = state.sim.lock().await;
        let summary = sim
            .history
            .summary(&sim.thresholds, state.config.intervals.density_secs);
        (summary.counts, summary.trends)
    };

    Json(StatusResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        backend_status: "operational",
        websocket_connections,
        timestamp: Utc::now(),
        alert_count: history_counts.total_alerts,
        history_counts,
        trends,
        control: state.control.stats(),
    })
}

async fn get_history(State(state): State<AppState>) -> Json<contracts::HistorySummary> {
    let sim = state.sim.lock().await;
    Json(
        sim.history
            .summary(&sim.thresholds, state.config.intervals.density_secs),
    )
}

async fn get_charts(State(state): State<AppState>) -> Json<contracts::ChartData> {
    Json(state.sim.lock().await.history.chart_data())
}

async fn get_export(State(state): State<AppState>) -> Json<Value> {
    let sim = state.sim.lock().await;
    Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "export_time": Utc::now(),
        "system_info": {
            "name": SERVICE_NAME,
            "primary_zone": sim.engine.registry().primary_zone().name,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "current_state": {
            "density": sim.latest_summary,
            "metro": sim.latest_metro,
        },
        "history": sim.history.summary(&sim.thresholds, state.config.intervals.density_secs),
    }))
}

async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let thresholds = state.sim.lock().await.thresholds;
    Json(SettingsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        thresholds,
        intervals: state.config.intervals,
        frontend_origin: state.config.frontend_origin.clone(),
        live_weather: state.config.weather.api_key.is_some(),
        live_bus_feed: state.config.bus_feed.url.is_some(),
        insight_provider: state.insights.name().to_string(),
        control: state.control.stats(),
    })
}

async fn nearby_responders(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Value>, HttpApiError> {
    let radius = query.radius.unwrap_or(DEFAULT_NEARBY_RADIUS_DEG);
    if !query.lat.is_finite() || !query.lon.is_finite() || !radius.is_finite() || radius <= 0.0 {
        return Err(HttpApiError::invalid_query(
            "lat, lon, and radius must be finite and radius positive",
            Some(format!("lat={} lon={} radius={radius}", query.lat, query.lon)),
        ));
    }

    let responders = state
        .sim
        .lock()
        .await
        .engine
        .responders()
        .nearby(GeoPoint::new(query.lat, query.lon), radius);
    Ok(Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "count": responders.len(),
        "responders": responders,
    })))
}
