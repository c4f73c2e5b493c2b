#[derive(Debug, Serialize)]
struct ControlResponse {
    schema_version: String,
    status: &'static str,
    paused: bool,
}

impl ControlResponse {
    fn new(status: &'static str, paused: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            status,
            paused,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpeedQuery {
    multiplier: f64,
}

async fn update_thresholds(
    State(state): State<AppState>,
    Query(update): Query<ThresholdUpdate>,
) -> Result<Json<Value>, HttpApiError> {
    let thresholds = {
        let mut sim = state.sim.lock().await;
        let mut candidate = sim.thresholds;
        candidate.apply(&update);
        if candidate.density_warning >= candidate.density_critical {
            return Err(HttpApiError::invalid_command(
                "warning threshold must stay below critical threshold",
                Some(format!(
                    "warning={} critical={}",
                    candidate.density_warning, candidate.density_critical
                )),
            ));
        }
        sim.thresholds = candidate;
        candidate
    };

    info!(
        warning = thresholds.density_warning,
        critical = thresholds.density_critical,
        metro = thresholds.metro_flow,
        "control.thresholds_updated"
    );
    Ok(Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "status": "success",
        "thresholds": thresholds,
    })))
}

async fn pause_simulation(State(state): State<AppState>) -> Json<ControlResponse> {
    state.control.set_paused(true);
    info!("control.paused");
    Json(ControlResponse::new("paused", true))
}

async fn resume_simulation(State(state): State<AppState>) -> Json<ControlResponse> {
    state.control.set_paused(false);
    info!("control.resumed");
    Json(ControlResponse::new("resumed", false))
}

async fn toggle_simulation(State(state): State<AppState>) -> Json<ControlResponse> {
    let paused = state.control.toggle();
    info!(paused, "control.toggled");
    Json(ControlResponse::new("toggled", paused))
}

async fn set_speed(
    State(state): State<AppState>,
    Query(query): Query<SpeedQuery>,
) -> Result<Json<Value>, HttpApiError> {
    if !query.multiplier.is_finite() || query.multiplier <= 0.0 {
        return Err(HttpApiError::invalid_command(
            "speed multiplier must be a positive number",
            Some(format!("multiplier={}", query.multiplier)),
        ));
    }
    let applied = state.control.set_speed(query.multiplier);
    Ok(Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "status": "success",
        "speed_multiplier": applied,
    })))
}

async fn toggle_demo_mode(State(state): State<AppState>) -> Json<Value> {
    let enabled = !state.control.demo_mode();
    state.control.set_demo_mode(enabled);
    info!(enabled, "control.demo_mode");
    Json(json!({
        "schema_version": SCHEMA_VERSION_V1,
        "status": "toggled",
        "demo_mode": enabled,
        "speed_multiplier": state.control.speed(),
    }))
}

async fn reset_history(State(state): State<AppState>) -> Json<Value> {
    state.sim.lock().await.history.clear();
    Json(json!({ "schema_version": SCHEMA_VERSION_V1, "status": "history_cleared" }))
}

async fn reset_stats(State(state): State<AppState>) -> Json<Value> {
    state.control.reset_stats();
    Json(json!({ "schema_version": SCHEMA_VERSION_V1, "status": "stats_reset" }))
}
