#[derive(Debug, Deserialize)]
struct ActionPlanQuery {
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    period: Option<String>,
}

async fn latest_summary(state: &AppState) -> Result<contracts::ZoneDensitySummary, HttpApiError> {
    state
        .sim
        .lock()
        .await
        .latest_summary
        .clone()
        .ok_or_else(|| HttpApiError::not_found("no density data has been produced yet"))
}

async fn crowd_insights(State(state): State<AppState>) -> Result<Json<Value>, HttpApiError> {
    let summary = latest_summary(&state).await?;
    let insights = state.insights.crowd_insights(&summary, Utc::now());
    Ok(Json(json!({ "status": "success", "insights": insights })))
}

async fn action_plan(
    State(state): State<AppState>,
    Query(query): Query<ActionPlanQuery>,
) -> Result<Json<Value>, HttpApiError> {
    let summary = latest_summary(&state).await?;
    let mut alert_zones: Vec<String> = summary
        .critical_zones
        .iter()
        .chain(&summary.warning_zones)
        .cloned()
        .collect();
    if alert_zones.is_empty() {
        alert_zones.push(query.zone.unwrap_or_else(|| "all".to_string()));
    }

    let plan = state.insights.action_plan(&summary, &alert_zones, Utc::now());
    Ok(Json(json!({ "status": "success", "action_plan": plan })))
}

async fn incident_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, HttpApiError> {
    let summary = latest_summary(&state).await?;
    let alerts = state.sim.lock().await.history.alerts().to_vec();
    let period = query
        .period
        .filter(|period| !period.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REPORT_PERIOD.to_string());

    let report = state.insights.report(&summary, &alerts, &period, Utc::now());
    debug!(period = %period, alerts = alerts.len(), "insights.report_generated");
    Ok(Json(json!({ "status": "success", "report": report })))
}
