//! Operator-facing insight text. Remote model backends implement [`InsightProvider`]; the
//! rule-based provider is used whenever none is configured.

use chrono::{DateTime, Utc};
use contracts::{Alert, AlertLevel, DensityStatus, ZoneDensitySummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrowdInsights {
    pub status: DensityStatus,
    pub risk_assessment: String,
    pub trend: String,
    pub metrics_to_monitor: Vec<String>,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPlan {
    pub immediate_actions: Vec<String>,
    pub short_term_actions: Vec<String>,
    pub resources: String,
    pub expected_outcome: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentReport {
    pub period: String,
    pub summary: String,
    pub problem_areas: Vec<String>,
    pub recommendations: Vec<String>,
    pub alert_count: usize,
    pub critical_alert_count: usize,
    pub efficiency_score: u32,
    pub timestamp: DateTime<Utc>,
}

pub trait InsightProvider: Send + Sync {
    fn name(&self) -> &str;

    fn crowd_insights(&self, summary: &ZoneDensitySummary, now: DateTime<Utc>) -> CrowdInsights;

    fn action_plan(
        &self,
        summary: &ZoneDensitySummary,
        alert_zones: &[String],
        now: DateTime<Utc>,
    ) -> ActionPlan;

    fn report(
        &self,
        summary: &ZoneDensitySummary,
        alerts: &[Alert],
        period: &str,
        now: DateTime<Utc>,
    ) -> IncidentReport;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedInsights;

impl InsightProvider for RuleBasedInsights {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn crowd_insights(&self, summary: &ZoneDensitySummary, now: DateTime<Utc>) -> CrowdInsights {
        let critical = summary.critical_zones.len();
        let warning = summary.warning_zones.len();
        let status = if critical > 0 {
            DensityStatus::Critical
        } else if warning > 0 {
            DensityStatus::Warning
        } else {
            DensityStatus::Normal
        };

        CrowdInsights {
            status,
            risk_assessment: format!("{critical} critical zones, {warning} warning zones"),
            trend: if critical > 0 { "Monitor closely" } else { "Stable" }.to_string(),
            metrics_to_monitor: vec![
                "Overall density".to_string(),
                "Hotspot count".to_string(),
                "Metro flow rate".to_string(),
            ],
            model: self.name().to_string(),
            timestamp: now,
        }
    }

    fn action_plan(
        &self,
        summary: &ZoneDensitySummary,
        alert_zones: &[String],
        now: DateTime<Utc>,
    ) -> ActionPlan {
        let mut immediate_actions = Vec::new();
        for zone in &summary.critical_zones {
            immediate_actions.push(format!("Hold entry and open auxiliary exits at {zone}"));
        }
        immediate_actions.extend(
            [
                "Increase crowd control personnel",
                "Activate alternative entrances",
            ]
            .map(String::from),
        );

        ActionPlan {
            immediate_actions,
            short_term_actions: [
                "Manage crowd flow with barriers",
                "Redirect flow to less congested areas",
                "Provide real-time updates to the crowd",
            ]
            .map(String::from)
            .to_vec(),
            resources: format!("Allocate resources to {} alerting zones", alert_zones.len()),
            expected_outcome: "Density reduction of 20-30% within 30 minutes".to_string(),
            timestamp: now,
        }
    }

    fn report(
        &self,
        summary: &ZoneDensitySummary,
        alerts: &[Alert],
        period: &str,
        now: DateTime<Utc>,
    ) -> IncidentReport {
        let critical_alert_count = alerts
            .iter()
            .filter(|alert| alert.level == AlertLevel::Critical)
            .count();
        let mut problem_areas = summary.critical_zones.clone();
        problem_areas.extend(summary.warning_zones.iter().cloned());

        let penalty = 10 * summary.critical_zones.len() + 4 * summary.warning_zones.len()
            + 2 * critical_alert_count;
        let efficiency_score = 100_u32.saturating_sub(penalty.min(100) as u32);

        IncidentReport {
            period: period.to_string(),
            summary: format!(
                "{} zones monitored, {} critical, {} warning, {} alerts in the {period}",
                summary.total_zones,
                summary.critical_zones.len(),
                summary.warning_zones.len(),
                alerts.len(),
            ),
            problem_areas,
            recommendations: [
                "Deploy additional personnel during peak hours",
                "Improve signage and crowd direction",
                "Increase real-time communication",
            ]
            .map(String::from)
            .to_vec(),
            alert_count: alerts.len(),
            critical_alert_count,
            efficiency_score,
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(critical: &[&str], warning: &[&str]) -> ZoneDensitySummary {
        ZoneDensitySummary {
            total_zones: 7,
            total_people_estimate: 42_000,
            max_density_overall: 210,
            critical_zones: critical.iter().map(|z| z.to_string()).collect(),
            warning_zones: warning.iter().map(|z| z.to_string()).collect(),
            all_hotspots: Vec::new(),
        }
    }

    #[test]
    fn status_reflects_worst_zone() {
        let provider = RuleBasedInsights;
        let now = Utc::now();
        assert_eq!(
            provider.crowd_insights(&summary(&[], &[]), now).status,
            DensityStatus::Normal
        );
        assert_eq!(
            provider.crowd_insights(&summary(&[], &["Koramangala"]), now).status,
            DensityStatus::Warning
        );
        let insights = provider.crowd_insights(&summary(&["Stadium"], &["Koramangala"]), now);
        assert_eq!(insights.status, DensityStatus::Critical);
        assert_eq!(insights.risk_assessment, "1 critical zones, 1 warning zones");
        assert_eq!(insights.model, "rule-based");
    }

    #[test]
    fn action_plan_leads_with_critical_zones() {
        let plan = RuleBasedInsights.action_plan(
            &summary(&["Stadium"], &[]),
            &["stadium".to_string()],
            Utc::now(),
        );
        assert!(plan.immediate_actions[0].contains("Stadium"));
        assert_eq!(plan.resources, "Allocate resources to 1 alerting zones");
    }

    #[test]
    fn report_score_drops_with_pressure() {
        let calm = RuleBasedInsights.report(&summary(&[], &[]), &[], "last hour", Utc::now());
        assert_eq!(calm.efficiency_score, 100);

        let tense = RuleBasedInsights.report(
            &summary(&["Stadium", "Majestic Bus Stand"], &["Cubbon Park"]),
            &[],
            "last hour",
            Utc::now(),
        );
        assert_eq!(tense.efficiency_score, 76);
        assert_eq!(tense.problem_areas.len(), 3);
    }
}
