//! Output generator (§4.9): template-driven rendering of the final
//! checklist/report once a session reaches completion.
//!
//! Shaped after a `StrategicAdvisory`/shift-summary rendering
//! (`agents/strategic.rs` builds a structured advisory then a plain-text
//! narrative from the same data) — generalised here from a single advisory
//! shape to the eight report sections this engine defines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NotificationRecord, RiskLevel, SessionState};

/// One line of the handling timeline (§4.9 "handling timeline... from
/// `actions_taken` with timestamps").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: String,
}

/// The structured final report written to `SessionState::final_report`
/// (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub session_id: String,
    pub scenario_type: String,
    pub event_summary: String,
    pub risk_level: Option<RiskLevel>,
    pub risk_score: Option<u8>,
    pub risk_rationale: String,
    pub timeline: Vec<TimelineEntry>,
    pub checklist_items: Vec<(String, bool)>,
    pub coordination_units: Vec<NotificationRecord>,
    pub affected_stands: Vec<String>,
    pub affected_taxiways: Vec<String>,
    pub affected_runways: Vec<String>,
    pub affected_flight_count: u32,
    pub total_delay_minutes: u32,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Render the final report from complete session state (§4.9). Pure
/// function of state; callers set `final_report`/`final_answer`/
/// `awaiting_user` via the returned `StateDelta` in the tool that calls
/// this (`generate_report`, §4.3).
pub fn generate_report(state: &SessionState) -> FinalReport {
    let event_summary = build_event_summary(state);

    let timeline = state
        .actions_taken
        .iter()
        .map(|a| TimelineEntry {
            timestamp: a.timestamp,
            action: a.action.clone(),
            outcome: a.observation.clone(),
        })
        .collect();

    let checklist_items = state
        .checklist
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    let (affected_stands, affected_taxiways, affected_runways) = state
        .spatial_analysis
        .as_ref()
        .map(|s| (s.affected_stands.clone(), s.affected_taxiways.clone(), s.affected_runways.clone()))
        .unwrap_or_default();

    let (affected_flight_count, total_delay_minutes) = state
        .flight_impact_prediction
        .as_ref()
        .map(|p| (p.statistics.total, p.statistics.total_delay_minutes))
        .unwrap_or((0, 0));

    let recommendations = build_recommendations(state);

    FinalReport {
        session_id: state.session_id.clone(),
        scenario_type: state.scenario_type.clone(),
        event_summary,
        risk_level: state.risk_assessment.as_ref().map(|r| r.level),
        risk_score: state.risk_assessment.as_ref().map(|r| r.score),
        risk_rationale: state.risk_assessment.as_ref().map(|r| r.rationale.clone()).unwrap_or_default(),
        timeline,
        checklist_items,
        coordination_units: state.notifications_sent.clone(),
        affected_stands,
        affected_taxiways,
        affected_runways,
        affected_flight_count,
        total_delay_minutes,
        recommendations,
        generated_at: Utc::now(),
    }
}

fn build_event_summary(state: &SessionState) -> String {
    let position = state
        .incident
        .get("position")
        .or_else(|| state.incident.get("position_display"))
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown position".to_string());
    let flight = state
        .incident
        .get("flight_no_display")
        .or_else(|| state.incident.get("flight_no"))
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown flight".to_string());
    format!("{} incident involving {flight} at {position}", state.scenario_type)
}

/// Recommendations derived from risk level and the rule-engine's
/// `immediate_actions` (§4.9 "recommendations (derived from risk level and
/// `immediate_actions`)").
fn build_recommendations(state: &SessionState) -> Vec<String> {
    let Some(risk) = &state.risk_assessment else {
        return vec!["complete risk assessment before closing out".to_string()];
    };

    let mut recommendations = risk.immediate_actions.clone();
    match risk.level {
        RiskLevel::High | RiskLevel::Critical => {
            recommendations.push("maintain heightened monitoring until cleanup is confirmed complete".to_string());
        }
        RiskLevel::MediumHigh => {
            recommendations.push("reassess if conditions change (weather, leak size, engine status)".to_string());
        }
        RiskLevel::Medium | RiskLevel::Low => {
            recommendations.push("standard follow-up inspection after cleanup".to_string());
        }
    }
    if risk.guardrails.requires_human_approval {
        recommendations.push("requires human approval before further automated action".to_string());
    }
    recommendations
}

/// Render a report as Markdown (§6 `/event/{id}/report/markdown`).
pub fn render_markdown(report: &FinalReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Incident Report — {}\n\n", report.session_id));
    out.push_str(&format!("**Scenario**: {}\n\n", report.scenario_type));
    out.push_str(&format!("## Event Summary\n\n{}\n\n", report.event_summary));

    out.push_str("## Risk Assessment\n\n");
    match (report.risk_level, report.risk_score) {
        (Some(level), Some(score)) => {
            out.push_str(&format!("- Level: **{level}**\n- Score: {score}\n- Rationale: {}\n\n", report.risk_rationale));
        }
        _ => out.push_str("- Not assessed\n\n"),
    }

    out.push_str("## Handling Timeline\n\n");
    for entry in &report.timeline {
        out.push_str(&format!("- `{}` {} — {}\n", entry.timestamp.to_rfc3339(), entry.action, entry.outcome));
    }
    out.push('\n');

    out.push_str("## Checklist\n\n");
    for (field, done) in &report.checklist_items {
        out.push_str(&format!("- [{}] {field}\n", if *done { "x" } else { " " }));
    }
    out.push('\n');

    out.push_str("## Coordination Units Notified\n\n");
    for unit in &report.coordination_units {
        out.push_str(&format!("- {} ({}) at {}\n", unit.department, unit.priority, unit.timestamp.to_rfc3339()));
    }
    out.push('\n');

    out.push_str("## Operational Impact\n\n");
    out.push_str(&format!(
        "- Affected stands: {:?}\n- Affected taxiways: {:?}\n- Affected runways: {:?}\n- Flights affected: {}\n- Total delay: {} min\n\n",
        report.affected_stands, report.affected_taxiways, report.affected_runways,
        report.affected_flight_count, report.total_delay_minutes
    ));

    out.push_str("## Recommendations\n\n");
    for rec in &report.recommendations {
        out.push_str(&format!("- {rec}\n"));
    }
    out.push_str(&format!("\n_Generated at {}_\n", report.generated_at.to_rfc3339()));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionRecord, Guardrails, RiskAssessment};

    #[test]
    fn report_carries_timeline_and_checklist() {
        let mut state = SessionState::new("s1", "oil_spill");
        state.incident.insert("position".to_string(), "217".into());
        state.risk_assessment = Some(RiskAssessment {
            level: RiskLevel::High,
            score: 95,
            factors: vec![],
            rationale: "matched rule".to_string(),
            rules_triggered: vec!["r1".to_string()],
            immediate_actions: vec!["notify fire department".to_string()],
            guardrails: Guardrails::default(),
            risk_floor_applied: None,
        });
        state.actions_taken.push(ActionRecord {
            action: "assess_risk".to_string(),
            timestamp: Utc::now(),
            inputs: serde_json::Value::Null,
            observation: "risk level HIGH".to_string(),
            success: true,
        });
        state.checklist.insert("position".to_string(), true);

        let report = generate_report(&state);
        assert_eq!(report.risk_level, Some(RiskLevel::High));
        assert_eq!(report.timeline.len(), 1);
        assert!(report.recommendations.contains(&"notify fire department".to_string()));

        let markdown = render_markdown(&report);
        assert!(markdown.contains("HIGH"));
    }
}
