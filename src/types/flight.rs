//! Flight plan and flight-impact prediction types (§3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the flight-plan table external data feed (§1 "out of scope:
/// persistent data files... only their interfaces are defined").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightPlanEntry {
    pub flight_no: String,
    pub scheduled_time: DateTime<Utc>,
    pub stand: Option<String>,
    pub taxiway: Option<String>,
    pub runway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceFlight {
    pub flight_no: String,
    pub reference_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBucket {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedFlight {
    pub flight_no: String,
    pub scheduled_time: DateTime<Utc>,
    pub facility_intersected: String,
    pub delay_minutes: u32,
    pub severity: SeverityBucket,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeverityDistribution {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightImpactStatistics {
    pub total: u32,
    pub total_delay_minutes: u32,
    pub severity_distribution: SeverityDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightImpactPrediction {
    pub time_window: TimeWindow,
    pub affected_flights: Vec<AffectedFlight>,
    pub statistics: FlightImpactStatistics,
}
