//! Weather impact on cleanup time and BFS radius (§4.6, §4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindImpact {
    /// Wind speed in m/s.
    pub speed: f64,
    /// Wind direction in degrees, 0 = north, clockwise.
    pub direction: f64,
    /// Additional BFS radius hops contributed by wind (§4.6).
    pub radius_adjustment: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureImpact {
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityImpact {
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherImpact {
    pub wind_impact: WindImpact,
    pub temperature_impact: TemperatureImpact,
    pub visibility_impact: VisibilityImpact,
    /// Product of the three factors, clamped to `[0.64, 3.0]` (§4.8).
    pub total_factor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CleanupTimeEstimate {
    pub base_time_minutes: u32,
    pub adjusted_time_minutes: u32,
    pub factors: f64,
}
