use std::time::Duration;

/// Engine tunables. Defaults match the nominal 15-minute tick.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fraction of the wind speed that notes actually travel at.
    pub drift_factor: f64,
    /// Hours of drift applied per tick.
    pub elapsed_hours: f64,
    /// How close a note must drift to a user to count as an encounter.
    pub discovery_radius_miles: f64,
    /// How far from a candidate position an inhabited area must exist for
    /// the note to survive.
    pub habitability_radius_miles: f64,
    /// How long one cell's wind reading stays fresh.
    pub wind_cache_ttl: Duration,
    /// Per-fetch bound on the wind source.
    pub wind_timeout: Duration,
    /// Overall bound on one tick, enforced by the scheduler.
    pub tick_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift_factor: crate::drift::DRIFT_FACTOR,
            elapsed_hours: 0.25,
            discovery_radius_miles: 10.0,
            habitability_radius_miles: 20.0,
            wind_cache_ttl: Duration::from_secs(30 * 60),
            wind_timeout: Duration::from_secs(10),
            tick_deadline: Duration::from_secs(60),
        }
    }
}
