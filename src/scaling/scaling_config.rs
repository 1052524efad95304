use super::service_query::ServiceQuery;
use std::sync::Arc;
use std::time::Duration;

/// Scaling behaviour shared by every request.
#[derive(Clone)]
pub struct ScalingConfig {
    /// Readiness queries to make after a scale-up before giving up.
    pub max_poll_count: u32,
    /// Delay between two readiness queries.
    pub function_poll_interval: Duration,
    /// Life-time of a cache entry before it is considered invalid.
    pub cache_expiry: Duration,
    /// Queries available/ready replicas for a function.
    pub service_query: Arc<dyn ServiceQuery>,
    /// Serialize concurrent cold starts of the same function.
    pub single_flight: bool,
}

impl ScalingConfig {
    pub fn new(service_query: Arc<dyn ServiceQuery>) -> Self {
        Self {
            max_poll_count: 1000,
            function_poll_interval: Duration::from_millis(50),
            cache_expiry: Duration::from_millis(250),
            service_query,
            single_flight: false,
        }
    }
}
