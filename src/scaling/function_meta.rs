use super::service_query::ServiceQueryResponse;
use std::time::Duration;
use tokio::time::Instant;

// FunctionMeta holds the last refresh time and the replica state
// observed at that time.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    last_refresh: Instant,
    service_query_response: ServiceQueryResponse,
}

impl FunctionMeta {
    pub fn new(service_query_response: ServiceQueryResponse) -> Self {
        Self {
            last_refresh: Instant::now(),
            service_query_response,
        }
    }

    // An entry is stale once `expiry` has fully elapsed since the refresh.
    pub fn expired(&self, expiry: Duration) -> bool {
        self.last_refresh.elapsed() >= expiry
    }

    pub fn response(&self) -> &ServiceQueryResponse {
        &self.service_query_response
    }
}
