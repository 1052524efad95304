// Replica state cache shared by every in-flight request.
use super::function_meta::FunctionMeta;
use super::service_query::ServiceQueryResponse;
use dashmap::DashMap;
use std::time::Duration;

pub struct FunctionCache {
    cache: DashMap<String, FunctionMeta>,
    expiry: Duration,
}

impl FunctionCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            expiry,
        }
    }

    /// Returns the cached response and whether it is still fresh. A missing
    /// function yields an empty response and `false`.
    pub fn get(&self, function: &str) -> (ServiceQueryResponse, bool) {
        match self.cache.get(function) {
            Some(entry) => (entry.response().clone(), !entry.expired(self.expiry)),
            None => (ServiceQueryResponse::default(), false),
        }
    }

    pub fn set(&self, function: &str, query_res: &ServiceQueryResponse) {
        self.cache
            .insert(function.to_string(), FunctionMeta::new(query_res.clone()));
    }

    /// Drops every stale entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, meta| !meta.expired(self.expiry));
        before.saturating_sub(self.cache.len())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
