use super::function_cache::FunctionCache;
use super::scaling_config::ScalingConfig;
use super::scaling_error::{ScaleFromZeroError, ScalingError};
use super::service_query::ServiceQueryResponse;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// How a function came to be forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// A fresh cache entry reported ready replicas; no backend call was made.
    Cached,
    /// The backend already reported ready replicas.
    Available,
    /// Scaled from zero and observed a ready replica within the poll budget.
    Scaled,
    /// Scaled from zero but the poll budget ran out first. The request is
    /// still forwarded.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionScaleResult {
    pub outcome: ScaleOutcome,
    pub duration: Duration,
}

impl FunctionScaleResult {
    fn new(outcome: ScaleOutcome, start: Instant) -> Self {
        Self {
            outcome,
            duration: start.elapsed(),
        }
    }

    pub fn available(&self) -> bool {
        self.outcome != ScaleOutcome::Exhausted
    }
}

type SharedOutcome = Result<ScaleOutcome, Arc<ScaleFromZeroError>>;

// Per-function coordination used when `single_flight` is on. `completed`
// is bumped, with `last` locked, every time a scale-up sequence ends.
#[derive(Default)]
struct Flight {
    completed: AtomicU64,
    last: Mutex<Option<SharedOutcome>>,
}

/// Makes sure a function has a ready replica before a request reaches it.
pub struct FunctionScaler {
    cache: FunctionCache,
    config: ScalingConfig,
    in_flight: DashMap<String, Arc<Flight>>,
}

impl FunctionScaler {
    pub fn new(config: ScalingConfig) -> Self {
        Self {
            cache: FunctionCache::new(config.cache_expiry),
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &FunctionCache {
        &self.cache
    }

    /// Scales `function_name` from zero when needed and waits for it to
    /// become ready. An `Err` means the request must not be forwarded.
    pub async fn scale(
        &self,
        function_name: &str,
    ) -> Result<FunctionScaleResult, ScaleFromZeroError> {
        let start = Instant::now();

        if self.ready_in_cache(function_name) {
            return Ok(FunctionScaleResult::new(ScaleOutcome::Cached, start));
        }

        let query_response = self
            .config
            .service_query
            .get_replicas(function_name)
            .await
            .map_err(|source| {
                log_error(ScaleFromZeroError::Query {
                    name: function_name.to_string(),
                    source,
                })
            })?;

        self.cache.set(function_name, &query_response);

        if query_response.available_replicas > 0 {
            return Ok(FunctionScaleResult::new(ScaleOutcome::Available, start));
        }

        if !self.config.single_flight {
            return self.scale_up(function_name, &query_response, start).await;
        }

        let flight = Arc::clone(
            self.in_flight
                .entry(function_name.to_string())
                .or_default()
                .value(),
        );
        let seen = flight.completed.load(Ordering::Acquire);
        let mut last = flight.last.lock().await;

        // A sequence finished while we waited: share its outcome instead of
        // scaling and polling again.
        if flight.completed.load(Ordering::Acquire) != seen {
            if let Some(shared) = last.as_ref() {
                return match shared {
                    Ok(outcome) => Ok(FunctionScaleResult::new(*outcome, start)),
                    Err(err) => Err(ScaleFromZeroError::Coalesced(Arc::clone(err))),
                };
            }
        }

        if self.ready_in_cache(function_name) {
            return Ok(FunctionScaleResult::new(ScaleOutcome::Available, start));
        }

        let result = self.scale_up(function_name, &query_response, start).await;
        let (shared, result) = match result {
            Ok(res) => (Ok(res.outcome), Ok(res)),
            Err(err) => {
                let err = Arc::new(err);
                (
                    Err(Arc::clone(&err)),
                    Err(ScaleFromZeroError::Coalesced(err)),
                )
            }
        };
        *last = Some(shared);
        flight.completed.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn ready_in_cache(&self, function_name: &str) -> bool {
        let (cached, hit) = self.cache.get(function_name);
        hit && cached.available_replicas > 0
    }

    async fn scale_up(
        &self,
        function_name: &str,
        query_response: &ServiceQueryResponse,
        start: Instant,
    ) -> Result<FunctionScaleResult, ScaleFromZeroError> {
        let min_replicas = query_response.scale_target();

        log::info!(
            "[Scale] function={} 0 => {} requested",
            function_name,
            min_replicas
        );
        let scaling_start_time = Instant::now();

        self.config
            .service_query
            .set_replicas(function_name, min_replicas)
            .await
            .map_err(|source| {
                log_error(ScaleFromZeroError::ScaleCommand {
                    name: function_name.to_string(),
                    source,
                })
            })?;

        for _ in 0..self.config.max_poll_count {
            let query_response = self.poll_replicas(function_name).await?;

            if query_response.available_replicas > 0 {
                log::info!(
                    "[Scale] function={} 0 => {} successful - {} seconds",
                    function_name,
                    query_response.available_replicas,
                    scaling_start_time.elapsed().as_secs_f64()
                );
                return Ok(FunctionScaleResult::new(ScaleOutcome::Scaled, start));
            }

            sleep(self.config.function_poll_interval).await;
        }

        log::warn!(
            "[Scale] function={} not ready after {} attempts, forwarding anyway",
            function_name,
            self.config.max_poll_count
        );
        Ok(FunctionScaleResult::new(ScaleOutcome::Exhausted, start))
    }

    // Every poll overwrites the cache entry, failures included, so a stale
    // ready observation can never serve the fast path after an error.
    async fn poll_replicas(
        &self,
        function_name: &str,
    ) -> Result<ServiceQueryResponse, ScaleFromZeroError> {
        match self.config.service_query.get_replicas(function_name).await {
            Ok(query_response) => {
                self.cache.set(function_name, &query_response);
                Ok(query_response)
            }
            Err(source) => {
                self.cache
                    .set(function_name, &ServiceQueryResponse::default());
                Err(log_error(poll_error(function_name, source)))
            }
        }
    }
}

fn poll_error(function_name: &str, source: ScalingError) -> ScaleFromZeroError {
    ScaleFromZeroError::PollQuery {
        name: function_name.to_string(),
        source,
    }
}

fn log_error(err: ScaleFromZeroError) -> ScaleFromZeroError {
    log::error!("{}", err);
    err
}
