//! Fan-out of one weather request to every registered client.
//!
//! Each client runs on its own tokio task and reports back through an
//! unbounded channel. `fetch_all` drains the channel until every worker has
//! dropped its sender, then joins the handles so that a worker which died
//! without reporting still shows up as a failed result.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    Config,
    error::{AggregatorError, FetchError},
    model::{AggregateResult, NormalizedResult, STATUS_INTERNAL_ERROR},
    provider::{WeatherClient, default_clients},
};

/// How long a worker waits for a client to wind down on its own after the
/// deadline or cancellation, before reporting the failure on its behalf.
const ABANDON_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct Aggregator {
    clients: Mutex<Vec<Arc<dyn WeatherClient>>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator pre-populated with every provider the config can build.
    pub fn from_config(config: &Config) -> Self {
        let aggregator = Self::new();
        for client in default_clients(config) {
            // Built-in clients always carry a name.
            if let Err(err) = aggregator.add_client(client) {
                warn!("skipping built-in client: {err}");
            }
        }
        aggregator
    }

    /// Register a client for all subsequent `fetch_all` calls.
    ///
    /// Requests already in flight keep the set of clients they started with.
    pub fn add_client(&self, client: Arc<dyn WeatherClient>) -> Result<(), AggregatorError> {
        if client.provider_name().trim().is_empty() {
            return Err(AggregatorError::InvalidClient(
                "client must report a non-empty provider name".to_string(),
            ));
        }

        debug!(provider = client.provider_name(), "registering client");
        self.registry().push(client);
        Ok(())
    }

    pub fn add<C: WeatherClient + 'static>(&self, client: C) -> Result<(), AggregatorError> {
        self.add_client(Arc::new(client))
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Query every registered client concurrently and collect one result per
    /// client.
    ///
    /// `timeout` bounds each client call and `cancel` aborts all of them.
    /// Provider failures are reported inside the returned results, so this
    /// never fails as a whole.
    pub async fn fetch_all(
        &self,
        latitude: f64,
        longitude: f64,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> AggregateResult {
        let snapshot = self.snapshot();
        let mut aggregate = AggregateResult::new();

        if snapshot.is_empty() {
            debug!("no clients registered");
            return aggregate;
        }

        info!(clients = snapshot.len(), latitude, longitude, "fetching weather");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let workers: Vec<(String, JoinHandle<()>)> = snapshot
            .into_iter()
            .map(|client| {
                let name = client.provider_name().to_string();
                let tx = tx.clone();
                let cancel = cancel.clone();
                let handle = tokio::spawn(async move {
                    let result = supervise(client.as_ref(), latitude, longitude, timeout, &cancel).await;
                    // The receiver only goes away if the caller dropped the request.
                    let _ = tx.send(result);
                });
                (name, handle)
            })
            .collect();
        drop(tx);

        while let Some(result) = rx.recv().await {
            debug!(provider = %result.provider, success = result.is_success(), "client finished");
            aggregate.push(result);
        }

        for (name, handle) in workers {
            if let Err(err) = handle.await {
                error!(provider = %name, "worker terminated without a result: {err}");
                aggregate.push(NormalizedResult::failure(
                    name,
                    STATUS_INTERNAL_ERROR,
                    format!("worker terminated unexpectedly: {err}"),
                ));
            }
        }

        info!(
            total = aggregate.len(),
            failed = aggregate.failures().count(),
            "weather fetch complete"
        );
        aggregate
    }

    fn snapshot(&self) -> Vec<Arc<dyn WeatherClient>> {
        self.registry().clone()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn WeatherClient>>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one client, resolving it ourselves if it ignores its deadline or the
/// cancellation signal.
async fn supervise(
    client: &dyn WeatherClient,
    latitude: f64,
    longitude: f64,
    timeout: Duration,
    cancel: &CancellationToken,
) -> NormalizedResult {
    let name = client.provider_name();
    let mut fetch = client.fetch(latitude, longitude, timeout, cancel);

    tokio::select! {
        result = &mut fetch => result,
        _ = cancel.cancelled() => {
            match tokio::time::timeout(ABANDON_GRACE, &mut fetch).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(provider = name, "client ignored cancellation");
                    NormalizedResult::from_error(name, &FetchError::Cancelled)
                }
            }
        }
        _ = tokio::time::sleep(timeout.saturating_add(ABANDON_GRACE)) => {
            warn!(provider = name, "client overran its timeout");
            NormalizedResult::from_error(name, &FetchError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CANCELLED_MESSAGE;
    use crate::model::{Observation, STATUS_TIMEOUT};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Instant;

    #[derive(Debug, Clone)]
    enum Behaviour {
        Succeed(f64),
        Fail(u16, &'static str),
        /// Sleeps, honouring cancellation, then succeeds.
        Slow(Duration),
        /// Sleeps without looking at the token or the timeout.
        Stubborn(Duration),
        Panic,
    }

    #[derive(Debug, Clone)]
    struct MockClient {
        name: String,
        behaviour: Behaviour,
    }

    impl MockClient {
        fn new(name: &str, behaviour: Behaviour) -> Self {
            Self {
                name: name.to_string(),
                behaviour,
            }
        }

        fn observation(temp: f64) -> Observation {
            Observation {
                observed_at: Utc::now(),
                temperature_c: temp,
                pressure_hpa: 1012.0,
                humidity_pct: 60,
                visibility_m: 10000.0,
                description: "Clear sky".to_string(),
            }
        }
    }

    #[async_trait]
    impl WeatherClient for MockClient {
        fn provider_name(&self) -> &str {
            &self.name
        }

        async fn fetch(
            &self,
            _latitude: f64,
            _longitude: f64,
            _timeout: Duration,
            cancel: &CancellationToken,
        ) -> NormalizedResult {
            match &self.behaviour {
                Behaviour::Succeed(temp) => {
                    NormalizedResult::success(&self.name, Self::observation(*temp))
                }
                Behaviour::Fail(code, msg) => NormalizedResult::failure(&self.name, *code, *msg),
                Behaviour::Slow(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => NormalizedResult::from_error(&self.name, &FetchError::Cancelled),
                        _ = tokio::time::sleep(*delay) => NormalizedResult::success(&self.name, Self::observation(0.0)),
                    }
                }
                Behaviour::Stubborn(delay) => {
                    tokio::time::sleep(*delay).await;
                    NormalizedResult::success(&self.name, Self::observation(0.0))
                }
                Behaviour::Panic => panic!("mock client exploded"),
            }
        }
    }

    fn cancel_after(delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.cancel();
        });
        cancel
    }

    #[tokio::test]
    async fn no_clients_returns_empty_result() {
        let aggregator = Aggregator::new();
        let result = aggregator
            .fetch_all(55.0, 37.0, Duration::from_secs(10), CancellationToken::new())
            .await;

        assert!(result.is_empty());
    }

    #[test]
    fn blank_client_name_is_rejected() {
        let aggregator = Aggregator::new();
        let err = aggregator
            .add(MockClient::new("  ", Behaviour::Succeed(1.0)))
            .unwrap_err();

        assert!(matches!(err, AggregatorError::InvalidClient(_)));
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn happy_case_returns_every_result() {
        let aggregator = Aggregator::new();
        aggregator.add(MockClient::new("MockService1", Behaviour::Succeed(22.5))).unwrap();
        aggregator.add(MockClient::new("MockService2", Behaviour::Succeed(21.0))).unwrap();

        let result = aggregator
            .fetch_all(55.0, 37.0, Duration::from_secs(10), CancellationToken::new())
            .await;

        assert_eq!(result.len(), 2);
        let temp = |name| result.find(name).and_then(|r| r.observation()).map(|o| o.temperature_c);
        assert_eq!(temp("MockService1"), Some(22.5));
        assert_eq!(temp("MockService2"), Some(21.0));
    }

    #[tokio::test]
    async fn partial_failure_keeps_both_outcomes() {
        let aggregator = Aggregator::new();
        aggregator.add(MockClient::new("MockSuccess", Behaviour::Succeed(23.0))).unwrap();
        aggregator
            .add(MockClient::new("MockFailure", Behaviour::Fail(503, "Some error occurred")))
            .unwrap();

        let result = aggregator
            .fetch_all(55.0, 37.0, Duration::from_secs(10), CancellationToken::new())
            .await;

        assert_eq!(result.len(), 2);
        assert!(result.find("MockSuccess").unwrap().is_success());

        let failure = result.find("MockFailure").unwrap();
        assert!(!failure.is_success());
        assert_eq!(failure.error_message(), Some("Some error occurred"));
    }

    #[tokio::test]
    async fn success_flags_match_simulated_outcomes() {
        let aggregator = Aggregator::new();
        let expected: Vec<(String, bool)> = (0..12)
            .map(|i| (format!("client-{i}"), i % 3 != 0))
            .collect();
        for (name, ok) in &expected {
            let behaviour = if *ok {
                Behaviour::Succeed(10.0)
            } else {
                Behaviour::Fail(500, "boom")
            };
            aggregator.add(MockClient::new(name, behaviour)).unwrap();
        }

        let result = aggregator
            .fetch_all(0.0, 0.0, Duration::from_secs(5), CancellationToken::new())
            .await;

        assert_eq!(result.len(), expected.len());
        for (name, ok) in &expected {
            assert_eq!(result.find(name).map(|r| r.is_success()), Some(*ok), "{name}");
        }
    }

    #[tokio::test]
    async fn clients_run_concurrently() {
        let aggregator = Aggregator::new();
        for i in 0..5 {
            aggregator
                .add(MockClient::new(&format!("slow-{i}"), Behaviour::Slow(Duration::from_millis(300))))
                .unwrap();
        }

        let started = Instant::now();
        let result = aggregator
            .fetch_all(0.0, 0.0, Duration::from_secs(5), CancellationToken::new())
            .await;

        assert_eq!(result.successes().count(), 5);
        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn cancellation_fails_pending_clients_only() {
        let aggregator = Aggregator::new();
        aggregator.add(MockClient::new("MockService1", Behaviour::Succeed(22.5))).unwrap();
        aggregator
            .add(MockClient::new("MockService2", Behaviour::Slow(Duration::from_secs(1))))
            .unwrap();

        let result = aggregator
            .fetch_all(55.0, 37.0, Duration::from_secs(10), cancel_after(Duration::from_millis(100)))
            .await;

        assert_eq!(result.len(), 2);
        assert!(result.find("MockService1").unwrap().is_success());

        let cancelled = result.find("MockService2").unwrap();
        assert!(!cancelled.is_success());
        assert_eq!(cancelled.error_message(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn client_ignoring_cancellation_is_abandoned() {
        let aggregator = Aggregator::new();
        aggregator
            .add(MockClient::new("Stubborn", Behaviour::Stubborn(Duration::from_secs(30))))
            .unwrap();

        let started = Instant::now();
        let result = aggregator
            .fetch_all(0.0, 0.0, Duration::from_secs(10), cancel_after(Duration::from_millis(100)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let abandoned = result.find("Stubborn").unwrap();
        assert_eq!(abandoned.status_code(), Some(STATUS_TIMEOUT));
        assert_eq!(abandoned.error_message(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn client_overrunning_timeout_is_abandoned() {
        let aggregator = Aggregator::new();
        aggregator
            .add(MockClient::new("Stubborn", Behaviour::Stubborn(Duration::from_secs(30))))
            .unwrap();

        let result = aggregator
            .fetch_all(0.0, 0.0, Duration::from_millis(200), CancellationToken::new())
            .await;

        assert_eq!(result.find("Stubborn").unwrap().status_code(), Some(STATUS_TIMEOUT));
    }

    #[tokio::test]
    async fn panicking_client_is_reported_as_failure() {
        let aggregator = Aggregator::new();
        aggregator.add(MockClient::new("Fine", Behaviour::Succeed(1.0))).unwrap();
        aggregator.add(MockClient::new("Broken", Behaviour::Panic)).unwrap();

        let result = aggregator
            .fetch_all(0.0, 0.0, Duration::from_secs(5), CancellationToken::new())
            .await;

        assert_eq!(result.len(), 2);
        assert!(result.find("Fine").unwrap().is_success());
        assert_eq!(
            result.find("Broken").unwrap().status_code(),
            Some(STATUS_INTERNAL_ERROR)
        );
    }

    #[tokio::test]
    async fn registration_during_fetch_does_not_affect_snapshot() {
        let aggregator = Arc::new(Aggregator::new());
        aggregator
            .add(MockClient::new("first", Behaviour::Slow(Duration::from_millis(300))))
            .unwrap();

        let in_flight = {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                aggregator
                    .fetch_all(0.0, 0.0, Duration::from_secs(5), CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let adders: Vec<_> = (0..8)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    aggregator
                        .add(MockClient::new(&format!("late-{i}"), Behaviour::Succeed(0.0)))
                        .unwrap();
                })
            })
            .collect();
        for adder in adders {
            adder.await.unwrap();
        }

        let result = in_flight.await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.find("first").is_some());
        assert_eq!(aggregator.len(), 9);
    }
}
