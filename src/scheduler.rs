//! Periodic refresh of every configured provider × supported pair.

use crate::core::{CurrencyPair, FetchOutcome, RateSource, RateStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub successes: usize,
    pub failures: usize,
    /// Providers skipped because the rate source has no configuration for them.
    pub skipped_providers: usize,
}

#[derive(Debug)]
pub enum PassOutcome {
    /// Another pass was already running.
    Skipped,
    Committed(PassSummary),
    /// The provider list could not be read; nothing was fetched.
    LoadFailed(StoreError),
    /// Fetching finished but the commit failed; the whole pass was rolled back.
    CommitFailed {
        summary: PassSummary,
        error: StoreError,
    },
}

/// Releases the running flag on every exit path of a pass.
struct PassGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard { running })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Sole writer of refreshed rates. At most one pass runs at a time; a pass
/// requested while another is running is skipped.
pub struct RefreshScheduler {
    store: Arc<dyn RateStore>,
    source: Arc<dyn RateSource>,
    pairs: Vec<CurrencyPair>,
    interval: Duration,
    running: AtomicBool,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        pairs: Vec<CurrencyPair>,
        interval: Duration,
    ) -> Self {
        RefreshScheduler {
            store,
            source,
            pairs,
            interval,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one full pass and commits it as a single batch.
    pub async fn run_pass(&self) -> PassOutcome {
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            warn!("Refresh pass already running; skipping");
            return PassOutcome::Skipped;
        };

        let started_at = Utc::now();
        info!(%started_at, "Starting rate refresh pass");

        let providers = match self.store.list_providers().await {
            Ok(providers) => providers,
            Err(e) => {
                error!(error = %e, "Failed to load providers; abandoning pass");
                return PassOutcome::LoadFailed(e);
            }
        };
        if providers.is_empty() {
            info!("No providers registered; nothing to refresh");
        }

        let mut summary = PassSummary {
            started_at,
            successes: 0,
            failures: 0,
            skipped_providers: 0,
        };
        let mut batch = self.store.begin();

        for provider in &providers {
            if !self.source.is_configured(&provider.name) {
                info!(provider = %provider.name, "Skipping provider with no API configuration");
                summary.skipped_providers += 1;
                continue;
            }

            debug!(provider = %provider.name, "Fetching rates for provider");
            for pair in &self.pairs {
                match self.source.fetch(&provider.name, pair).await {
                    FetchOutcome::Rate(rate) => {
                        batch.upsert(&provider.name, pair, rate, started_at);
                        summary.successes += 1;
                    }
                    FetchOutcome::Unavailable(reason) => {
                        debug!(provider = %provider.name, %pair, %reason, "Rate unavailable");
                        summary.failures += 1;
                    }
                }
            }
        }

        match self.store.commit(batch).await {
            Ok(applied) => {
                info!(
                    applied,
                    successes = summary.successes,
                    failures = summary.failures,
                    skipped_providers = summary.skipped_providers,
                    "Committed rate refresh pass"
                );
                PassOutcome::Committed(summary)
            }
            Err(e) => {
                error!(
                    error = %e,
                    successes = summary.successes,
                    failures = summary.failures,
                    "Failed to commit rate refresh pass; rolled back"
                );
                PassOutcome::CommitFailed { summary, error: e }
            }
        }
    }

    /// Spawns the recurring refresh task. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = scheduler.interval.as_secs(), "Refresh scheduler started");

            loop {
                tokio::select! {
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        scheduler.run_pass().await;
                    }
                }
            }
            info!("Refresh scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner of a running scheduler task.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals shutdown and waits for the task. A pass already in flight
    /// finishes first.
    pub async fn stop(self) {
        // The receiver only goes away if the task already ended.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Refresh scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::RateBatch;
    use crate::core::{Provider, Rate, UnavailableReason};
    use crate::store::memory::MemoryRateStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Quotes fixed rates; keys listed in `failing` are always unavailable.
    struct FixedSource {
        rates: HashMap<String, f64>,
        failing: Vec<(String, String)>,
        calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl FixedSource {
        fn new(rates: &[(&str, f64)]) -> Self {
            FixedSource {
                rates: rates.iter().map(|(p, r)| (p.to_string(), *r)).collect(),
                failing: Vec::new(),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn failing(mut self, provider: &str, pair: &str) -> Self {
            self.failing.push((provider.to_string(), pair.to_string()));
            self
        }

        fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl RateSource for FixedSource {
        fn is_configured(&self, provider: &str) -> bool {
            self.rates.contains_key(provider)
        }

        async fn fetch(&self, provider: &str, pair: &CurrencyPair) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            if self
                .failing
                .iter()
                .any(|(p, k)| p == provider && *k == pair.to_string())
            {
                return FetchOutcome::Unavailable(UnavailableReason::Transient);
            }
            FetchOutcome::Rate(self.rates[provider])
        }
    }

    /// Delegates reads to a memory store but refuses every commit.
    struct RejectingStore {
        inner: MemoryRateStore,
    }

    #[async_trait]
    impl RateStore for RejectingStore {
        async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
            self.inner.list_providers().await
        }

        async fn insert_provider(&self, provider: Provider) -> Result<bool, StoreError> {
            self.inner.insert_provider(provider).await
        }

        async fn get(
            &self,
            provider: &str,
            pair: &CurrencyPair,
        ) -> Result<Option<Rate>, StoreError> {
            self.inner.get(provider, pair).await
        }

        async fn rates_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Rate>, StoreError> {
            self.inner.rates_for_pair(pair).await
        }

        async fn rate_count(&self) -> Result<usize, StoreError> {
            self.inner.rate_count().await
        }

        async fn commit(&self, _batch: RateBatch) -> Result<usize, StoreError> {
            Err(StoreError::CommitRejected("disk full".to_string()))
        }
    }

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    async fn register(store: &dyn RateStore, names: &[&str]) {
        for name in names {
            store
                .insert_provider(Provider {
                    name: name.to_string(),
                    registration_link: format!("https://{name}.example.com/"),
                })
                .await
                .unwrap();
        }
    }

    fn scheduler(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        pairs: &[&str],
    ) -> RefreshScheduler {
        RefreshScheduler::new(
            store,
            source,
            pairs.iter().map(|p| pair(p)).collect(),
            Duration::from_secs(300),
        )
    }

    fn committed(outcome: PassOutcome) -> PassSummary {
        match outcome {
            PassOutcome::Committed(summary) => summary,
            other => panic!("expected committed pass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pass_writes_every_configured_key() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A", "B"]).await;
        let source = Arc::new(FixedSource::new(&[("A", 0.921), ("B", 0.919)]));
        let scheduler = scheduler(store.clone(), source, &["USD_EUR", "USD_GBP"]);

        let summary = committed(scheduler.run_pass().await);
        assert_eq!(summary.successes, 4);
        assert_eq!(summary.failures, 0);

        let a = store.get("A", &pair("USD_EUR")).await.unwrap().unwrap();
        let b = store.get("B", &pair("USD_EUR")).await.unwrap().unwrap();
        assert_eq!(a.rate, 0.921);
        assert_eq!(b.rate, 0.919);
        assert_eq!(a.last_updated, summary.started_at);
        assert_eq!(store.rate_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_two_passes_keep_one_row_per_key() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A", "B"]).await;
        let source = Arc::new(FixedSource::new(&[("A", 0.921), ("B", 0.919)]));
        let scheduler = scheduler(store.clone(), source, &["USD_EUR"]);

        committed(scheduler.run_pass().await);
        let second = committed(scheduler.run_pass().await);

        assert_eq!(store.rate_count().await.unwrap(), 2);
        let a = store.get("A", &pair("USD_EUR")).await.unwrap().unwrap();
        assert_eq!(a.last_updated, second.started_at);
    }

    #[tokio::test]
    async fn test_partial_failure_still_commits_the_rest() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A", "B"]).await;
        let source = Arc::new(
            FixedSource::new(&[("A", 0.921), ("B", 0.919)]).failing("A", "USD_GBP"),
        );
        let scheduler = scheduler(store.clone(), source, &["USD_EUR", "USD_GBP"]);

        let summary = committed(scheduler.run_pass().await);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.failures, 1);

        assert!(store.get("A", &pair("USD_GBP")).await.unwrap().is_none());
        assert!(store.get("A", &pair("USD_EUR")).await.unwrap().is_some());
        assert!(store.get("B", &pair("USD_GBP")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_skipped_not_failed() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A", "Unlisted"]).await;
        let source = Arc::new(FixedSource::new(&[("A", 0.921)]));
        let scheduler = scheduler(store.clone(), source.clone(), &["USD_EUR"]);

        let summary = committed(scheduler.run_pass().await);
        assert_eq!(summary.skipped_providers, 1);
        assert_eq!(summary.failures, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(store.get("Unlisted", &pair("USD_EUR")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_provider_list_commits_nothing() {
        let store = Arc::new(MemoryRateStore::new());
        let source = Arc::new(FixedSource::new(&[("A", 0.921)]));
        let scheduler = scheduler(store.clone(), source, &["USD_EUR"]);

        let summary = committed(scheduler.run_pass().await);
        assert_eq!(summary.successes + summary.failures, 0);
        assert_eq!(store.rate_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_previous_state() {
        let store = Arc::new(RejectingStore {
            inner: MemoryRateStore::new(),
        });
        register(store.as_ref(), &["A", "B"]).await;
        let before = Utc::now() - chrono::Duration::minutes(5);
        store
            .inner
            .upsert("A", &pair("USD_EUR"), 0.9, before)
            .await
            .unwrap();

        let source = Arc::new(FixedSource::new(&[("A", 0.921), ("B", 0.919)]));
        let scheduler = scheduler(store.clone(), source, &["USD_EUR"]);

        match scheduler.run_pass().await {
            PassOutcome::CommitFailed { summary, error } => {
                assert_eq!(summary.successes, 2);
                assert!(matches!(error, StoreError::CommitRejected(_)));
            }
            other => panic!("expected failed commit, got {other:?}"),
        }

        let a = store.get("A", &pair("USD_EUR")).await.unwrap().unwrap();
        assert_eq!(a.rate, 0.9);
        assert_eq!(a.last_updated, before);
        assert!(store.get("B", &pair("USD_EUR")).await.unwrap().is_none());

        // The scheduler is usable again after a failed pass.
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A"]).await;
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(FixedSource::new(&[("A", 0.921)]).gated(gate.clone()));
        let scheduler = Arc::new(scheduler(store.clone(), source, &["USD_EUR"]));

        let first = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run_pass().await }
        });
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(scheduler.run_pass().await, PassOutcome::Skipped));
        assert_eq!(store.rate_count().await.unwrap(), 0);

        gate.add_permits(1);
        committed(first.await.unwrap());
        assert!(!scheduler.is_running());
        assert_eq!(store.rate_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_on_each_tick_until_stopped() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A"]).await;
        let source = Arc::new(FixedSource::new(&[("A", 0.921)]));
        let scheduler = Arc::new(RefreshScheduler::new(
            store.clone(),
            source.clone(),
            vec![pair("USD_EUR")],
            Duration::from_secs(60),
        ));

        let handle = Arc::clone(&scheduler).start();

        // First tick fires immediately, the next two after each interval.
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(store.get("A", &pair("USD_EUR")).await.unwrap().is_some());

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_waits_for_pass_in_flight() {
        let store = Arc::new(MemoryRateStore::new());
        register(store.as_ref(), &["A"]).await;
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(FixedSource::new(&[("A", 0.921)]).gated(gate.clone()));
        let scheduler = Arc::new(scheduler(store.clone(), source.clone(), &["USD_EUR"]));

        let handle = Arc::clone(&scheduler).start();
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }

        let stopping = tokio::spawn(handle.stop());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!stopping.is_finished());
        assert_eq!(store.rate_count().await.unwrap(), 0);

        gate.add_permits(1);
        stopping.await.unwrap();

        assert!(!scheduler.is_running());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let a = store.get("A", &pair("USD_EUR")).await.unwrap().unwrap();
        assert_eq!(a.rate, 0.921);
    }
}
