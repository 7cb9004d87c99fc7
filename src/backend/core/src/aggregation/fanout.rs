//! Bounded fan-out for sibling loads.
//!
//! Sibling loads (guides per sequence, off-targets per guide) run
//! concurrently on the calling task, gated by a tokio [`Semaphore`] shared
//! across requests. One join never has more siblings waiting on the
//! semaphore than the pool has permits, so the acquire timeout only measures
//! contention with other requests. The first fault wins: as soon as one
//! sibling fails, the join returns that error and drops every other in-flight
//! sibling future.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{AtlasError, ErrorCode, Result};
use crate::telemetry::FanOutGauge;

#[derive(Default)]
struct PoolStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// Permits dropped before their load finished.
    cancelled: AtomicU64,
    acquire_timeouts: AtomicU64,
    total_wait_time_us: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl PoolStats {
    fn record_acquire(&self, wait_time: Duration) -> usize {
        self.total_wait_time_us
            .fetch_add(wait_time.as_micros() as u64, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
        current
    }

    fn record_release(&self) -> usize {
        self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1
    }
}

/// Permit held for the duration of one sibling load.
struct LoadPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<PoolStats>,
    pool_name: Arc<str>,
    finished: bool,
}

impl LoadPermit {
    fn finish(mut self, success: bool) {
        self.finished = true;
        if success {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for LoadPermit {
    fn drop(&mut self) {
        if !self.finished {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        let in_flight = self.stats.record_release();
        FanOutGauge::set_in_flight(&self.pool_name, in_flight);
    }
}

/// Snapshot of fan-out pool counters.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutStats {
    pub name: String,
    pub max_in_flight: usize,
    pub available_permits: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub acquire_timeouts: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub avg_wait_time_us: u64,
}

/// Semaphore-bounded executor for sibling loads.
pub struct FanOutPool {
    name: Arc<str>,
    max_in_flight: usize,
    acquire_timeout: Duration,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
}

impl FanOutPool {
    pub fn new(name: impl Into<String>, max_in_flight: usize, acquire_timeout: Duration) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        tracing::info!(
            pool_name = %name,
            max_in_flight,
            acquire_timeout_ms = acquire_timeout.as_millis() as u64,
            "Fan-out pool created"
        );

        Self {
            name,
            max_in_flight,
            acquire_timeout,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn acquire(&self) -> Result<LoadPermit> {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let permit = tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| {
                self.stats.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    pool_name = %self.name,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Fan-out permit acquire timed out"
                );
                AtlasError::with_internal(
                    ErrorCode::FanOutSaturated,
                    "The service is busy, please retry",
                    format!(
                        "fan-out pool '{}' acquire timeout after {}ms",
                        self.name,
                        self.acquire_timeout.as_millis()
                    ),
                )
            })??;

        let in_flight = self.stats.record_acquire(start.elapsed());
        FanOutGauge::set_in_flight(&self.name, in_flight);

        Ok(LoadPermit {
            _permit: permit,
            stats: self.stats.clone(),
            pool_name: self.name.clone(),
            finished: false,
        })
    }

    /// Run one load while holding a permit.
    pub async fn run<Fut, T>(&self, load: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire().await?;
        let result = load.await;
        permit.finish(result.is_ok());
        result
    }

    /// Run sibling loads concurrently and collect their results in input
    /// order. Returns the first error; remaining siblings are dropped.
    pub async fn join_all<I, Fut, T>(&self, loads: I) -> Result<Vec<T>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T>>,
    {
        let runs: Vec<_> = loads
            .into_iter()
            .enumerate()
            .map(|(index, load)| async move { self.run(load).await.map(|value| (index, value)) })
            .collect();
        let mut indexed: Vec<(usize, T)> = stream::iter(runs)
            .buffer_unordered(self.max_in_flight)
            .try_collect()
            .await?;

        indexed.sort_unstable_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, value)| value).collect())
    }

    pub fn stats(&self) -> FanOutStats {
        let stats = &self.stats;
        let submitted = stats.submitted.load(Ordering::Relaxed);
        let avg_wait_time_us = if submitted > 0 {
            stats.total_wait_time_us.load(Ordering::Relaxed) / submitted
        } else {
            0
        };

        FanOutStats {
            name: self.name.to_string(),
            max_in_flight: self.max_in_flight,
            available_permits: self.semaphore.available_permits(),
            submitted,
            succeeded: stats.succeeded.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            cancelled: stats.cancelled.load(Ordering::Relaxed),
            acquire_timeouts: stats.acquire_timeouts.load(Ordering::Relaxed),
            in_flight: stats.in_flight.load(Ordering::Relaxed),
            peak_in_flight: stats.peak_in_flight.load(Ordering::Relaxed),
            avg_wait_time_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn pool(max: usize) -> FanOutPool {
        FanOutPool::new("test", max, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_join_all_preserves_input_order() {
        let pool = pool(4);
        let loads = (0..5u64).map(|i| async move {
            tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
            Ok::<_, AtlasError>(i)
        });
        let results = pool.join_all(loads).await.unwrap();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = pool(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let loads = (0..6).map(|_| {
            let current = current.clone();
            let peak = peak.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AtlasError>(())
            }
        });
        pool.join_all(loads).await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(pool.stats().peak_in_flight <= 2);
    }

    #[tokio::test]
    async fn test_first_fault_wins_and_drops_siblings() {
        let pool = pool(8);
        let completed = Arc::new(AtomicUsize::new(0));

        let loads = (0..4).map(|i| {
            let completed = completed.clone();
            async move {
                if i == 1 {
                    return Err(AtlasError::internal("boom"));
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AtlasError>(i)
            }
        });

        let err = pool.join_all(loads).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.cancelled + stats.failed, stats.submitted);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(pool.available_permits(), 8);
    }

    #[tokio::test]
    async fn test_acquire_timeout_reports_saturation() {
        let pool = FanOutPool::new("tiny", 1, Duration::from_millis(20));
        let hog = pool.join_all(std::iter::once(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, AtlasError>(())
        }));
        let late = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            pool.join_all(std::iter::once(async { Ok::<_, AtlasError>(()) })).await
        };

        let (hog, late) = tokio::join!(hog, late);
        assert!(hog.is_ok());
        assert_eq!(late.unwrap_err().code(), ErrorCode::FanOutSaturated);
        assert_eq!(pool.stats().acquire_timeouts, 1);
    }

    #[tokio::test]
    async fn test_wide_join_does_not_starve_itself() {
        let pool = FanOutPool::new("narrow", 2, Duration::from_millis(50));
        let loads = (0..12u64).map(|i| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, AtlasError>(i)
        });

        let results = pool.join_all(loads).await.unwrap();
        assert_eq!(results, (0..12u64).collect::<Vec<_>>());

        let stats = pool.stats();
        assert_eq!(stats.acquire_timeouts, 0);
        assert!(stats.peak_in_flight <= 2);
    }
}
