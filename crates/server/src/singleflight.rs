//! Request coalescing for duplicate cache misses.
//!
//! When several requests miss on the same key at once, only one upstream
//! fetch runs; the rest await its outcome. A flight is keyed by the cache
//! key and lives in the map only while in progress, so a failed fetch is
//! retryable by the next request instead of being pinned forever.
//!
//! `OnceCell` carries the takeover semantics: if the task driving the
//! fetch is cancelled mid-flight, the next waiter's closure runs instead
//! of every waiter hanging on a leader that no longer exists.

use fieldpost_core::Error;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub struct Singleflight<K, T> {
    inflight: Mutex<HashMap<K, Arc<OnceCell<Result<T, Error>>>>>,
}

impl<K, T> Default for Singleflight<K, T> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<K, T> Singleflight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, sharing the outcome with every concurrent
    /// caller of the same key.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell.get_or_init(work).await.clone();

        // Retire the flight so a later miss starts fresh; the pointer check
        // keeps a newer flight under the same key intact.
        let mut inflight = self.inflight.lock().await;
        if let Some(current) = inflight.get(&key)
            && Arc::ptr_eq(current, &cell)
        {
            inflight.remove(&key);
        }

        result
    }

    #[cfg(test)]
    pub async fn inflight_count(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flights = Arc::new(Singleflight::<u32, String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run(7, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("payload".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "payload");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights = Singleflight::<u32, u32>::new();
        let a = flights.run(1, || async { Ok(10) });
        let b = flights.run(2, || async { Ok(20) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), 10);
        assert_eq!(b.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_failed_flight_is_retryable() {
        let flights = Singleflight::<u32, u32>::new();

        let first = flights.run(1, || async { Err(Error::UpstreamTimeout("slow".into())) }).await;
        assert!(matches!(first, Err(Error::UpstreamTimeout(_))));

        let second = flights.run(1, || async { Ok(42) }).await;
        assert_eq!(second.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_flight_retires_after_completion() {
        let flights = Singleflight::<u32, u32>::new();
        flights.run(1, || async { Ok(1) }).await.unwrap();
        assert_eq!(flights.inflight_count().await, 0);
    }
}
