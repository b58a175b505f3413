//! Shared cache of loaded images.
//!
//! The cache provides:
//! - Lookup of previously loaded images by path or array name
//! - Single-flight loading: concurrent requests for the same key share one load
//! - Explicit invalidation; nothing is evicted automatically
//!
//! A failed load is handed to every caller that waited for it but is not
//! stored, so the next request for the key tries again.

use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::error::VolumeError;
use crate::volume::ImageXyzc;

type LoadResult = Result<Arc<ImageXyzc>, VolumeError>;

/// State shared between the leader of a load and its waiters.
#[derive(Default)]
struct InFlightLoad {
    notify: Notify,
    result: Mutex<Option<LoadResult>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache of assembled images keyed by path or name.
#[derive(Default)]
pub struct ImageCache {
    images: RwLock<HashMap<String, Arc<ImageXyzc>>>,
    in_flight: Mutex<HashMap<String, Arc<InFlightLoad>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<ImageXyzc>> {
        self.images.read().await.get(key).cloned()
    }

    /// Store `image` under `key`, replacing any previous entry.
    pub async fn insert(&self, key: impl Into<String>, image: Arc<ImageXyzc>) {
        self.images.write().await.insert(key.into(), image);
    }

    /// Return the cached image for `key`, running `load` if there is none.
    ///
    /// While one caller runs `load`, other callers for the same key wait for
    /// its result instead of loading again.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ImageXyzc, VolumeError>>,
    {
        if let Some(image) = self.get(key).await {
            return Ok(image);
        }

        let state = loop {
            let (state, is_leader) = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.get(key) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightLoad::default());
                        in_flight.insert(key.to_string(), state.clone());
                        (state, true)
                    }
                }
            };
            if is_leader {
                break state;
            }

            // Register for the wakeup before looking at the result so that a
            // leader finishing in between is not missed.
            let mut notified = pin!(state.notify.notified());
            notified.as_mut().enable();

            let finished = lock(&state.result).clone();
            if let Some(result) = finished {
                return result;
            }
            if self.is_in_flight(key, &state) {
                debug!(key, "Waiting for in-flight load");
                notified.await;
                let finished = lock(&state.result).clone();
                if let Some(result) = finished {
                    return result;
                }
            }
            // The leader was dropped before finishing; try again
        };

        let _leader = LeaderGuard {
            cache: self,
            key,
            state: state.clone(),
        };

        // Another leader may have completed between the first lookup and
        // registration
        let result = match self.get(key).await {
            Some(image) => Ok(image),
            None => load().await.map(Arc::new),
        };
        if let Ok(image) = &result {
            self.insert(key, image.clone()).await;
        }
        *lock(&state.result) = Some(result.clone());
        result
    }

    fn is_in_flight(&self, key: &str, state: &Arc<InFlightLoad>) -> bool {
        lock(&self.in_flight)
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, state))
    }

    /// Remove one entry. Returns whether it was present.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.images.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.images.write().await.clear();
    }

    /// Number of cached images.
    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }

    /// Cached keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.images.read().await.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}

/// Ends a load on drop: clears the in-flight entry and wakes waiters, even
/// when the leading future is cancelled.
struct LeaderGuard<'a> {
    cache: &'a ImageCache,
    key: &'a str,
    state: Arc<InFlightLoad>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        {
            let mut in_flight = lock(&self.cache.in_flight);
            if in_flight
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.state))
            {
                in_flight.remove(self.key);
            }
        }
        self.state.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{VolumeBuffer, VolumeDimensions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    fn image(value: u8) -> ImageXyzc {
        let dims = VolumeDimensions {
            size_x: 2,
            size_y: 2,
            ..VolumeDimensions::default()
        };
        let mut buffer = VolumeBuffer::new(2, 2, 1, 1).unwrap();
        buffer.plane_mut(0, 0).unwrap().fill(value);
        ImageXyzc::from_buffer(&dims, buffer)
    }

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache = ImageCache::new();
        assert!(cache.is_empty().await);

        cache.insert("a.tif", Arc::new(image(1))).await;
        cache.insert("b.czi", Arc::new(image(2))).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a.tif").await.unwrap().data()[0], 1);
        assert!(cache.get("missing").await.is_none());
        assert_eq!(cache.keys().await, vec!["a.tif", "b.czi"]);

        assert!(cache.invalidate("a.tif").await);
        assert!(!cache.invalidate("a.tif").await);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_get_or_load_caches_success() {
        let cache = ImageCache::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let image = cache
                .get_or_load("vol", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(image(7))
                })
                .await
                .unwrap();
            assert_eq!(image.data()[0], 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ImageCache::new();
        let result = cache
            .get_or_load("bad", || async { Err(VolumeError::malformed("nope")) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);

        let result = cache.get_or_load("bad", || async { Ok(image(3)) }).await;
        assert!(result.is_ok());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_singleflight() {
        let cache = Arc::new(ImageCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("shared", || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(image(9))
                    })
                    .await
            }));
        }

        let mut images = Vec::new();
        for handle in handles {
            images.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(images.iter().all(|i| Arc::ptr_eq(i, &images[0])));
    }

    #[tokio::test]
    async fn test_concurrent_failure_shared() {
        let cache = Arc::new(ImageCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("broken", || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Err(VolumeError::unsupported("mosaic"))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters() {
        let cache = Arc::new(ImageCache::new());

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load("slow", || async {
                        sleep(Duration::from_secs(60)).await;
                        Ok(image(1))
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(20)).await;

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_load("slow", || async { Ok(image(2)) }).await })
        };
        sleep(Duration::from_millis(20)).await;
        leader.abort();

        let image = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(image.data()[0], 2);
    }
}
