use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 64KB.
/// Covers a TIFF header plus a typical IFD in one read.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks (16MB with default blocks).
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Block-based caching layer over any [`RangeReader`].
///
/// Metadata extraction touches many small, scattered ranges: IFD entries,
/// out-of-line tag values, CZI directory entries. The block cache turns
/// them into a few aligned reads.
///
/// - Fixed-size blocks with LRU eviction
/// - Concurrent requests for the same block share one fetch
/// - Reads spanning several blocks are stitched together
pub struct BlockCache<R> {
    inner: Arc<R>,
    block_size: usize,
    cache: RwLock<LruCache<u64, Bytes>>,
    /// Blocks currently being fetched
    in_flight: Mutex<HashMap<u64, Arc<Notify>>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap a reader with default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap a reader with a custom block size and block count.
    ///
    /// A zero block size or capacity is raised to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently held.
    pub async fn cached_blocks(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Get a block from cache or fetch it, sharing concurrent fetches.
    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        loop {
            {
                let cache = self.cache.read().await;
                if let Some(data) = cache.peek(&block_idx) {
                    return Ok(data.clone());
                }
            }

            let notify = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(notify) = in_flight.get(&block_idx).cloned() {
                    // Register before releasing the lock; the fetching task
                    // notifies only after taking it.
                    let mut notified = pin!(notify.notified());
                    notified.as_mut().enable();
                    drop(in_flight);
                    notified.await;
                    continue;
                }

                let notify = Arc::new(Notify::new());
                in_flight.insert(block_idx, notify.clone());
                notify
            };

            let result = self.fetch_block(block_idx).await;

            {
                let mut cache = self.cache.write().await;
                let mut in_flight = self.in_flight.lock().await;

                if let Ok(ref data) = result {
                    cache.put(block_idx, data.clone());
                }
                in_flight.remove(&block_idx);
            }

            notify.notify_waiters();
            return result;
        }
    }

    /// Fetch a block directly from the wrapped reader.
    ///
    /// The last block of a file may be shorter than `block_size`.
    async fn fetch_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = remaining.min(self.block_size as u64) as usize;
        self.inner.read_exact_at(offset, len).await
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        if offset.checked_add(len as u64).map_or(true, |end| end > size) {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            let block_offset = self.offset_within_block(offset);
            return Ok(block.slice(block_offset..block_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut remaining = len;
        let mut current_offset = offset;

        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let block_offset = self.offset_within_block(current_offset);
            let take = (block.len() - block_offset).min(remaining);

            result.extend_from_slice(&block[block_offset..block_offset + take]);

            remaining -= take;
            current_offset += take as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
