//! Reusable fixed-size read buffers.
//!
//! Every connection checks one buffer out on accept and gives it back when it
//! closes. Release is tied to [`PooledBuffer`]'s `Drop`, so error and early
//! return paths hand the buffer back exactly once without extra bookkeeping.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// What `acquire` does once every pooled buffer is checked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Hand out a fresh buffer that is freed instead of pooled on release.
    #[default]
    Allocate,
    /// Fail the acquisition; the caller rejects the connection.
    Reject,
    /// Wait until another holder releases a buffer.
    Block,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Total bytes the pool may hold. Defaults to 16 buffers.
    pub total_capacity: Option<usize>,
    pub exhaustion: ExhaustionPolicy,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("buffer pool exhausted")]
    Exhausted,
    #[error("buffer pool closed")]
    Closed,
}

#[derive(Debug)]
struct PoolInner {
    buffer_size: usize,
    max_buffers: usize,
    policy: ExhaustionPolicy,
    free: Mutex<Vec<BytesMut>>,
    permits: Arc<Semaphore>,
}

impl PoolInner {
    fn take_free(&self) -> BytesMut {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    fn give_back(&self, mut bytes: BytesMut) {
        bytes.clear();
        bytes.reserve(self.buffer_size);
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_buffers {
            free.push(bytes);
        }
    }
}

/// Shared handle to a pool of `buffer_size` byte buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates a pool of `total_capacity / buffer_size` buffers (at least one).
    pub fn new(buffer_size: usize, total_capacity: usize, policy: ExhaustionPolicy) -> Self {
        let buffer_size = buffer_size.max(1);
        let max_buffers = (total_capacity / buffer_size).max(1);
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                max_buffers,
                policy,
                free: Mutex::new(Vec::with_capacity(max_buffers)),
                permits: Arc::new(Semaphore::new(max_buffers)),
            }),
        }
    }

    pub fn from_config(buffer_size: usize, config: &PoolConfig) -> Self {
        let total = config.total_capacity.unwrap_or(buffer_size.saturating_mul(16));
        Self::new(buffer_size, total, config.exhaustion)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of pooled buffers this pool hands out before its policy applies.
    pub fn max_buffers(&self) -> usize {
        self.inner.max_buffers
    }

    /// Pooled buffers currently not checked out.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    fn pooled(&self, permit: OwnedSemaphorePermit) -> PooledBuffer {
        PooledBuffer {
            bytes: self.inner.take_free(),
            permit: Some(permit),
            pool: self.inner.clone(),
        }
    }

    fn overflow(&self) -> PooledBuffer {
        PooledBuffer {
            bytes: BytesMut::with_capacity(self.inner.buffer_size),
            permit: None,
            pool: self.inner.clone(),
        }
    }

    /// Acquires without waiting. Under [`ExhaustionPolicy::Block`] an empty
    /// pool reports [`PoolError::Exhausted`].
    pub fn try_acquire(&self) -> Result<PooledBuffer, PoolError> {
        match self.inner.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(self.pooled(permit)),
            Err(TryAcquireError::Closed) => Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => match self.inner.policy {
                ExhaustionPolicy::Allocate => {
                    tracing::debug!(
                        buffer_size = self.inner.buffer_size,
                        "buffer pool exhausted, allocating overflow buffer"
                    );
                    Ok(self.overflow())
                }
                ExhaustionPolicy::Reject | ExhaustionPolicy::Block => Err(PoolError::Exhausted),
            },
        }
    }

    /// Acquires according to the pool's exhaustion policy.
    pub async fn acquire(&self) -> Result<PooledBuffer, PoolError> {
        if self.inner.policy != ExhaustionPolicy::Block {
            return self.try_acquire();
        }
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.pooled(permit))
    }
}

/// A buffer checked out of a [`BufferPool`]; returns itself on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    bytes: BytesMut,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// The fixed size this buffer may fill up to.
    pub fn size_limit(&self) -> usize {
        self.pool.buffer_size
    }

    /// Whether this buffer goes back to the pool (false for overflow buffers).
    pub fn is_pooled(&self) -> bool {
        self.permit.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.bytes
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.bytes
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.pool.give_back(std::mem::take(&mut self.bytes));
            drop(permit);
        }
    }
}
