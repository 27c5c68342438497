use std::time::Duration;

use inlet::pool::{BufferPool, ExhaustionPolicy, PoolConfig, PoolError};

#[test]
fn test_pool_sizing_from_config() {
    let pool = BufferPool::from_config(1024, &PoolConfig::default());
    assert_eq!(pool.buffer_size(), 1024);
    assert_eq!(pool.max_buffers(), 16);

    let config = PoolConfig {
        total_capacity: Some(4096),
        exhaustion: ExhaustionPolicy::Reject,
    };
    let pool = BufferPool::from_config(1024, &config);
    assert_eq!(pool.max_buffers(), 4);
}

#[test]
fn test_pool_allocates_overflow_when_exhausted() {
    let pool = BufferPool::new(64, 64, ExhaustionPolicy::Allocate);
    let pooled = pool.try_acquire().unwrap();
    let overflow = pool.try_acquire().unwrap();

    assert!(pooled.is_pooled());
    assert!(!overflow.is_pooled());
    assert_eq!(overflow.size_limit(), 64);

    drop(overflow);
    assert_eq!(pool.available(), 0);
    drop(pooled);
    assert_eq!(pool.available(), 1);
}

#[test]
fn test_pool_reject_policy() {
    let pool = BufferPool::new(64, 64, ExhaustionPolicy::Reject);
    let _held = pool.try_acquire().unwrap();
    assert!(matches!(pool.try_acquire(), Err(PoolError::Exhausted)));
}

#[tokio::test]
async fn test_pool_block_policy_waits_for_release() {
    let pool = BufferPool::new(64, 64, ExhaustionPolicy::Block);
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|b| b.is_pooled()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let pooled = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(pooled);
}
