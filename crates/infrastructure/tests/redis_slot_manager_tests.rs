//! Redis slot manager against a real Redis. Needs Docker:
//! `cargo test -p judge-infrastructure -- --ignored`

use std::sync::Arc;

use anyhow::Result;
use judge_domain::ports::{slot_key, ConcurrencySlotManager};
use judge_infrastructure::RedisSlotManager;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

async fn start_redis() -> Result<(ContainerAsync<Redis>, String)> {
    let container = Redis::default().with_tag("7-alpine").start().await?;
    let port = container.get_host_port_ipv4(6379).await?;
    Ok((container, format!("redis://127.0.0.1:{port}/0")))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_exactly_k_admissions_across_concurrent_callers() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let manager = Arc::new(RedisSlotManager::new(&url, 3600)?);
    let key = slot_key("contended-model");

    let mut handles = Vec::new();
    for _ in 0..40 {
        let manager = Arc::clone(&manager);
        let key = key.clone();
        handles.push(tokio::spawn(async move { manager.acquire_slot(&key, 5).await }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await?? {
            granted += 1;
        }
    }

    assert_eq!(granted, 5);
    assert_eq!(manager.current_concurrency(&key).await?, 5);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_over_release_deletes_key_and_stays_non_negative() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let manager = RedisSlotManager::new(&url, 3600)?;
    let key = slot_key("release-model");

    assert!(manager.acquire_slot(&key, 2).await?);
    manager.release_slot(&key).await?;
    manager.release_slot(&key).await?;
    manager.release_slot(&key).await?;

    assert_eq!(manager.current_concurrency(&key).await?, 0);

    let client = redis::Client::open(url.as_str())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let exists: bool = redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await?;
    assert!(!exists);

    assert!(manager.acquire_slot(&key, 2).await?);
    assert!(manager.acquire_slot(&key, 2).await?);
    assert!(!manager.acquire_slot(&key, 2).await?);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_acquire_sets_safety_expiry() -> Result<()> {
    let (_container, url) = start_redis().await?;
    let manager = RedisSlotManager::new(&url, 3600)?;
    let key = slot_key("ttl-model");

    assert!(manager.acquire_slot(&key, 1).await?);

    let client = redis::Client::open(url.as_str())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;
    assert!(ttl > 3500 && ttl <= 3600);
    assert!(manager.ping().await);
    Ok(())
}
