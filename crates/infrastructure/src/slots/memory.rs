use async_trait::async_trait;
use judge_core::JudgeResult;
use judge_domain::ports::ConcurrencySlotManager;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-process slot counter for single-instance deployments and tests.
/// Key expiry is not modelled.
#[derive(Default)]
pub struct InMemorySlotManager {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemorySlotManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConcurrencySlotManager for InMemorySlotManager {
    async fn acquire_slot(&self, key: &str, max: i64) -> JudgeResult<bool> {
        let mut counters = self.counters.lock().await;
        let current = counters.get(key).copied().unwrap_or(0);
        if current < max {
            counters.insert(key.to_string(), current + 1);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_slot(&self, key: &str) -> JudgeResult<()> {
        let mut counters = self.counters.lock().await;
        let remaining = counters.get(key).copied().unwrap_or(0) - 1;
        if remaining <= 0 {
            counters.remove(key);
        } else {
            counters.insert(key.to_string(), remaining);
        }
        Ok(())
    }

    async fn current_concurrency(&self, key: &str) -> JudgeResult<i64> {
        Ok(self.counters.lock().await.get(key).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_exactly_max_acquisitions_succeed_under_contention() {
        let manager = Arc::new(InMemorySlotManager::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.acquire_slot("model_concurrency:m", 7).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 7);
        assert_eq!(manager.current_concurrency("model_concurrency:m").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_release_never_goes_negative() {
        let manager = InMemorySlotManager::new();
        let key = "model_concurrency:m";

        assert!(manager.acquire_slot(key, 1).await.unwrap());
        assert!(!manager.acquire_slot(key, 1).await.unwrap());

        manager.release_slot(key).await.unwrap();
        manager.release_slot(key).await.unwrap();
        manager.release_slot(key).await.unwrap();
        assert_eq!(manager.current_concurrency(key).await.unwrap(), 0);

        assert!(manager.acquire_slot(key, 1).await.unwrap());
        assert_eq!(manager.current_concurrency(key).await.unwrap(), 1);
    }
}
