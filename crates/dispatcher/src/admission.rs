use std::sync::Arc;
use std::time::Duration;

use judge_core::{JudgeError, JudgeResult};
use judge_domain::ports::ConcurrencySlotManager;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 槽位等待策略
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// 两次尝试之间的等待时间
    pub retry_interval: Duration,
    /// 最长等待时间，超过后返回 `AdmissionTimeout`
    pub max_wait: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// 准入结果
pub enum Admission {
    Granted(SlotGuard),
    /// 计数服务不可用，降级为不限流的直接调用
    Degraded,
}

impl AdmissionPolicy {
    /// 循环尝试占用槽位，等待期间可被关闭信号打断
    pub async fn admit(
        &self,
        slots: &Arc<dyn ConcurrencySlotManager>,
        key: &str,
        max: i64,
        shutdown: &CancellationToken,
    ) -> JudgeResult<Admission> {
        let started = Instant::now();

        loop {
            match slots.acquire_slot(key, max).await {
                Ok(true) => {
                    debug!("获取并发槽位成功: {}", key);
                    return Ok(Admission::Granted(SlotGuard::new(Arc::clone(slots), key)));
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("计数服务不可用，直接调用模型: key={}, error={}", key, e);
                    return Ok(Admission::Degraded);
                }
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(JudgeError::AdmissionTimeout {
                    model: key.to_string(),
                    waited_seconds: waited.as_secs(),
                });
            }

            debug!("并发槽位已满，等待重试: key={}, 已等待{:?}", key, waited);
            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = shutdown.cancelled() => {
                    return Err(JudgeError::Cancelled);
                }
            }
        }
    }
}

/// 持有一个并发槽位，离开作用域时归还
pub struct SlotGuard {
    slots: Arc<dyn ConcurrencySlotManager>,
    key: String,
    released: bool,
}

impl SlotGuard {
    pub fn new(slots: Arc<dyn ConcurrencySlotManager>, key: &str) -> Self {
        Self {
            slots,
            key: key.to_string(),
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 正常路径上显式归还槽位
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.slots.release_slot(&self.key).await {
            warn!("归还并发槽位失败: key={}, error={}", self.key, e);
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let slots = Arc::clone(&self.slots);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = slots.release_slot(&key).await {
                        warn!("归还并发槽位失败: key={}, error={}", key, e);
                    }
                });
            }
            Err(_) => {
                warn!("运行时已关闭，槽位将依赖过期时间回收: key={}", key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_infrastructure::InMemorySlotManager;

    fn slots() -> Arc<dyn ConcurrencySlotManager> {
        Arc::new(InMemorySlotManager::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_times_out_when_full() {
        let slots = slots();
        assert!(slots.acquire_slot("k", 1).await.unwrap());

        let policy = AdmissionPolicy::default();
        let token = CancellationToken::new();
        let started = Instant::now();

        let result = policy.admit(&slots, "k", 1, &token).await;
        assert!(matches!(result, Err(JudgeError::AdmissionTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(started.elapsed() < Duration::from_secs(303));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_succeeds_after_release() {
        let slots = slots();
        assert!(slots.acquire_slot("k", 1).await.unwrap());

        let releaser = Arc::clone(&slots);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            releaser.release_slot("k").await.unwrap();
        });

        let policy = AdmissionPolicy::default();
        let admission = policy
            .admit(&slots, "k", 1, &CancellationToken::new())
            .await
            .unwrap();

        match admission {
            Admission::Granted(guard) => {
                assert_eq!(guard.key(), "k");
                guard.release().await;
            }
            Admission::Degraded => panic!("expected a granted slot"),
        }
        assert_eq!(slots.current_concurrency("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_wait() {
        let slots = slots();
        assert!(slots.acquire_slot("k", 1).await.unwrap());

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let result = AdmissionPolicy::default().admit(&slots, "k", 1, &token).await;
        assert!(matches!(result, Err(JudgeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_slot() {
        let slots = slots();
        assert!(slots.acquire_slot("k", 1).await.unwrap());

        drop(SlotGuard::new(Arc::clone(&slots), "k"));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(slots.current_concurrency("k").await.unwrap(), 0);
    }
}
