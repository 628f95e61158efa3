use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 持有进程级的取消令牌：HTTP 服务、等待并发槽位的调用和评测监管器都从这里订阅关闭信号。
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    is_shutdown: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 订阅关闭信号；关闭后订阅的令牌立即处于取消状态
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        info!("触发系统关闭");
        self.token.cancel();
        info!("关闭信号已发送");
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_shutdown_manager_basic() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());

        let token = manager.subscribe();
        manager.shutdown();

        let result = timeout(Duration::from_millis(100), token.cancelled()).await;
        assert!(result.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = ShutdownManager::new();
        let tokens: Vec<_> = (0..3).map(|_| manager.subscribe()).collect();

        manager.shutdown();

        for token in tokens {
            assert!(token.is_cancelled());
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let token = manager.subscribe();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let manager = ShutdownManager::new();

        let waiter = manager.clone();
        let wait_handle = tokio::spawn(async move {
            waiter.wait_for_shutdown().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.shutdown();

        let result = timeout(Duration::from_millis(100), wait_handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancelling_subscriber_does_not_shut_down() {
        let manager = ShutdownManager::new();
        let token = manager.subscribe();
        token.cancel();

        assert!(!manager.is_shutdown());
        assert!(!manager.subscribe().is_cancelled());
    }
}
