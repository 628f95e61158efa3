use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 滑动窗口限流器
///
/// 每个 key 保存窗口内的请求时间戳，每次检查时清理过期记录，
/// 窗口内没有请求的 key 会被移除。被拒绝的请求不会计入窗口。
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_MAX_REQUESTS: usize = 10;

    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// 检查并记录一次请求，返回是否放行
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|t| now.saturating_duration_since(*t) < self.window);
            !timestamps.is_empty()
        });

        let in_window = requests.get(key).map_or(0, Vec::len);
        if in_window >= self.max_requests {
            debug!("限流拒绝: key={}, 窗口内请求数={}", key, in_window);
            return false;
        }

        requests.entry(key.to_string()).or_default().push(now);
        true
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW, Self::DEFAULT_MAX_REQUESTS)
    }
}
