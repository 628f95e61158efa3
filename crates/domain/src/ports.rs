use async_trait::async_trait;

use judge_core::JudgeResult;

/// 并发槽位计数的 key 前缀
pub const SLOT_KEY_PREFIX: &str = "model_concurrency:";

pub fn slot_key(model: &str) -> String {
    format!("{SLOT_KEY_PREFIX}{model}")
}

/// 跨实例的模型并发槽位管理
///
/// 计数服务不可达时返回 `CounterServiceUnavailable`，而不是 `false`。
#[async_trait]
pub trait ConcurrencySlotManager: Send + Sync {
    /// 原子地检查并占用一个槽位，已满时返回 false 且不修改状态
    async fn acquire_slot(&self, key: &str, max: i64) -> JudgeResult<bool>;

    /// 归还槽位，计数降到 0 及以下时删除 key
    async fn release_slot(&self, key: &str) -> JudgeResult<()>;

    /// 当前占用数，key 不存在时为 0
    async fn current_concurrency(&self, key: &str) -> JudgeResult<i64>;
}

/// 凭证中携带的身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

/// 评测进程回调和 API 调用方使用的凭证签发与校验
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: i64, username: &str) -> JudgeResult<String>;

    fn verify(&self, token: &str) -> JudgeResult<Identity>;
}
