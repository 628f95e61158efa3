use thiserror::Error;

/// 评测服务错误类型定义
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("等待模型并发槽位超时: {model} ({waited_seconds}秒)")]
    AdmissionTimeout { model: String, waited_seconds: u64 },

    #[error("计数服务不可用: {0}")]
    CounterServiceUnavailable(String),

    #[error("API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("请求模型服务失败: {0}")]
    Transport(String),

    #[error("启动评测进程失败: {0}")]
    Spawn(String),

    /// 评测进程非零退出或等待失败，文本直接写入任务记录
    #[error("Evaluation failed: {0}")]
    Exit(String),

    #[error("Model config not found for: {0}")]
    ModelNotFound(String),

    #[error("{0}")]
    Cancellation(String),

    #[error("操作已取消: 服务正在关闭")]
    Cancelled,

    #[error("任务存储错误: {0}")]
    Repository(String),

    #[error("凭证错误: {0}")]
    Credential(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for JudgeError {
    fn from(err: serde_json::Error) -> Self {
        JudgeError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type JudgeResult<T> = std::result::Result<T, JudgeError>;
