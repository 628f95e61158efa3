use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use judge_core::config::ModelSeedConfig;
use judge_core::JudgeError;

/// 评测任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub task_id: String,
    pub user_id: i64,
    pub status: TaskStatus,
    pub progress: f64,
    pub message: String,
    /// 创建时写入，之后不再修改
    pub config: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: i64, task_id: String, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由仓储生成
            task_id,
            user_id,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: String::new(),
            config,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 应用补丁，非法状态转换或终态后的进度写入返回 false 且不做任何修改
    pub fn apply(&mut self, patch: &TaskPatch) -> bool {
        if !patch.applies_to(self.status) {
            return false;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(message) = &patch.message {
            self.message = message.clone();
        }
        if let Some(result) = &patch.result {
            if self.result.is_none() {
                self.result = Some(result.clone());
            }
        }
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const TERMINAL: [TaskStatus; 3] = [
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// 状态只能单调前进，终态不可离开
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match self {
            Pending => matches!(next, Pending | Running | Failed | Cancelled),
            Running => matches!(next, Running | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(JudgeError::Serialization(format!("无效的任务状态: {s}"))),
        }
    }
}

/// 监管器内部使用的任务补丁
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
            message: Some(message.into()),
            result: None,
        }
    }

    pub fn progress(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// 只修改 message 的补丁
    pub fn is_message_only(&self) -> bool {
        self.status.is_none() && self.progress.is_none() && self.result.is_none()
    }

    /// 终态任务只接受 message 补丁
    pub fn applies_to(&self, current: TaskStatus) -> bool {
        if current.is_terminal() {
            return self.is_message_only();
        }
        match self.status {
            Some(next) => current.can_transition_to(next),
            None => true,
        }
    }
}

/// 模型配置记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub id: i64,
    pub model_name: String,
    pub api_urls: Vec<String>,
    pub api_key: String,
    pub temperature: f64,
    pub top_p: f64,
    /// 0 表示使用服务默认值
    pub max_tokens: u32,
    /// 0 表示使用服务默认值
    pub timeout: u64,
    pub is_vllm: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelConfig {
    pub fn new(model_name: impl Into<String>, api_urls: Vec<String>) -> Self {
        ModelSeedConfig {
            model_name: model_name.into(),
            api_urls,
            ..ModelSeedConfig::default()
        }
        .into()
    }
}

impl From<ModelSeedConfig> for ModelConfig {
    fn from(seed: ModelSeedConfig) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由仓储生成
            model_name: seed.model_name,
            api_urls: seed.api_urls,
            api_key: seed.api_key,
            temperature: seed.temperature,
            top_p: seed.top_p,
            max_tokens: seed.max_tokens,
            timeout: seed.timeout,
            is_vllm: seed.is_vllm,
            description: seed.description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 对外开放的任务信息更新，创建后仅允许修改 message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskInfoUpdate {
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskInfoUpdate {
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    pub fn into_patch(self) -> TaskPatch {
        TaskPatch {
            message: self.message,
            ..TaskPatch::default()
        }
    }
}
