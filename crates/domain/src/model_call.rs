use serde::{Deserialize, Serialize};

use judge_core::{JudgeError, JudgeResult};

/// 未配置真实密钥时使用的占位符，永远不会作为凭证发送
pub const PLACEHOLDER_API_KEY: &str = "sk-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

fn default_top_p() -> f64 {
    1.0
}

fn default_max_tokens() -> u32 {
    crate::evaluation::DEFAULT_MAX_TOKENS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// vLLM 风格的自建推理服务，不携带鉴权头
    Capacity,
    /// OpenAI 兼容接口
    OpenAiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCallRequest {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 单次请求超时（秒），0 表示使用默认值
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub is_vllm: bool,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl ModelCallRequest {
    pub fn validate(&self) -> JudgeResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(JudgeError::Validation("api_url is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(JudgeError::Validation("model is required".to_string()));
        }
        if self.messages.is_empty() {
            return Err(JudgeError::Validation(
                "messages must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backend_kind(&self) -> BackendKind {
        if self.is_vllm {
            BackendKind::Capacity
        } else {
            BackendKind::OpenAiCompatible
        }
    }

    /// 仅 OpenAI 兼容后端且密钥非空、不是占位符时才需要鉴权头
    pub fn bearer_key(&self) -> Option<&str> {
        if self.backend_kind() == BackendKind::Capacity {
            return None;
        }
        let key = self.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            None
        } else {
            Some(key)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCallResponse {
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelCallResponse {
    pub fn ok(content: String) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyStatus {
    #[serde(rename = "model")]
    pub model_name: String,
    pub current_concurrency: i64,
    pub max_concurrency: i64,
    pub available_slots: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConcurrencyStatus {
    pub fn new(model_name: impl Into<String>, current: i64, max: i64) -> Self {
        Self {
            model_name: model_name.into(),
            current_concurrency: current,
            max_concurrency: max,
            available_slots: (max - current).max(0),
            error: None,
        }
    }

    pub fn unavailable(model_name: impl Into<String>, max: i64, error: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            current_concurrency: 0,
            max_concurrency: max,
            available_slots: 0,
            error: Some(error.into()),
        }
    }
}
