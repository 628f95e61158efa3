use serde::{Deserialize, Serialize};

use judge_core::{JudgeError, JudgeResult};

use crate::entities::ModelConfig;
use crate::model_call::PLACEHOLDER_API_KEY;

pub const DEFAULT_MAX_WORKERS: u32 = 4;
pub const DEFAULT_BADCASE_THRESHOLD: f64 = 1.0;
pub const DEFAULT_REPORT_FORMAT: &str = "json, txt, badcases";
pub const DEFAULT_SCORING_MODULE: &str = "./function_register/plugin.py";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;
pub const DEFAULT_MAX_TOKENS: u32 = 16384;
pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_TOP_P: f64 = 1.0;

/// 评测任务配置，对应启动评测请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    pub api_urls: Vec<String>,
    pub model: String,
    pub data_file: String,
    pub scoring: String,
    pub scoring_module: String,
    pub max_workers: u32,
    pub badcase_threshold: f64,
    pub report_format: String,
    pub test_mode: bool,
    pub sample_size: u32,
    pub checkpoint_path: String,
    pub checkpoint_interval: u32,
    pub resume: bool,
    pub role: String,
    pub timeout: u64,
    pub max_tokens: u32,
    pub api_key: String,
    pub is_vllm: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl EvaluationConfig {
    /// 查找模型配置之前即可检查的字段
    pub fn validate_required(&self) -> JudgeResult<()> {
        if self.model.trim().is_empty() {
            return Err(JudgeError::Validation("model is required".to_string()));
        }
        if self.data_file.trim().is_empty() {
            return Err(JudgeError::Validation("data_file is required".to_string()));
        }
        if self.scoring.trim().is_empty() {
            return Err(JudgeError::Validation("scoring is required".to_string()));
        }
        Ok(())
    }

    pub fn validate(&self) -> JudgeResult<()> {
        self.validate_required()?;
        if self.api_urls.iter().all(|url| url.trim().is_empty()) {
            return Err(JudgeError::Validation(
                "at least one api url is required".to_string(),
            ));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(JudgeError::Validation(format!(
                    "temperature out of range: {temperature}"
                )));
            }
        }
        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(JudgeError::Validation(format!("top_p out of range: {top_p}")));
            }
        }
        Ok(())
    }

    /// 用模型配置补全请求：地址、密钥、超时、生成参数只在请求未填写时采用，
    /// 后端类型始终以模型配置为准
    pub fn apply_model_config(mut self, model: &ModelConfig) -> Self {
        if self.api_urls.iter().all(|url| url.trim().is_empty()) {
            self.api_urls = model.api_urls.clone();
        }
        if (self.api_key.is_empty() || self.api_key == PLACEHOLDER_API_KEY)
            && !model.api_key.is_empty()
        {
            self.api_key = model.api_key.clone();
        }
        if matches!(self.timeout, 0 | DEFAULT_TIMEOUT_SECONDS) && model.timeout > 0 {
            self.timeout = model.timeout;
        }
        if matches!(self.max_tokens, 0 | DEFAULT_MAX_TOKENS) && model.max_tokens > 0 {
            self.max_tokens = model.max_tokens;
        }
        self.temperature.get_or_insert(model.temperature);
        self.top_p.get_or_insert(model.top_p);
        self.is_vllm = model.is_vllm;
        self
    }

    /// 为未填写的字段补充默认值
    pub fn with_defaults(mut self) -> Self {
        self.api_urls.retain(|url| !url.trim().is_empty());
        if self.max_workers == 0 {
            self.max_workers = DEFAULT_MAX_WORKERS;
        }
        if self.badcase_threshold == 0.0 {
            self.badcase_threshold = DEFAULT_BADCASE_THRESHOLD;
        }
        if self.report_format.is_empty() {
            self.report_format = DEFAULT_REPORT_FORMAT.to_string();
        }
        if self.scoring_module.is_empty() {
            self.scoring_module = DEFAULT_SCORING_MODULE.to_string();
        }
        if self.api_key.is_empty() {
            self.api_key = PLACEHOLDER_API_KEY.to_string();
        }
        if self.timeout == 0 {
            self.timeout = DEFAULT_TIMEOUT_SECONDS;
        }
        if self.max_tokens == 0 {
            self.max_tokens = DEFAULT_MAX_TOKENS;
        }
        self.temperature.get_or_insert(DEFAULT_TEMPERATURE);
        self.top_p.get_or_insert(DEFAULT_TOP_P);
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f64 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }

    /// 持久化到任务记录中的配置，额外保存 `data_filename`
    pub fn to_task_config(&self) -> JudgeResult<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "data_filename".to_string(),
                serde_json::Value::String(self.data_file.clone()),
            );
        }
        Ok(value)
    }
}
