use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{JudgeError, JudgeResult};

fn invalid(message: impl Into<String>) -> JudgeError {
    JudgeError::Configuration(message.into())
}

fn require_not_empty(value: &str, field: &str) -> JudgeResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_positive(value: u64, field: &str) -> JudgeResult<()> {
    if value == 0 {
        return Err(invalid(format!("{field} must be greater than 0")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub dispatcher: DispatcherConfig,
    pub supervisor: SupervisorConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// 启动时写入模型配置存储的模型，已存在的同名模型保持不变
    pub models: Vec<ModelSeedConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        self.server.validate()?;
        self.redis.validate()?;
        self.dispatcher.validate()?;
        self.supervisor.validate()?;
        self.auth.validate()?;
        self.rate_limit.validate()?;
        self.database.validate()?;
        self.logging.validate()?;

        let mut names = std::collections::HashSet::new();
        for model in &self.models {
            model.validate()?;
            if !names.insert(model.model_name.as_str()) {
                return Err(invalid(format!(
                    "models.model_name is duplicated: {}",
                    model.model_name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            shutdown_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        require_not_empty(&self.bind_address, "server.bind_address")?;
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid(format!(
                "server.bind_address is not a socket address: {}",
                self.bind_address
            )));
        }
        require_positive(self.shutdown_timeout_seconds, "server.shutdown_timeout_seconds")
    }
}

/// 共享计数服务（Redis）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 关闭时使用进程内计数器，仅适用于单实例部署
    pub enabled: bool,
    pub url: String,
    pub key_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_ttl_seconds: 3600,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        if self.enabled {
            require_not_empty(&self.url, "redis.url")?;
            if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
                return Err(invalid("redis.url must start with redis:// or rediss://"));
            }
        }
        require_positive(self.key_ttl_seconds, "redis.key_ttl_seconds")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub default_max_concurrency: i64,
    pub model_max_concurrency: HashMap<String, i64>,
    pub retry_interval_ms: u64,
    pub max_wait_seconds: u64,
    pub default_timeout_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_max_concurrency: 10,
            model_max_concurrency: HashMap::new(),
            retry_interval_ms: 2000,
            max_wait_seconds: 300,
            default_timeout_seconds: 600,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        if self.default_max_concurrency <= 0 {
            return Err(invalid(
                "dispatcher.default_max_concurrency must be greater than 0",
            ));
        }
        for (model, max) in &self.model_max_concurrency {
            if *max <= 0 {
                return Err(invalid(format!(
                    "dispatcher.model_max_concurrency.{model} must be greater than 0"
                )));
            }
        }
        require_positive(self.retry_interval_ms, "dispatcher.retry_interval_ms")?;
        require_positive(self.max_wait_seconds, "dispatcher.max_wait_seconds")?;
        require_positive(
            self.default_timeout_seconds,
            "dispatcher.default_timeout_seconds",
        )
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

/// 评测进程监管配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// 按顺序在 PATH 中查找的解释器
    pub interpreters: Vec<String>,
    pub script: String,
    pub working_dir: Option<String>,
    /// 传给评测进程的 `--database_service_url`
    pub database_service_url: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interpreters: vec!["python3".to_string(), "python".to_string()],
            script: "main.py".to_string(),
            working_dir: None,
            database_service_url: "http://localhost:16384".to_string(),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        if self.interpreters.iter().all(|i| i.trim().is_empty()) {
            return Err(invalid("supervisor.interpreters must name at least one interpreter"));
        }
        require_not_empty(&self.script, "supervisor.script")?;
        require_not_empty(&self.database_service_url, "supervisor.database_service_url")
    }
}

/// 内置的示例签名密钥，部署时必须替换
pub const DEFAULT_JWT_SECRET: &str = "change-this-secret-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    /// 为评测进程签发凭证时使用的身份
    pub system_identity: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_expiration_hours: 24,
            system_identity: "system_evaluation".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        require_not_empty(&self.jwt_secret, "auth.jwt_secret")?;
        if self.token_expiration_hours <= 0 {
            return Err(invalid("auth.token_expiration_hours must be greater than 0"));
        }
        require_not_empty(&self.system_identity, "auth.system_identity")
    }

    /// 启用认证但仍在使用内置密钥，任何人都可以签发有效凭证
    pub fn uses_default_secret(&self) -> bool {
        self.enabled && self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_seconds: u64,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 300,
            max_requests: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        require_positive(self.window_seconds, "rate_limit.window_seconds")?;
        require_positive(self.max_requests as u64, "rate_limit.max_requests")
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://...` 或 `memory://`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://judge.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        require_not_empty(&self.url, "database.url")?;
        if !self.is_in_memory() && !self.url.starts_with("sqlite:") {
            return Err(invalid("database.url must start with sqlite: or be memory://"));
        }
        require_positive(self.max_connections as u64, "database.max_connections")
    }

    pub fn is_in_memory(&self) -> bool {
        self.url == "memory://"
    }
}

/// 模型配置
///
/// 启动评测时按模型名查找，用来补全请求中缺省的地址、密钥和生成参数。
/// `timeout`、`max_tokens` 为 0 表示使用服务默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSeedConfig {
    pub model_name: String,
    pub api_urls: Vec<String>,
    pub api_key: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub timeout: u64,
    pub is_vllm: bool,
    pub description: String,
}

impl Default for ModelSeedConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            api_urls: Vec::new(),
            api_key: String::new(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 0,
            timeout: 0,
            is_vllm: true,
            description: String::new(),
        }
    }
}

impl ModelSeedConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        require_not_empty(&self.model_name, "models.model_name")?;
        if self.api_urls.iter().all(|url| url.trim().is_empty()) {
            return Err(invalid(format!(
                "models.{}.api_urls must name at least one url",
                self.model_name
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(format!(
                "models.{}.temperature out of range",
                self.model_name
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid(format!("models.{}.top_p out of range", self.model_name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> JudgeResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(invalid(format!("logging.level is invalid: {}", self.level)));
        }
        if self.format != "json" && self.format != "pretty" {
            return Err(invalid(format!("logging.format is invalid: {}", self.format)));
        }
        Ok(())
    }
}
