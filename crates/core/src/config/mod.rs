//! 配置管理
//!
//! 配置按以下顺序叠加：
//!
//! - 结构体默认值（`#[serde(default)]`）
//! - TOML 配置文件（`--config` 指定，或默认的 `config/judge.toml`）
//! - 以 `JUDGE` 为前缀、`__` 为层级分隔符的环境变量，例如 `JUDGE__REDIS__URL`
//!
//! 加载完成后统一调用 [`AppConfig::validate`]。

mod models;

pub use models::{
    AppConfig, AuthConfig, DatabaseConfig, DispatcherConfig, LoggingConfig, ModelSeedConfig,
    RateLimitConfig, RedisConfig, ServerConfig, SupervisorConfig,
};

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;

/// 未指定配置文件时使用的默认路径
pub const DEFAULT_CONFIG_PATH: &str = "config/judge.toml";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "JUDGE";

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(anyhow::anyhow!("配置文件不存在: {}", path));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                builder = builder.add_source(
                    File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false),
                );
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("supervisor.interpreters")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}
