use async_trait::async_trait;
use chrono::{DateTime, Utc};
use judge_core::{JudgeError, JudgeResult};
use judge_domain::entities::ModelConfig;
use judge_domain::repositories::ModelConfigRepository;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::sqlite::db_error;

pub struct SqliteModelConfigRepository {
    pool: SqlitePool,
}

impl SqliteModelConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 运行数据库迁移
    pub async fn run_migrations(&self) -> JudgeResult<()> {
        debug!("Running model_configs migration");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_name TEXT NOT NULL UNIQUE,
                api_urls TEXT NOT NULL,
                api_key TEXT NOT NULL DEFAULT '',
                temperature REAL NOT NULL DEFAULT 0.0,
                top_p REAL NOT NULL DEFAULT 1.0,
                max_tokens INTEGER NOT NULL DEFAULT 0,
                timeout INTEGER NOT NULL DEFAULT 0,
                is_vllm INTEGER NOT NULL DEFAULT 1,
                description TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    fn row_to_config(row: &SqliteRow) -> JudgeResult<ModelConfig> {
        let api_urls: String = row.try_get("api_urls").map_err(db_error)?;
        let max_tokens: i64 = row.try_get("max_tokens").map_err(db_error)?;
        let timeout: i64 = row.try_get("timeout").map_err(db_error)?;

        Ok(ModelConfig {
            id: row.try_get("id").map_err(db_error)?,
            model_name: row.try_get("model_name").map_err(db_error)?,
            api_urls: serde_json::from_str(&api_urls)?,
            api_key: row.try_get("api_key").map_err(db_error)?,
            temperature: row.try_get("temperature").map_err(db_error)?,
            top_p: row.try_get("top_p").map_err(db_error)?,
            max_tokens: u32::try_from(max_tokens).unwrap_or(0),
            timeout: u64::try_from(timeout).unwrap_or(0),
            is_vllm: row.try_get("is_vllm").map_err(db_error)?,
            description: row.try_get("description").map_err(db_error)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_error)?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_error)?,
        })
    }
}

#[async_trait]
impl ModelConfigRepository for SqliteModelConfigRepository {
    async fn get_model_config_by_name(
        &self,
        model_name: &str,
    ) -> JudgeResult<Option<ModelConfig>> {
        let row = sqlx::query("SELECT * FROM model_configs WHERE model_name = ?")
            .bind(model_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_config).transpose()
    }

    #[instrument(skip(self, config), fields(model = %config.model_name))]
    async fn create_model_config(&self, config: &ModelConfig) -> JudgeResult<i64> {
        let now = Utc::now();
        let timeout = i64::try_from(config.timeout)
            .map_err(|_| JudgeError::Validation(format!("timeout too large: {}", config.timeout)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO model_configs (model_name, api_urls, api_key, temperature, top_p, max_tokens, timeout, is_vllm, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.model_name)
        .bind(serde_json::to_string(&config.api_urls)?)
        .bind(&config.api_key)
        .bind(config.temperature)
        .bind(config.top_p)
        .bind(i64::from(config.max_tokens))
        .bind(timeout)
        .bind(config.is_vllm)
        .bind(&config.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.last_insert_rowid())
    }
}
