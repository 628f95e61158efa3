use async_trait::async_trait;
use chrono::{DateTime, Utc};
use judge_core::{JudgeError, JudgeResult};
use judge_domain::entities::{Task, TaskPatch, TaskStatus};
use judge_domain::repositories::TaskRepository;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

/// 并发写入冲突时的最大重试次数
const MAX_UPDATE_ATTEMPTS: usize = 3;

pub(super) fn db_error(err: sqlx::Error) -> JudgeError {
    JudgeError::Repository(err.to_string())
}

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 与模型配置仓储共享连接池
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 连接SQLite数据库并执行迁移
    pub async fn connect(database_url: &str, max_connections: u32) -> JudgeResult<Self> {
        debug!("Creating SQLite task repository at: {}", database_url);

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_error)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(db_error)?;

        let repository = Self::new(pool);
        repository.run_migrations().await?;
        Ok(repository)
    }

    /// 运行数据库迁移
    pub async fn run_migrations(&self) -> JudgeResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                task_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                progress REAL NOT NULL DEFAULT 0,
                message TEXT NOT NULL DEFAULT '',
                config TEXT NOT NULL DEFAULT '{}',
                result TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_user_tasks_user_id ON user_tasks(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_user_tasks_status ON user_tasks(status)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> JudgeResult<Task> {
        let status: String = row.try_get("status").map_err(db_error)?;
        let config: String = row.try_get("config").map_err(db_error)?;
        let result: Option<String> = row.try_get("result").map_err(db_error)?;

        Ok(Task {
            id: row.try_get("id").map_err(db_error)?,
            task_id: row.try_get("task_id").map_err(db_error)?,
            user_id: row.try_get("user_id").map_err(db_error)?,
            status: TaskStatus::from_str(&status)?,
            progress: row.try_get("progress").map_err(db_error)?,
            message: row.try_get("message").map_err(db_error)?,
            config: serde_json::from_str(&config)?,
            result: result.as_deref().map(|s| serde_json::from_str(s)).transpose()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_error)?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_error)?,
        })
    }

    async fn find_by_task_id(&self, task_id: &str) -> JudgeResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM user_tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, config))]
    async fn create_task(
        &self,
        user_id: i64,
        task_id: &str,
        config: &serde_json::Value,
    ) -> JudgeResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO user_tasks (user_id, task_id, status, progress, message, config, created_at, updated_at)
            VALUES (?, ?, ?, 0, '', ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .bind(serde_json::to_string(config)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self, patch))]
    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> JudgeResult<bool> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(mut task) = self.find_by_task_id(task_id).await? else {
                return Ok(false);
            };

            let previous = task.status;
            if !task.apply(patch) {
                debug!("Ignoring patch for task {} in state {}", task_id, previous);
                return Ok(true);
            }

            let result_json = task.result.as_ref().map(serde_json::to_string).transpose()?;

            // 仅在状态未被并发修改时写入
            let updated = sqlx::query(
                r#"
                UPDATE user_tasks
                SET status = ?, progress = ?, message = ?, result = ?, updated_at = ?
                WHERE task_id = ? AND status = ?
                "#,
            )
            .bind(task.status.as_str())
            .bind(task.progress)
            .bind(&task.message)
            .bind(result_json)
            .bind(task.updated_at)
            .bind(task_id)
            .bind(previous.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            if updated.rows_affected() > 0 {
                return Ok(true);
            }
            warn!("Task {} changed concurrently, retrying update", task_id);
        }

        Err(JudgeError::Repository(format!(
            "concurrent update conflict on task {task_id}"
        )))
    }

    async fn get_task(&self, user_id: i64, task_id: &str) -> JudgeResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM user_tasks WHERE user_id = ? AND task_id = ?")
            .bind(user_id)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list_tasks(&self, user_id: i64) -> JudgeResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM user_tasks WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(Self::row_to_task).collect()
    }
}
