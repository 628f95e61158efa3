use async_trait::async_trait;
use judge_core::{JudgeError, JudgeResult};
use judge_domain::entities::{ModelConfig, Task, TaskPatch};
use judge_domain::repositories::{ModelConfigRepository, TaskRepository};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory task store for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
    next_id: AtomicI64,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create_task(
        &self,
        user_id: i64,
        task_id: &str,
        config: &serde_json::Value,
    ) -> JudgeResult<i64> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return Err(JudgeError::Repository(format!(
                "task already exists: {task_id}"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut task = Task::new(user_id, task_id.to_string(), config.clone());
        task.id = id;
        tasks.insert(task_id.to_string(), task);
        Ok(id)
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> JudgeResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(task) => {
                if !task.apply(patch) {
                    debug!(
                        "Ignoring patch for task {} in state {}",
                        task_id, task.status
                    );
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_task(&self, user_id: i64, task_id: &str) -> JudgeResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .get(task_id)
            .filter(|task| task.user_id == user_id)
            .cloned())
    }

    async fn list_tasks(&self, user_id: i64) -> JudgeResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(result)
    }
}

/// In-memory model config store, seeded from the service configuration
#[derive(Default)]
pub struct InMemoryModelConfigRepository {
    configs: RwLock<HashMap<String, ModelConfig>>,
    next_id: AtomicI64,
}

impl InMemoryModelConfigRepository {
    /// Later entries with a name already present are skipped
    pub fn with_configs(configs: impl IntoIterator<Item = ModelConfig>) -> Self {
        let mut by_name = HashMap::new();
        let mut next_id = 0;
        for mut config in configs {
            if by_name.contains_key(&config.model_name) {
                continue;
            }
            next_id += 1;
            config.id = next_id;
            by_name.insert(config.model_name.clone(), config);
        }

        Self {
            configs: RwLock::new(by_name),
            next_id: AtomicI64::new(next_id),
        }
    }
}

#[async_trait]
impl ModelConfigRepository for InMemoryModelConfigRepository {
    async fn get_model_config_by_name(
        &self,
        model_name: &str,
    ) -> JudgeResult<Option<ModelConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(model_name).cloned())
    }

    async fn create_model_config(&self, config: &ModelConfig) -> JudgeResult<i64> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.model_name) {
            return Err(JudgeError::Repository(format!(
                "model config already exists: {}",
                config.model_name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = config.clone();
        stored.id = id;
        configs.insert(stored.model_name.clone(), stored);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_domain::entities::TaskStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_scope_by_user() {
        let repo = InMemoryTaskRepository::new();
        repo.create_task(1, "t1", &json!({"model": "m"})).await.unwrap();
        repo.create_task(2, "t2", &json!({})).await.unwrap();

        assert!(repo.get_task(1, "t1").await.unwrap().is_some());
        assert!(repo.get_task(2, "t1").await.unwrap().is_none());
        assert!(repo.create_task(1, "t1", &json!({})).await.is_err());

        let listed = repo.list_tasks(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_terminal_patch_is_found_but_ignored() {
        let repo = InMemoryTaskRepository::new();
        repo.create_task(1, "t1", &json!({})).await.unwrap();

        let cancelled = TaskPatch::status(TaskStatus::Cancelled, 0.0, "Task cancelled by user");
        assert!(repo.update_task("t1", &cancelled).await.unwrap());

        let completed = TaskPatch::status(TaskStatus::Completed, 100.0, "done");
        assert!(repo.update_task("t1", &completed).await.unwrap());

        let task = repo.get_task(1, "t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.progress, 0.0);

        assert!(!repo.update_task("missing", &completed).await.unwrap());
    }

    #[tokio::test]
    async fn test_message_patch_after_terminal_state() {
        let repo = InMemoryTaskRepository::new();
        repo.create_task(1, "t1", &json!({})).await.unwrap();
        let running = TaskPatch::status(TaskStatus::Running, 0.0, "Evaluation started");
        let failed = TaskPatch::status(TaskStatus::Failed, 0.0, "Evaluation failed");
        repo.update_task("t1", &running).await.unwrap();
        repo.update_task("t1", &failed).await.unwrap();

        let note = TaskPatch {
            message: Some("bad dataset, rerun scheduled".to_string()),
            ..TaskPatch::default()
        };
        assert!(repo.update_task("t1", &note).await.unwrap());

        let task = repo.get_task(1, "t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.message, "bad dataset, rerun scheduled");
    }

    #[tokio::test]
    async fn test_model_configs_by_name() {
        let repo = InMemoryModelConfigRepository::with_configs([
            ModelConfig::new("qwen", vec!["http://a:8000".to_string()]),
            ModelConfig::new("qwen", vec!["http://ignored:8000".to_string()]),
        ]);

        let stored = repo.get_model_config_by_name("qwen").await.unwrap().unwrap();
        assert_eq!(stored.id, 1);
        assert_eq!(stored.api_urls, vec!["http://a:8000"]);
        assert!(repo.get_model_config_by_name("llama").await.unwrap().is_none());

        let id = repo
            .create_model_config(&ModelConfig::new("llama", vec!["http://b:8000".to_string()]))
            .await
            .unwrap();
        assert_eq!(id, 2);
        assert!(matches!(
            repo.create_model_config(&stored).await,
            Err(JudgeError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = InMemoryTaskRepository::new();
        for task_id in ["a", "b", "c"] {
            repo.create_task(1, task_id, &json!({})).await.unwrap();
        }
        let ids: Vec<String> = repo
            .list_tasks(1)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
