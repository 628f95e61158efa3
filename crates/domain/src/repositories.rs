//! 领域仓储抽象
//!
//! 定义任务与模型配置数据访问的抽象接口，具体实现位于 infrastructure

use async_trait::async_trait;

use crate::entities::{ModelConfig, Task, TaskPatch};
use judge_core::JudgeResult;

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建 `pending` 状态的任务记录，返回记录主键
    async fn create_task(
        &self,
        user_id: i64,
        task_id: &str,
        config: &serde_json::Value,
    ) -> JudgeResult<i64>;

    /// 按任务ID应用补丁，任务不存在时返回 false。
    /// 补丁不适用于当前状态（例如终态任务的状态或进度写入）时返回 true 但记录保持不变
    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> JudgeResult<bool>;

    async fn get_task(&self, user_id: i64, task_id: &str) -> JudgeResult<Option<Task>>;

    /// 按创建时间倒序返回用户的全部任务
    async fn list_tasks(&self, user_id: i64) -> JudgeResult<Vec<Task>>;
}

/// 模型配置仓储抽象
#[async_trait]
pub trait ModelConfigRepository: Send + Sync {
    async fn get_model_config_by_name(&self, model_name: &str)
        -> JudgeResult<Option<ModelConfig>>;

    /// 写入新模型配置，返回记录主键；同名模型已存在时返回 `Repository` 错误
    async fn create_model_config(&self, config: &ModelConfig) -> JudgeResult<i64>;
}
