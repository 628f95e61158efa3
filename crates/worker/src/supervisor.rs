use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use judge_core::config::{AuthConfig, SupervisorConfig};
use judge_core::{JudgeError, JudgeResult};
use judge_domain::entities::{Task, TaskInfoUpdate, TaskPatch, TaskStatus};
use judge_domain::evaluation::EvaluationConfig;
use judge_domain::ports::TokenIssuer;
use judge_domain::repositories::{ModelConfigRepository, TaskRepository};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, error, info, instrument, warn};

use crate::args::build_worker_args;
use crate::interpreter::resolve_interpreter;
use crate::progress::infer_progress;
use crate::registry::{ProcessHandle, ProcessRegistry};

/// 进程退出后等待输出读取完成的最长时间
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const MSG_STARTED: &str = "Evaluation started";
const MSG_COMPLETED: &str = "Evaluation completed successfully";
const MSG_CANCELLED: &str = "Task cancelled by user";
const MSG_SHUTDOWN: &str = "Task cancelled: service shutting down";
const MSG_NOT_RUNNING: &str = "task not found or not running";

/// 监管器运行参数
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub interpreters: Vec<String>,
    pub script: String,
    pub working_dir: Option<PathBuf>,
    pub database_service_url: String,
    /// 为评测进程签发凭证时使用的身份
    pub system_identity: String,
}

impl SupervisorSettings {
    pub fn from_config(supervisor: &SupervisorConfig, auth: &AuthConfig) -> Self {
        Self {
            interpreters: supervisor.interpreters.clone(),
            script: supervisor.script.clone(),
            working_dir: supervisor.working_dir.as_ref().map(PathBuf::from),
            database_service_url: supervisor.database_service_url.clone(),
            system_identity: auth.system_identity.clone(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default(), &AuthConfig::default())
    }
}

/// 评测任务监管器
///
/// 负责创建任务记录、启动评测进程、根据输出更新进度，以及取消运行中的任务。
pub struct EvaluationTaskSupervisor {
    repository: Arc<dyn TaskRepository>,
    model_configs: Arc<dyn ModelConfigRepository>,
    issuer: Arc<dyn TokenIssuer>,
    registry: Arc<ProcessRegistry>,
    settings: Arc<SupervisorSettings>,
}

impl EvaluationTaskSupervisor {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        model_configs: Arc<dyn ModelConfigRepository>,
        issuer: Arc<dyn TokenIssuer>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            repository,
            model_configs,
            issuer,
            registry: Arc::new(ProcessRegistry::new()),
            settings: Arc::new(settings),
        }
    }

    /// 按模型配置补全请求，创建 pending 任务并在后台启动评测进程，立即返回任务ID
    #[instrument(skip(self, config), fields(model = %config.model))]
    pub async fn start_evaluation(
        &self,
        user_id: i64,
        config: EvaluationConfig,
    ) -> JudgeResult<String> {
        config.validate_required()?;

        let model = self
            .model_configs
            .get_model_config_by_name(&config.model)
            .await?
            .ok_or_else(|| JudgeError::ModelNotFound(config.model.clone()))?;

        let config = config.apply_model_config(&model);
        config.validate()?;
        let config = config.with_defaults();

        let task_id = generate_task_id();
        let auth_token = self
            .issuer
            .issue(user_id, &self.settings.system_identity)?;

        self.repository
            .create_task(user_id, &task_id, &config.to_task_config()?)
            .await?;

        info!("创建评测任务: user_id={}, task_id={}", user_id, task_id);

        let unit = SupervisionUnit {
            user_id,
            task_id: task_id.clone(),
            config,
            auth_token,
            repository: Arc::clone(&self.repository),
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
        };
        tokio::spawn(unit.run());

        Ok(task_id)
    }

    /// 取消运行中的任务
    #[instrument(skip(self))]
    pub async fn cancel_task(&self, user_id: i64, task_id: &str) -> JudgeResult<()> {
        if self.repository.get_task(user_id, task_id).await?.is_none() {
            return Err(JudgeError::Cancellation(MSG_NOT_RUNNING.to_string()));
        }

        let Some(handle) = self.registry.remove(task_id).await else {
            return Err(JudgeError::Cancellation(MSG_NOT_RUNNING.to_string()));
        };

        handle.kill.cancel();
        self.repository
            .update_task(
                task_id,
                &TaskPatch::status(TaskStatus::Cancelled, 0.0, MSG_CANCELLED),
            )
            .await?;

        info!("任务已取消: task_id={}, pid={:?}", task_id, handle.pid);
        Ok(())
    }

    pub async fn get_task_status(&self, user_id: i64, task_id: &str) -> JudgeResult<Option<Task>> {
        self.repository.get_task(user_id, task_id).await
    }

    pub async fn get_all_tasks(&self, user_id: i64) -> JudgeResult<Vec<Task>> {
        self.repository.list_tasks(user_id).await
    }

    /// 创建后唯一允许的外部修改，返回任务是否存在
    pub async fn update_task_info(
        &self,
        task_id: &str,
        update: TaskInfoUpdate,
    ) -> JudgeResult<bool> {
        if update.is_empty() {
            return Err(JudgeError::Validation("no updatable fields provided".to_string()));
        }
        self.repository.update_task(task_id, &update.into_patch()).await
    }

    pub async fn running_task_ids(&self) -> Vec<String> {
        self.registry.task_ids().await
    }

    /// 结束全部运行中的评测进程并标记为 cancelled
    pub async fn shutdown(&self) {
        let handles = self.registry.drain().await;
        if handles.is_empty() {
            return;
        }

        info!("关闭监管器，终止 {} 个评测进程", handles.len());
        for (task_id, handle) in handles {
            handle.kill.cancel();
            let patch = TaskPatch::status(TaskStatus::Cancelled, 0.0, MSG_SHUTDOWN);
            if let Err(e) = self.repository.update_task(&task_id, &patch).await {
                error!("关闭时更新任务状态失败: task_id={}, error={}", task_id, e);
            }
        }
    }
}

/// `YYYYMMDD_HHMMSS_<8位十六进制>`
fn generate_task_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Killed,
}

/// 单个任务的后台监管单元
struct SupervisionUnit {
    user_id: i64,
    task_id: String,
    config: EvaluationConfig,
    auth_token: String,
    repository: Arc<dyn TaskRepository>,
    registry: Arc<ProcessRegistry>,
    settings: Arc<SupervisorSettings>,
}

impl SupervisionUnit {
    async fn run(self) {
        info!("启动评测任务: user_id={}, task_id={}", self.user_id, self.task_id);

        let interpreter = match resolve_interpreter(&self.settings.interpreters) {
            Ok(path) => path,
            Err(e) => {
                self.write(TaskPatch::status(TaskStatus::Failed, 0.0, e.to_string()))
                    .await;
                return;
            }
        };

        let args = build_worker_args(
            self.user_id,
            &self.task_id,
            &self.config,
            &self.settings.database_service_url,
            &self.auth_token,
        );

        let mut command = Command::new(&interpreter);
        command
            .arg(&self.settings.script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("启动评测进程失败: task_id={}, error={}", self.task_id, e);
                let message = format!("Failed to start evaluation: {e}");
                self.write(TaskPatch::status(TaskStatus::Failed, 0.0, message))
                    .await;
                return;
            }
        };

        let handle = ProcessHandle::new(child.id());
        let kill = handle.kill.clone();
        self.registry.register(&self.task_id, handle).await;
        self.write(TaskPatch::status(TaskStatus::Running, 0.0, MSG_STARTED))
            .await;

        let stdout_reader = child.stdout.take().map(|stdout| {
            tokio::spawn(read_stdout(
                stdout,
                self.task_id.clone(),
                Arc::clone(&self.repository),
                Arc::clone(&self.registry),
            ))
        });
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_stderr(stderr, self.task_id.clone())));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = kill.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("终止评测进程失败: task_id={}, error={}", self.task_id, e);
                }
                Outcome::Killed
            }
        };

        if let Some(reader) = stdout_reader {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                warn!("等待评测进程输出结束超时: task_id={}", self.task_id);
            }
        }
        if let Some(reader) = stderr_reader {
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await;
        }

        let status = match outcome {
            Outcome::Killed => {
                debug!("评测进程已被终止: task_id={}", self.task_id);
                return;
            }
            Outcome::Exited(status) => status,
        };

        if self.registry.remove(&self.task_id).await.is_none() {
            debug!("任务已被取消，忽略进程退出: task_id={}", self.task_id);
            return;
        }

        let failure = match status {
            Ok(status) if status.success() => {
                info!("评测任务完成: task_id={}", self.task_id);
                self.write(TaskPatch::status(TaskStatus::Completed, 100.0, MSG_COMPLETED))
                    .await;
                return;
            }
            Ok(status) => JudgeError::Exit(status.to_string()),
            Err(e) => JudgeError::Exit(e.to_string()),
        };

        error!("评测任务失败: task_id={}, {}", self.task_id, failure);
        let patch = TaskPatch::status(TaskStatus::Failed, 0.0, failure.to_string());
        self.write(patch).await;
    }

    async fn write(&self, patch: TaskPatch) {
        write_patch(self.repository.as_ref(), &self.task_id, &patch).await;
    }
}

async fn write_patch(repository: &dyn TaskRepository, task_id: &str, patch: &TaskPatch) {
    match repository.update_task(task_id, patch).await {
        Ok(true) => {}
        Ok(false) => warn!("更新任务失败，任务不存在: task_id={}", task_id),
        Err(e) => error!("更新任务失败: task_id={}, error={}", task_id, e),
    }
}

async fn read_stdout(
    stdout: ChildStdout,
    task_id: String,
    repository: Arc<dyn TaskRepository>,
    registry: Arc<ProcessRegistry>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(task_id = %task_id, "stdout: {}", line);
                let Some(update) = infer_progress(&line) else {
                    continue;
                };
                // 句柄被移除后不再写入进度
                if !registry.contains(&task_id).await {
                    continue;
                }
                let patch = TaskPatch::progress(update.progress, update.message);
                write_patch(repository.as_ref(), &task_id, &patch).await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("读取评测进程输出失败: task_id={}, error={}", task_id, e);
                break;
            }
        }
    }
}

async fn read_stderr(stderr: ChildStderr, task_id: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task_id = %task_id, "stderr: {}", line);
    }
}
