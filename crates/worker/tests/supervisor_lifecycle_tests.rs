#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use judge_core::{JudgeError, JudgeResult};
use judge_domain::entities::{ModelConfig, Task, TaskInfoUpdate, TaskPatch, TaskStatus};
use judge_domain::evaluation::EvaluationConfig;
use judge_domain::ports::TokenIssuer;
use judge_domain::repositories::{ModelConfigRepository, TaskRepository};
use judge_infrastructure::{InMemoryModelConfigRepository, InMemoryTaskRepository, JwtTokenIssuer};
use judge_worker::{EvaluationTaskSupervisor, SupervisorSettings};
use mockall::mock;
use tempfile::TempDir;

const USER_ID: i64 = 11;

mock! {
    Repo {}

    #[async_trait]
    impl TaskRepository for Repo {
        async fn create_task(&self, user_id: i64, task_id: &str, config: &serde_json::Value) -> JudgeResult<i64>;
        async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> JudgeResult<bool>;
        async fn get_task(&self, user_id: i64, task_id: &str) -> JudgeResult<Option<Task>>;
        async fn list_tasks(&self, user_id: i64) -> JudgeResult<Vec<Task>>;
    }
}

struct Harness {
    dir: TempDir,
    repository: Arc<InMemoryTaskRepository>,
    issuer: Arc<JwtTokenIssuer>,
    supervisor: EvaluationTaskSupervisor,
}

/// 用 sh 运行一个临时脚本代替 Python 评测进程
fn harness(script_body: &str) -> Harness {
    harness_with_interpreters(script_body, vec!["sh".to_string()])
}

fn harness_with_interpreters(script_body: &str, interpreters: Vec<String>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.sh");
    std::fs::write(&script, script_body).unwrap();

    let repository = Arc::new(InMemoryTaskRepository::new());
    let issuer = Arc::new(JwtTokenIssuer::new("test-secret", 1));
    let settings = SupervisorSettings {
        interpreters,
        script: script.display().to_string(),
        working_dir: Some(dir.path().to_path_buf()),
        database_service_url: "http://localhost:16384".to_string(),
        system_identity: "system_evaluation".to_string(),
    };

    let supervisor = EvaluationTaskSupervisor::new(
        Arc::clone(&repository) as Arc<dyn TaskRepository>,
        model_configs(),
        Arc::clone(&issuer) as Arc<dyn TokenIssuer>,
        settings,
    );

    Harness {
        dir,
        repository,
        issuer,
        supervisor,
    }
}

fn stored_qwen() -> ModelConfig {
    let mut model = ModelConfig::new("qwen", vec!["http://stored:8000".to_string()]);
    model.api_key = "sk-stored".to_string();
    model.timeout = 120;
    model.is_vllm = false;
    model
}

fn model_configs() -> Arc<dyn ModelConfigRepository> {
    Arc::new(InMemoryModelConfigRepository::with_configs([stored_qwen()]))
}

fn config() -> EvaluationConfig {
    EvaluationConfig {
        api_urls: vec!["http://model:8000".to_string()],
        model: "qwen".to_string(),
        data_file: "17".to_string(),
        scoring: "exact_match".to_string(),
        ..EvaluationConfig::default()
    }
}

async fn wait_for<F>(repository: &InMemoryTaskRepository, task_id: &str, predicate: F) -> Task
where
    F: Fn(&Task) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = repository.get_task(USER_ID, task_id).await.unwrap() {
            if predicate(&task) {
                return task;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for task {task_id}, last state: {task:?}");
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_successful_run_completes_with_full_progress() {
    let h = harness(
        "echo '加载完成，共 3 条'\n\
         echo '@@progress {\"stage\":\"scoring\"}'\n\
         echo 'some diagnostic output'\n\
         exit 0\n",
    );

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();

    let task = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    assert_eq!(task.message, "Evaluation completed successfully");
    assert_eq!(task.config["data_filename"], "17");
    assert!(h.supervisor.running_task_ids().await.is_empty());
}

#[tokio::test]
async fn test_progress_markers_update_running_task() {
    let h = harness(
        "echo '加载完成，共 3 条'\n\
         sleep 1\n\
         echo '评分处理: 1/3'\n\
         sleep 1\n",
    );

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();

    let task = wait_for(&h.repository, &task_id, |t| t.progress == 10.0).await;
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.message, "Data loaded");
    assert_eq!(h.supervisor.running_task_ids().await, vec![task_id.clone()]);

    let task = wait_for(&h.repository, &task_id, |t| t.progress == 70.0).await;
    assert_eq!(task.message, "Scoring");

    let task = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_non_zero_exit_fails_with_message() {
    let h = harness("echo 'boom' >&2\nexit 3\n");

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();

    let task = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.starts_with("Evaluation failed"));
    assert!(task.message.contains('3'));
    assert!(h.supervisor.running_task_ids().await.is_empty());
}

#[tokio::test]
async fn test_cancel_kills_worker_and_is_final() {
    let h = harness("echo '加载完成，共 3 条'\nsleep 30\n");

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();
    wait_for(&h.repository, &task_id, |t| t.progress == 10.0).await;

    h.supervisor.cancel_task(USER_ID, &task_id).await.unwrap();

    let task = h.repository.get_task(USER_ID, &task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.progress, 0.0);
    assert_eq!(task.message, "Task cancelled by user");
    assert!(h.supervisor.running_task_ids().await.is_empty());

    // 进程被终止后的退出不会覆盖 cancelled
    tokio::time::sleep(Duration::from_millis(300)).await;
    let task = h.repository.get_task(USER_ID, &task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);

    let err = h.supervisor.cancel_task(USER_ID, &task_id).await.unwrap_err();
    assert!(matches!(err, JudgeError::Cancellation(_)));
    assert_eq!(err.to_string(), "task not found or not running");
}

#[tokio::test]
async fn test_cancel_unknown_or_foreign_task() {
    let h = harness("sleep 30\n");

    let err = h.supervisor.cancel_task(USER_ID, "20990101_000000_ffffffff").await.unwrap_err();
    assert!(matches!(err, JudgeError::Cancellation(_)));

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();
    wait_for(&h.repository, &task_id, |t| t.status == TaskStatus::Running).await;

    let err = h.supervisor.cancel_task(USER_ID + 1, &task_id).await.unwrap_err();
    assert!(matches!(err, JudgeError::Cancellation(_)));

    h.supervisor.shutdown().await;
    let task = h.repository.get_task(USER_ID, &task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(h.supervisor.running_task_ids().await.is_empty());
}

#[tokio::test]
async fn test_worker_receives_argument_contract_and_credential() {
    let h = harness("printf '%s\\n' \"$@\" > args.txt\n");

    let mut config = config();
    config.sample_size = 5;
    let task_id = h.supervisor.start_evaluation(USER_ID, config).await.unwrap();
    wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;

    let args = read_lines(&h.dir.path().join("args.txt"));
    let value_after = |flag: &str| -> String {
        let index = args.iter().position(|a| a == flag).unwrap();
        args[index + 1].clone()
    };

    assert_eq!(args[0], "--api_urls");
    assert_eq!(value_after("--task_id"), task_id);
    assert_eq!(value_after("--user_id"), USER_ID.to_string());
    assert_eq!(value_after("--sample-size"), "5");
    assert_eq!(value_after("--database_service_url"), "http://localhost:16384");

    let identity = h.issuer.verify(&value_after("--auth_token")).unwrap();
    assert_eq!(identity.user_id, USER_ID);
    assert_eq!(identity.username, "system_evaluation");
}

#[tokio::test]
async fn test_missing_interpreter_fails_task() {
    let h = harness_with_interpreters("exit 0\n", vec!["no-such-interpreter-91c2".to_string()]);

    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();

    let task = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.contains("no-such-interpreter-91c2"));
}

#[tokio::test]
async fn test_invalid_config_creates_nothing() {
    let h = harness("exit 0\n");
    let mut config = config();
    config.scoring.clear();

    let err = h.supervisor.start_evaluation(USER_ID, config).await.unwrap_err();
    assert!(matches!(err, JudgeError::Validation(_)));
    assert!(h.supervisor.get_all_tasks(USER_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_failure_never_touches_repository() {
    let mut repository = MockRepo::new();
    repository.expect_create_task().never();
    repository.expect_update_task().never();

    let supervisor = EvaluationTaskSupervisor::new(
        Arc::new(repository),
        model_configs(),
        Arc::new(JwtTokenIssuer::new("test-secret", 1)),
        SupervisorSettings::default(),
    );

    let mut config = config();
    config.temperature = Some(3.0);
    let err = supervisor.start_evaluation(USER_ID, config).await.unwrap_err();
    assert!(matches!(err, JudgeError::Validation(_)));
}

#[tokio::test]
async fn test_repository_failure_is_reported_to_caller() {
    let mut repository = MockRepo::new();
    repository
        .expect_create_task()
        .times(1)
        .returning(|_, _, _| Err(JudgeError::Repository("disk full".to_string())));

    let supervisor = EvaluationTaskSupervisor::new(
        Arc::new(repository),
        model_configs(),
        Arc::new(JwtTokenIssuer::new("test-secret", 1)),
        SupervisorSettings::default(),
    );

    let err = supervisor.start_evaluation(USER_ID, config()).await.unwrap_err();
    assert!(matches!(err, JudgeError::Repository(_)));
    assert!(supervisor.running_task_ids().await.is_empty());
}

#[tokio::test]
async fn test_update_task_info_only_changes_message() {
    let h = harness("exit 0\n");
    let task_id = h.supervisor.start_evaluation(USER_ID, config()).await.unwrap();
    let before = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;

    assert!(matches!(
        h.supervisor
            .update_task_info(&task_id, TaskInfoUpdate::default())
            .await,
        Err(JudgeError::Validation(_))
    ));

    // 终态任务仍可修改描述，状态与进度保持不变
    let found = h
        .supervisor
        .update_task_info(
            &task_id,
            TaskInfoUpdate {
                message: Some("reviewed: good run".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(found);
    let after = h.supervisor.get_task_status(USER_ID, &task_id).await.unwrap().unwrap();
    assert_eq!(after.message, "reviewed: good run");
    assert_eq!(after.status, before.status);
    assert_eq!(after.progress, before.progress);

    let missing = h
        .supervisor
        .update_task_info(
            "missing",
            TaskInfoUpdate {
                message: Some("note".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn test_unknown_model_creates_nothing() {
    let h = harness("exit 0\n");
    let mut config = config();
    config.model = "llama-unregistered".to_string();

    let err = h.supervisor.start_evaluation(USER_ID, config).await.unwrap_err();
    assert!(matches!(err, JudgeError::ModelNotFound(ref model) if model == "llama-unregistered"));
    assert!(h.supervisor.get_all_tasks(USER_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_config_fills_request_before_spawn() {
    let h = harness("printf '%s\\n' \"$@\" > args.txt\n");

    let mut config = config();
    config.api_urls.clear();
    config.is_vllm = true;
    let task_id = h.supervisor.start_evaluation(USER_ID, config).await.unwrap();
    let task = wait_for(&h.repository, &task_id, |t| t.status.is_terminal()).await;

    assert_eq!(task.config["api_urls"], serde_json::json!(["http://stored:8000"]));
    assert_eq!(task.config["api_key"], "sk-stored");
    assert_eq!(task.config["timeout"], 120);
    assert_eq!(task.config["is_vllm"], false);

    let args = read_lines(&h.dir.path().join("args.txt"));
    assert_eq!(args[..2], ["--api_urls", "http://stored:8000"]);
    assert!(!args.iter().any(|a| a == "--is_vllm"));
}
