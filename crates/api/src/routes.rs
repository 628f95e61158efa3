use axum::{
    routing::{get, post},
    Router,
};
use judge_core::SlidingWindowLimiter;
use judge_dispatcher::ModelDispatcher;
use judge_domain::ports::TokenIssuer;
use judge_worker::EvaluationTaskSupervisor;
use std::sync::Arc;

use crate::auth::auth_middleware;
use crate::handlers::{
    health::health_check,
    model_call::{get_concurrency_status, model_call},
    tasks::{cancel_task, create_task, get_task, list_tasks, update_task},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ModelDispatcher>,
    pub supervisor: Arc<EvaluationTaskSupervisor>,
    pub issuer: Arc<dyn TokenIssuer>,
    /// 任务创建限流，`None` 表示不限流
    pub limiter: Option<Arc<SlidingWindowLimiter>>,
    pub auth_enabled: bool,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        // 模型调用代理
        .route("/api/model-call", post(model_call))
        .route(
            "/api/model-call/status/{model_name}",
            get(get_concurrency_status),
        )
        // 评测任务
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/evaluate", post(create_task))
        .route(
            "/api/tasks/{task_id}",
            get(get_task).put(update_task).delete(cancel_task),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
}
