use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, Path, State},
    http::request::Parts,
    Json,
};
use judge_domain::entities::{Task, TaskInfoUpdate};
use judge_domain::evaluation::EvaluationConfig;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    routes::AppState,
};

const TASK_NOT_FOUND: &str = "Task not found or access denied";

/// 限流使用的客户端地址：优先取代理头，其次取连接地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let real_ip = parts
            .headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let ip = match forwarded.or(real_ip) {
            Some(ip) => ip.to_string(),
            None => parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        };

        Ok(ClientIp(ip))
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

/// 创建评测任务，进程在后台启动
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ClientIp(ip): ClientIp,
    payload: Result<Json<EvaluationConfig>, JsonRejection>,
) -> ApiResult<Json<CreateTaskResponse>> {
    if let Some(limiter) = &state.limiter {
        if !limiter.check(&ip).await {
            warn!("任务创建请求被限流: ip={}, user_id={}", ip, user.user_id());
            return Err(ApiError::RateLimited);
        }
    }

    let Json(config) = payload?;
    let task_id = state
        .supervisor
        .start_evaluation(user.user_id(), config)
        .await?;

    info!("评测任务已提交: user_id={}, task_id={}", user.user_id(), task_id);

    Ok(Json(CreateTaskResponse {
        task_id,
        status: "pending",
        message: "Evaluation task started",
    }))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<TaskListResponse>> {
    let tasks = state.supervisor.get_all_tasks(user.user_id()).await?;
    Ok(Json(TaskListResponse { tasks }))
}

pub async fn get_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    state
        .supervisor
        .get_task_status(user.user_id(), &task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(TASK_NOT_FOUND.to_string()))
}

/// 取消运行中的任务，任务不存在或未在运行时返回 404
pub async fn cancel_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.supervisor.cancel_task(user.user_id(), &task_id).await?;
    Ok(Json(json!({ "message": "Task cancelled successfully" })))
}

/// 只允许修改任务描述信息
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<String>,
    payload: Result<Json<TaskInfoUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = payload?;

    if state
        .supervisor
        .get_task_status(user.user_id(), &task_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(TASK_NOT_FOUND.to_string()));
    }

    if !state.supervisor.update_task_info(&task_id, update).await? {
        return Err(ApiError::NotFound(TASK_NOT_FOUND.to_string()));
    }

    Ok(Json(json!({ "message": "Task updated successfully" })))
}
