use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use judge_domain::model_call::{ConcurrencyStatus, ModelCallRequest, ModelCallResponse};
use tracing::info;

use crate::{auth::AuthenticatedUser, error::ApiResult, routes::AppState};

/// 代理模型调用；调用失败仍返回 200，错误放在 `error` 字段
pub async fn model_call(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ModelCallRequest>, JsonRejection>,
) -> ApiResult<Json<ModelCallResponse>> {
    let Json(request) = payload?;

    info!(
        "收到模型调用请求: user_id={}, model={}, api_url={}, max_tokens={}",
        user.user_id(),
        request.model,
        request.api_url,
        request.max_tokens
    );

    Ok(Json(state.dispatcher.handle_call(&request).await))
}

pub async fn get_concurrency_status(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Json<ConcurrencyStatus> {
    Json(state.dispatcher.concurrency_status(&model_name).await)
}
