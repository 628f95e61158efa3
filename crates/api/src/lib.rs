//! # Judge API
//!
//! 评测服务的 HTTP 接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! - `POST /api/model-call` - 在并发限制下代理模型调用
//! - `GET /api/model-call/status/{model_name}` - 查询模型并发占用
//! - `POST /api/tasks`、`POST /api/evaluate` - 创建评测任务（按客户端IP限流）
//! - `GET /api/tasks` - 当前用户的任务列表
//! - `GET /api/tasks/{task_id}` - 任务详情
//! - `PUT /api/tasks/{task_id}` - 修改任务信息
//! - `DELETE /api/tasks/{task_id}` - 取消运行中的任务
//! - `GET /health` - 健康检查
//!
//! 除健康检查外，所有接口都需要 `Authorization: Bearer <token>`。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::Router;
use judge_core::config::ServerConfig;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, server: &ServerConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if server.cors_enabled {
        router.layer(cors_layer(&server.cors_origins))
    } else {
        router
    }
}
