use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use judge_domain::ports::Identity;
use tracing::{debug, warn};

use crate::{error::ApiError, routes::AppState};

pub const BEARER_PREFIX: &str = "Bearer ";

/// 关闭认证时使用的调用方身份
pub const ANONYMOUS_USER_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Identity);

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.0.user_id
    }

    fn anonymous() -> Self {
        Self(Identity {
            user_id: ANONYMOUS_USER_ID,
            username: "anonymous".to_string(),
        })
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("missing authentication token".to_string()))
    }
}

/// 校验 Bearer 令牌并把调用方身份放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(request.headers());

    let user = match (token, state.auth_enabled) {
        (Some(token), _) => match state.issuer.verify(&token) {
            Ok(identity) => AuthenticatedUser(identity),
            Err(e) if state.auth_enabled => {
                warn!("令牌校验失败: {} {} - {}", request.method(), request.uri(), e);
                return ApiError::Unauthorized("invalid authentication token".to_string())
                    .into_response();
            }
            Err(_) => AuthenticatedUser::anonymous(),
        },
        (None, true) => {
            debug!("缺少认证令牌: {} {}", request.method(), request.uri());
            return ApiError::Unauthorized("missing authentication token".to_string())
                .into_response();
        }
        (None, false) => AuthenticatedUser::anonymous(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
