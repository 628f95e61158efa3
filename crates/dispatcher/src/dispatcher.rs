use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use judge_core::config::DispatcherConfig;
use judge_core::{JudgeError, JudgeResult};
use judge_domain::model_call::{ConcurrencyStatus, ModelCallRequest, ModelCallResponse};
use judge_domain::ports::{slot_key, ConcurrencySlotManager};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::admission::{Admission, AdmissionPolicy};
use crate::wire;

/// 模型调用分发器
///
/// 每次调用前在共享计数服务中为模型占用一个并发槽位，调用结束后归还。
/// 计数服务不可用时降级为直接调用。
pub struct ModelDispatcher {
    slots: Arc<dyn ConcurrencySlotManager>,
    http: reqwest::Client,
    policy: AdmissionPolicy,
    default_max_concurrency: i64,
    model_max_concurrency: HashMap<String, i64>,
    default_timeout: Duration,
    shutdown: CancellationToken,
}

impl ModelDispatcher {
    pub fn new(
        slots: Arc<dyn ConcurrencySlotManager>,
        config: &DispatcherConfig,
        shutdown: CancellationToken,
    ) -> JudgeResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| JudgeError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            slots,
            http,
            policy: AdmissionPolicy {
                retry_interval: config.retry_interval(),
                max_wait: config.max_wait(),
            },
            default_max_concurrency: config.default_max_concurrency,
            model_max_concurrency: config.model_max_concurrency.clone(),
            default_timeout: Duration::from_secs(config.default_timeout_seconds),
            shutdown,
        })
    }

    pub fn with_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_concurrency_for(&self, model: &str) -> i64 {
        self.model_max_concurrency
            .get(model)
            .copied()
            .unwrap_or(self.default_max_concurrency)
    }

    /// 在并发限制下调用模型，返回生成的文本
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn call(&self, request: &ModelCallRequest) -> JudgeResult<String> {
        request.validate()?;

        let key = slot_key(&request.model);
        let max = self.max_concurrency_for(&request.model);

        match self
            .policy
            .admit(&self.slots, &key, max, &self.shutdown)
            .await?
        {
            Admission::Granted(guard) => {
                let result = self.send(request).await;
                guard.release().await;
                result
            }
            Admission::Degraded => self.send(request).await,
        }
    }

    /// 对外接口使用的调用结果，错误统一转换为 `success=false`
    pub async fn handle_call(&self, request: &ModelCallRequest) -> ModelCallResponse {
        match self.call(request).await {
            Ok(content) => ModelCallResponse::ok(content),
            Err(e) => {
                error!("模型调用失败: model={}, error={}", request.model, e);
                ModelCallResponse::failed(e.to_string())
            }
        }
    }

    /// 查询模型当前的并发占用，计数服务故障体现在 `error` 字段中
    pub async fn concurrency_status(&self, model: &str) -> ConcurrencyStatus {
        let max = self.max_concurrency_for(model);
        match self.slots.current_concurrency(&slot_key(model)).await {
            Ok(current) => ConcurrencyStatus::new(model, current, max),
            Err(e) => ConcurrencyStatus::unavailable(model, max, e.to_string()),
        }
    }

    async fn send(&self, request: &ModelCallRequest) -> JudgeResult<String> {
        let url = wire::chat_completions_url(&request.api_url);
        let payload = wire::build_payload(request);
        let timeout = if request.timeout == 0 {
            self.default_timeout
        } else {
            Duration::from_secs(request.timeout)
        };

        debug!("请求模型服务: url={}, timeout={:?}", url, timeout);

        let mut builder = self.http.post(&url).timeout(timeout).json(&payload);
        if let Some(key) = request.bearer_key() {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                JudgeError::Transport(format!("request timed out after {timeout:?}"))
            } else {
                JudgeError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| JudgeError::Transport(format!("读取响应失败: {e}")))?;

        let content = wire::parse_completion(status, &body)?;
        info!("模型调用完成: model={}, 响应长度={}", request.model, content.len());
        Ok(content)
    }
}
