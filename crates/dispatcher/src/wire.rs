//! 模型服务的请求与响应格式

use judge_core::{JudgeError, JudgeResult};
use judge_domain::model_call::{BackendKind, ModelCallRequest};
use serde::Deserialize;
use serde_json::{json, Value};

/// 去掉末尾的 `/`，并确保以 `/v1` 结尾
pub fn normalize_base_url(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

pub fn chat_completions_url(api_url: &str) -> String {
    format!("{}/chat/completions", normalize_base_url(api_url))
}

pub fn build_payload(request: &ModelCallRequest) -> Value {
    match request.backend_kind() {
        BackendKind::Capacity => json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
            "stream": false,
            "do_sample": request.temperature > 0.0,
            "chat_template_kwargs": { "enable_thinking": false },
        }),
        BackendKind::OpenAiCompatible => json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 解析模型服务响应，返回第一个候选的内容
pub fn parse_completion(status: u16, body: &str) -> JudgeResult<String> {
    if !(200..300).contains(&status) {
        return Err(JudgeError::Upstream {
            status,
            body: body.to_string(),
        });
    }

    let completion: ChatCompletion = serde_json::from_str(body).map_err(|e| {
        JudgeError::Upstream {
            status,
            body: format!("invalid response body: {e}"),
        }
    })?;

    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| JudgeError::Upstream {
            status,
            body: "no choices in response".to_string(),
        })
}
