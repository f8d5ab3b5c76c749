use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::composer::{endpoint_url, normalize_base};
use crate::config::InstructorConfig;
use crate::error::ChatError;
use crate::models::{ProviderRequest, ProviderResponse};

/**
 * \brief 上游调用接缝：CLI/relay 注入 HTTP 实现，测试注入脚本化实现。
 */
#[async_trait]
pub trait Transport: Send + Sync {
    /** \brief 对指定模型发起一次 generateContent 调用。 */
    async fn generate(
        &self,
        model: &str,
        body: &ProviderRequest,
    ) -> Result<ProviderResponse, ChatError>;

    /** \brief 列出凭据可见的模型。 */
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;
}

/**
 * \brief 基于 reqwest 的 Gemini 传输层；凭据以 `key` 查询参数传递。
 */
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &InstructorConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::Transport(format!("build http client failed: {}", e)))?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn key(&self) -> Result<&str, ChatError> {
        crate::config::validate_api_key(self.api_key.as_deref())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn generate(
        &self,
        model: &str,
        body: &ProviderRequest,
    ) -> Result<ProviderResponse, ChatError> {
        let key = self.key()?;
        let resp = self
            .client
            .post(endpoint_url(&self.api_base, model))
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_err)?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        serde_json::from_str::<ProviderResponse>(&text)
            .map_err(|e| ChatError::MalformedResponse(format!("cannot decode response: {}", e)))
    }

    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let key = self.key()?;
        let url = format!("{}/models", normalize_base(&self.api_base));
        let resp = self
            .client
            .get(url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(transport_err)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_err)?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| ChatError::MalformedResponse(format!("cannot decode models: {}", e)))?;
        parse_model_list(&v)
    }
}

/**
 * \brief 传输错误转为文本前去掉请求 URL，因其查询串里带有凭据。
 */
fn transport_err(e: reqwest::Error) -> ChatError {
    let timed_out = e.is_timeout();
    let e = e.without_url();
    if timed_out {
        ChatError::Transport(format!("request timed out: {}", e))
    } else {
        ChatError::Transport(e.to_string())
    }
}

/**
 * \brief 将非 2xx 响应归类。无法解析的响应体按传输错误处理。
 */
pub fn classify_failure(status: StatusCode, body: &str) -> ChatError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    let provider_status = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("");
    let haystack = format!("{} {}", provider_status, body);

    if status == StatusCode::UNAUTHORIZED
        || haystack.contains("API_KEY_INVALID")
        || haystack.contains("API key not valid")
        || haystack.contains("Invalid API key")
    {
        return ChatError::Authentication(message);
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || provider_status == "RESOURCE_EXHAUSTED"
        || message.to_ascii_lowercase().contains("quota exceeded")
    {
        return ChatError::RateLimited(message);
    }
    if status == StatusCode::FORBIDDEN {
        return ChatError::PermissionDenied(message);
    }
    if parsed.is_none() {
        return ChatError::Transport(format!("HTTP {} with unreadable body", status.as_u16()));
    }
    ChatError::Provider {
        status: status.as_u16(),
        message,
    }
}

fn parse_model_list(v: &Value) -> Result<Vec<String>, ChatError> {
    let arr = v
        .get("models")
        .and_then(|x| x.as_array())
        .ok_or_else(|| ChatError::MalformedResponse("missing models array".to_string()))?;
    Ok(arr
        .iter()
        .filter_map(|item| {
            item.get("name")
                .and_then(|s| s.as_str())
                .or_else(|| item.get("id").and_then(|s| s.as_str()))
        })
        .map(|s| s.strip_prefix("models/").unwrap_or(s).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_by_status_and_body() {
        let invalid_key = json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &invalid_key),
            ChatError::Authentication(m) if m.starts_with("API key not valid")
        ));

        let quota = json!({"error": {"code": 429, "message": "exhausted", "status": "RESOURCE_EXHAUSTED"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, &quota),
            ChatError::RateLimited(_)
        ));

        let denied = json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, &denied),
            ChatError::PermissionDenied(_)
        ));

        let not_found = json!({"error": {"code": 404, "message": "models/x is not found", "status": "NOT_FOUND"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, &not_found),
            ChatError::Provider { status: 404, .. }
        ));

        let exceeded = json!({"error": {"code": 400, "message": "Quota exceeded for metric generate_content_requests", "status": "FAILED_PRECONDITION"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &exceeded),
            ChatError::RateLimited(_)
        ));
    }

    #[test]
    fn test_quota_mention_alone_is_not_rate_limit() {
        let body = json!({"error": {"code": 400, "message": "The quota project for this request is not set.", "status": "INVALID_ARGUMENT"}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &body),
            ChatError::Provider { status: 400, .. }
        ));

        let detail_only = json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED", "details": [{"reason": "quota_project_missing"}]}}).to_string();
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, &detail_only),
            ChatError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_unreadable_error_body_is_transport() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            ChatError::Transport(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, ""),
            ChatError::Authentication(_)
        ));
    }

    #[test]
    fn test_model_list_strips_prefix() {
        let v = json!({"models": [{"name": "models/gemini-2.5-flash"}, {"id": "gemini-pro"}, {}]});
        assert_eq!(
            parse_model_list(&v).unwrap(),
            vec!["gemini-2.5-flash".to_string(), "gemini-pro".to_string()]
        );
        assert!(parse_model_list(&json!({"data": []})).is_err());
    }
}
