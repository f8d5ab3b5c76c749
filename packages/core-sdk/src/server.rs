use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{
    composer,
    config::InstructorConfig,
    error::{ChatError, ErrorKind},
    llm::Instructor,
    telemetry,
    transport::{HttpTransport, Transport},
};

pub const ENV_UI_DIR: &str = "DSA_UI_DIR";
pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/**
 * \brief 按 `PORT` 环境变量推导监听地址，未设置时使用 127.0.0.1:3000。
 */
pub fn default_addr() -> String {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse::<u16>().ok())
        .map(|p| format!("127.0.0.1:{}", p))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

/**
 * \brief 启动 relay 服务：静态前端 + 聊天 API。
 * \param addr 监听地址，如 "127.0.0.1:3000"
 */
pub async fn run(addr: &str, config: InstructorConfig) -> Result<()> {
    if let Err(e) = config.api_key() {
        // 仍然启动，聊天请求会收到配置错误提示
        eprintln!("warning: {}", e);
        telemetry::log_error("server.start", &e.to_string());
    }
    let transport = HttpTransport::new(&config).context("create http transport failed")?;
    let instructor = Arc::new(Instructor::new(config, transport));

    let ui_root = std::env::var(ENV_UI_DIR).unwrap_or_else(|_| "web".to_string());
    let app = router(instructor, &ui_root);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {} failed", addr))?;
    println!("DSA Instructor relay running on http://{}", addr);
    println!("API endpoint: http://{}/api/chat", addr);
    println!("cURL generator: http://{}/api/generate-curl", addr);
    telemetry::log_event("server.start", &format!("listening on {}", addr));
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 组装路由；传输层由调用方注入。
 */
pub fn router<T: Transport + 'static>(instructor: Arc<Instructor<T>>, ui_root: &str) -> Router {
    let static_service =
        get_service(ServeDir::new(ui_root).append_index_html_on_directories(true));

    Router::new()
        .route("/api/chat", post(chat::<T>))
        .route("/api/generate-curl", post(generate_curl::<T>))
        .route("/api/models", get(list_models::<T>))
        .route("/api/health", get(health_check))
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .with_state(instructor)
}

#[derive(Deserialize, Debug)]
struct ChatBody {
    /** \brief 用户消息 */
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Debug)]
struct ChatReply {
    response: String,
    model: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CurlReply {
    curl_command: String,
    body: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_err(e: &ChatError) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        Json(ErrorBody {
            error: e.user_message().to_string(),
            kind: Some(e.kind()),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
            kind: Some(ErrorKind::InvalidInput),
        }),
    )
}

/**
 * \brief 取出请求中的消息；请求体无法解析或消息为空时返回 400。
 */
fn require_message(payload: Result<Json<ChatBody>, JsonRejection>) -> Result<String, ApiError> {
    let Json(body) = payload.map_err(|_| bad_request("Message is required"))?;
    body.message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| bad_request("Message is required"))
}

/**
 * \brief 聊天接口：POST /api/chat { message } -> { response }
 */
async fn chat<T: Transport + 'static>(
    State(instructor): State<Arc<Instructor<T>>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let message = require_message(payload)?;
    telemetry::log_event(
        "server.chat",
        &format!("request prompt_len={}", message.len()),
    );

    match instructor.ask(&message).await {
        Ok(result) => {
            telemetry::log_event(
                "server.chat",
                &format!(
                    "model={} attempts={} reply_len={}",
                    result.model,
                    result.attempts.len(),
                    result.text.len()
                ),
            );
            Ok(Json(ChatReply {
                response: result.text,
                model: result.model,
            }))
        }
        Err(e) => {
            telemetry::log_error("server.chat", &e.to_string());
            Err(api_err(&e))
        }
    }
}

/**
 * \brief 仅生成请求（curl 命令与请求体），不执行。
 */
async fn generate_curl<T: Transport + 'static>(
    State(instructor): State<Arc<Instructor<T>>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<CurlReply>, ApiError> {
    let message = require_message(payload)?;
    let config = instructor.config();
    config.api_key().map_err(|e| api_err(&e))?;

    let request = composer::persona_request(&message).map_err(|e| api_err(&e))?;
    let curl_command = composer::curl_preview(&config.api_base, config.models.first(), &request)
        .map_err(|e| api_err(&e))?;
    let body = serde_json::to_value(composer::compose(&request))
        .map_err(|e| api_err(&ChatError::InvalidInput(e.to_string())))?;
    Ok(Json(CurlReply { curl_command, body }))
}

async fn list_models<T: Transport + 'static>(
    State(instructor): State<Arc<Instructor<T>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let models = instructor.list_models().await.map_err(|e| {
        telemetry::log_error("server.models", &e.to_string());
        api_err(&e)
    })?;
    Ok(Json(serde_json::json!({ "models": models })))
}

/**
 * \brief 健康检查，不访问上游。
 */
async fn health_check() -> Json<serde_json::Value> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(serde_json::json!({ "status": "OK", "timestamp": timestamp }))
}
