use serde::Serialize;
use thiserror::Error;

use crate::models::Attempt;

/**
 * \brief 统一错误类型。单个候选模型的错误在回退扫描中被记录而不外抛，
 *        只有全部耗尽时才以 AllCandidatesExhausted 返回给调用方。
 */
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider error: HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no model available after {} attempt(s); last error: {last}", .attempts.len())]
    AllCandidatesExhausted {
        attempts: Vec<Attempt>,
        last: Box<ChatError>,
    },
}

/**
 * \brief 机器可读的错误分类，随 relay 错误响应一起返回。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    Transport,
    Authentication,
    PermissionDenied,
    RateLimited,
    Provider,
    MalformedResponse,
    AllCandidatesExhausted,
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Configuration(_) => ErrorKind::Configuration,
            ChatError::InvalidInput(_) => ErrorKind::InvalidInput,
            ChatError::Transport(_) => ErrorKind::Transport,
            ChatError::Authentication(_) => ErrorKind::Authentication,
            ChatError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ChatError::RateLimited(_) => ErrorKind::RateLimited,
            ChatError::Provider { .. } => ErrorKind::Provider,
            ChatError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ChatError::AllCandidatesExhausted { .. } => ErrorKind::AllCandidatesExhausted,
        }
    }

    /**
     * \brief 面向用户的可操作提示，不包含上游原始报错文本。
     */
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::Configuration(_) => {
                "API key not configured. Please set GOOGLE_AI_API_KEY or run `dsa-instructor init --api-key <KEY>`."
            }
            ChatError::InvalidInput(_) => "Message is required.",
            ChatError::Transport(_) => {
                "Could not reach the AI service. Please check your internet connection and try again."
            }
            ChatError::Authentication(_) => {
                "Your API key appears to be invalid. Please generate a new key and update your configuration."
            }
            ChatError::PermissionDenied(_) => {
                "API access denied. Please check your API key permissions."
            }
            ChatError::RateLimited(_) => {
                "API quota exceeded. Please wait a moment and retry, or check your usage limits."
            }
            ChatError::Provider { .. } => {
                "The AI service is temporarily unavailable. Please try again later."
            }
            ChatError::MalformedResponse(_) => "Invalid response from AI service.",
            ChatError::AllCandidatesExhausted { last, .. } => match last.as_ref() {
                ChatError::Provider { .. } | ChatError::MalformedResponse(_) => {
                    "No working models found. Please check your API key and try again."
                }
                other => other.user_message(),
            },
        }
    }

    /**
     * \brief relay 层使用的 HTTP 状态码。
     */
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::InvalidInput(_) => 400,
            ChatError::Configuration(_) => 503,
            ChatError::RateLimited(_) => 429,
            ChatError::AllCandidatesExhausted { last, .. } => match last.as_ref() {
                ChatError::RateLimited(_) => 429,
                _ => 502,
            },
            _ => 502,
        }
    }
}
