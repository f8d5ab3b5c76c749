use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/**
 * \brief 单次提问请求：用户文本 + 固定人设指令。每次调用新建，不持久化。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /** \brief 用户输入，原样保留（去除空白后非空） */
    pub user_text: String,
    /** \brief 系统人设指令 */
    pub persona_instruction: String,
}

impl ChatRequest {
    /**
     * \brief 构造请求；空文本或纯空白文本直接拒绝，其余内容不做改写。
     */
    pub fn new(user_text: &str, persona_instruction: &str) -> Result<Self, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::InvalidInput("Message is required".to_string()));
        }
        Ok(Self {
            user_text: user_text.to_string(),
            persona_instruction: persona_instruction.to_string(),
        })
    }
}

/**
 * \brief 候选模型列表，按优先级从高到低排列，进程启动时确定。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates(Vec<String>);

pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-flash-latest",
    "gemini-pro-latest",
    "gemini-2.5-pro",
];

impl ModelCandidates {
    /**
     * \brief 由任意标识序列构造；去掉 `models/` 前缀与空项，保持原顺序。
     */
    pub fn new<I, S>(ids: I) -> Result<Self, ChatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list: Vec<String> = ids
            .into_iter()
            .map(|s| normalize_model_id(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        if list.is_empty() {
            return Err(ChatError::Configuration(
                "model candidate list is empty".to_string(),
            ));
        }
        Ok(Self(list))
    }

    /**
     * \brief 解析逗号分隔的模型列表，如 `gemini-2.5-flash,gemini-2.0-flash`。
     */
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        Self::new(raw.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn first(&self) -> &str {
        // 构造时保证非空
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ModelCandidates {
    fn default() -> Self {
        Self(DEFAULT_MODELS.iter().map(|s| s.to_string()).collect())
    }
}

fn normalize_model_id(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_string()
}

/**
 * \brief Gemini generateContent 请求体（线上字段为 camelCase）。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

impl Content {
    pub fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

/**
 * \brief Gemini 响应。字段全部可选，形状缺失由 `first_text` 统一报告为格式错误。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub candidates: Option<Vec<ResponseCandidate>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCandidate {
    #[serde(default)]
    pub content: Option<ResponseContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

impl ProviderResponse {
    /**
     * \brief 取 `candidates[0].content.parts[0].text`；缺失或为空返回 MalformedResponse。
     */
    pub fn first_text(&self) -> Result<&str, ChatError> {
        let text = self
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_ref())
            .and_then(|p| p.first())
            .and_then(|p| p.text.as_deref())
            .ok_or_else(|| {
                ChatError::MalformedResponse(
                    "missing candidates[0].content.parts[0].text".to_string(),
                )
            })?;
        if text.trim().is_empty() {
            return Err(ChatError::MalformedResponse(
                "empty text in first candidate".to_string(),
            ));
        }
        Ok(text)
    }
}

/**
 * \brief 单个候选模型的尝试记录，仅用于诊断。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub model: String,
    /** \brief 成功为 "ok"，失败为错误描述 */
    pub outcome: String,
}

/**
 * \brief 成功结果。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResult {
    pub text: String,
    /** \brief 实际给出回复的模型 */
    pub model: String,
    pub attempts: Vec<Attempt>,
}
