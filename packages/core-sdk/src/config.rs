use std::time::Duration;

use crate::composer::DEFAULT_API_BASE;
use crate::error::ChatError;
use crate::models::ModelCandidates;

pub const ENV_API_KEY: &str = "GOOGLE_AI_API_KEY";
pub const ENV_API_BASE: &str = "DSA_API_BASE";
pub const ENV_MODELS: &str = "DSA_MODELS";
pub const ENV_TIMEOUT: &str = "DSA_TIMEOUT_SECS";
pub const ENV_MODE: &str = "DSA_FALLBACK_MODE";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/** \brief 示例配置里常见的占位值，一律视为未配置。 */
const PLACEHOLDER_KEYS: &[&str] = &[
    "your_api_key_here",
    "your_actual_api_key_here",
    "your_actual_google_ai_api_key",
    "your_new_key",
];

/**
 * \brief 回退方式：Direct 直接用真实问题依次尝试；Probe 先用短提示探测，再用选中模型回答。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    #[default]
    Direct,
    Probe,
}

impl FallbackMode {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "direct" => Ok(FallbackMode::Direct),
            "probe" => Ok(FallbackMode::Probe),
            other => Err(ChatError::Configuration(format!(
                "unknown fallback mode '{}', expected direct or probe",
                other
            ))),
        }
    }
}

/**
 * \brief 客户端配置，进程生命周期内只读。
 */
#[derive(Debug, Clone)]
pub struct InstructorConfig {
    /** \brief 上游 API Key；可能为空，真正发请求前由 `validate_api_key` 校验 */
    pub api_key: Option<String>,
    pub api_base: String,
    pub models: ModelCandidates,
    pub timeout_secs: u64,
    pub mode: FallbackMode,
}

impl Default for InstructorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            models: ModelCandidates::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            mode: FallbackMode::Direct,
        }
    }
}

impl InstructorConfig {
    /**
     * \brief 从进程环境读取配置；`stored_key` 为本地设置库中的凭据，环境变量优先。
     */
    pub fn from_env(stored_key: Option<String>) -> Result<Self, ChatError> {
        Self::from_lookup(|name| std::env::var(name).ok(), stored_key)
    }

    /**
     * \brief 以任意查找函数解析配置，便于测试注入。
     */
    pub fn from_lookup<F>(lookup: F, stored_key: Option<String>) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        cfg.api_key = lookup(ENV_API_KEY)
            .filter(|k| !k.trim().is_empty())
            .or(stored_key);

        if let Some(base) = lookup(ENV_API_BASE).filter(|s| !s.trim().is_empty()) {
            cfg.api_base = base;
        }
        if let Some(models) = lookup(ENV_MODELS).filter(|s| !s.trim().is_empty()) {
            cfg.models = ModelCandidates::parse(&models)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT).filter(|s| !s.trim().is_empty()) {
            cfg.timeout_secs = raw.trim().parse::<u64>().map_err(|_| {
                ChatError::Configuration(format!("{} must be a positive integer", ENV_TIMEOUT))
            })?;
            if cfg.timeout_secs == 0 {
                return Err(ChatError::Configuration(format!(
                    "{} must be a positive integer",
                    ENV_TIMEOUT
                )));
            }
        }
        if let Some(raw) = lookup(ENV_MODE) {
            cfg.mode = FallbackMode::parse(&raw)?;
        }
        Ok(cfg)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_models(mut self, models: ModelCandidates) -> Self {
        self.models = models;
        self
    }

    pub fn with_mode(mut self, mode: FallbackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /**
     * \brief 返回可用的 API Key；缺失或为占位值时报配置错误。
     */
    pub fn api_key(&self) -> Result<&str, ChatError> {
        validate_api_key(self.api_key.as_deref())
    }
}

/**
 * \brief 校验凭据：拒绝缺失、空白与已知占位值。
 */
pub fn validate_api_key(key: Option<&str>) -> Result<&str, ChatError> {
    let key = key.map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(ChatError::Configuration(format!(
            "{} not found in environment or local settings",
            ENV_API_KEY
        )));
    }
    if PLACEHOLDER_KEYS
        .iter()
        .any(|p| key.eq_ignore_ascii_case(p))
    {
        return Err(ChatError::Configuration(format!(
            "{} is still set to a placeholder value",
            ENV_API_KEY
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let cfg = InstructorConfig::from_lookup(lookup_from(&[]), None).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.models, ModelCandidates::default());
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.mode, FallbackMode::Direct);
        assert!(matches!(cfg.api_key(), Err(ChatError::Configuration(_))));
    }

    #[test]
    fn test_environment_overrides_stored_key() {
        let cfg = InstructorConfig::from_lookup(
            lookup_from(&[
                (ENV_API_KEY, "env-key"),
                (ENV_MODELS, "gemini-2.0-flash,gemini-2.5-pro"),
                (ENV_TIMEOUT, "5"),
                (ENV_MODE, "Probe"),
            ]),
            Some("stored-key".to_string()),
        )
        .unwrap();
        assert_eq!(cfg.api_key().unwrap(), "env-key");
        assert_eq!(cfg.models.first(), "gemini-2.0-flash");
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.mode, FallbackMode::Probe);
    }

    #[test]
    fn test_stored_key_used_when_env_blank() {
        let cfg = InstructorConfig::from_lookup(
            lookup_from(&[(ENV_API_KEY, "  ")]),
            Some("stored-key".to_string()),
        )
        .unwrap();
        assert_eq!(cfg.api_key().unwrap(), "stored-key");
    }

    #[test]
    fn test_placeholder_keys_rejected() {
        for key in ["your_api_key_here", "YOUR_ACTUAL_API_KEY_HERE", "   "] {
            assert!(matches!(
                validate_api_key(Some(key)),
                Err(ChatError::Configuration(_))
            ));
        }
        assert!(validate_api_key(None).is_err());
        assert_eq!(validate_api_key(Some(" real-key ")).unwrap(), "real-key");
    }

    #[test]
    fn test_invalid_timeout_and_mode_rejected() {
        assert!(InstructorConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT, "0")]), None).is_err());
        assert!(InstructorConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT, "soon")]), None).is_err());
        assert!(InstructorConfig::from_lookup(lookup_from(&[(ENV_MODE, "random")]), None).is_err());
    }
}
