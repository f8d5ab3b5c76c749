use crate::composer::{self, PROBE_PROMPT};
use crate::config::{FallbackMode, InstructorConfig};
use crate::error::ChatError;
use crate::models::{Attempt, ChatResult, ProviderRequest};
use crate::telemetry;
use crate::transport::Transport;

/**
 * \brief DSA 讲师客户端：组装请求并按候选模型优先级顺序回退。
 *
 * 每次 `ask` 都从列表头开始扫描，不缓存上一次成功的模型；
 * 扫描严格串行，单个候选内不重试。
 */
pub struct Instructor<T: Transport> {
    config: InstructorConfig,
    transport: T,
}

impl<T: Transport> Instructor<T> {
    pub fn new(config: InstructorConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &InstructorConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /**
     * \brief 提问并返回回复文本。
     *
     * 凭据缺失或为占位值时在任何网络调用之前失败；
     * 所有候选均失败时返回 AllCandidatesExhausted，并携带最后一个错误。
     */
    pub async fn ask(&self, user_text: &str) -> Result<ChatResult, ChatError> {
        self.config.api_key()?;
        let request = composer::persona_request(user_text)?;
        let body = composer::compose(&request);

        match self.config.mode {
            FallbackMode::Direct => self.scan(&body).await,
            FallbackMode::Probe => self.probe_then_ask(&body).await,
        }
    }

    /**
     * \brief 列出凭据可见的模型。
     */
    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        self.config.api_key()?;
        self.transport.list_models().await
    }

    async fn scan(&self, body: &ProviderRequest) -> Result<ChatResult, ChatError> {
        let mut attempts = Vec::with_capacity(self.config.models.len());
        let mut last = None;

        for model in self.config.models.iter() {
            match self.call(model, body).await {
                Ok(text) => {
                    telemetry::log_event("llm.fallback", &format!("model={} ok", model));
                    attempts.push(Attempt {
                        model: model.to_string(),
                        outcome: "ok".to_string(),
                    });
                    return Ok(ChatResult {
                        text,
                        model: model.to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    telemetry::log_error(
                        "llm.fallback",
                        &format!("model={} kind={:?} err={}", model, e.kind(), e),
                    );
                    attempts.push(Attempt {
                        model: model.to_string(),
                        outcome: e.to_string(),
                    });
                    last = Some(e);
                }
            }
        }

        Err(exhausted(attempts, last))
    }

    async fn probe_then_ask(&self, body: &ProviderRequest) -> Result<ChatResult, ChatError> {
        let probe_request =
            composer::persona_request(PROBE_PROMPT).map(|r| composer::compose(&r))?;
        let mut attempts = Vec::with_capacity(self.config.models.len());
        let mut last = None;

        for model in self.config.models.iter() {
            let outcome = match self.call(model, &probe_request).await {
                Ok(_) => {
                    telemetry::log_event("llm.probe", &format!("model={} ok", model));
                    self.call(model, body).await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(text) => {
                    attempts.push(Attempt {
                        model: model.to_string(),
                        outcome: "ok".to_string(),
                    });
                    return Ok(ChatResult {
                        text,
                        model: model.to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    telemetry::log_error(
                        "llm.probe",
                        &format!("model={} kind={:?} err={}", model, e.kind(), e),
                    );
                    attempts.push(Attempt {
                        model: model.to_string(),
                        outcome: e.to_string(),
                    });
                    last = Some(e);
                }
            }
        }

        Err(exhausted(attempts, last))
    }

    async fn call(&self, model: &str, body: &ProviderRequest) -> Result<String, ChatError> {
        let resp = self.transport.generate(model, body).await?;
        resp.first_text().map(|s| s.to_string())
    }
}

fn exhausted(attempts: Vec<Attempt>, last: Option<ChatError>) -> ChatError {
    telemetry::log_error(
        "llm.fallback",
        &format!("all {} candidate(s) failed", attempts.len()),
    );
    ChatError::AllCandidatesExhausted {
        attempts,
        last: Box::new(last.unwrap_or_else(|| {
            ChatError::Configuration("model candidate list is empty".to_string())
        })),
    }
}
