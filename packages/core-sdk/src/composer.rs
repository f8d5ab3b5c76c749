use crate::error::ChatError;
use crate::models::{ChatRequest, Content, ProviderRequest};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/** \brief 探测模式下发送的固定短提示。 */
pub const PROBE_PROMPT: &str = "Test";

/**
 * \brief 固定人设指令，原样透传给上游，本地不做解释。
 */
pub const PERSONA_INSTRUCTION: &str = "You are a Data structure and Algorithm Instructor. \
You will only reply to the problem related to Data structure and Algorithm. \
You have to solve query of user in simplest way. \
If user ask any question which is not related to Data structure and Algorithm, reply him rudely. \
Example: If user ask, How are you \
You will reply: You dumb ask me some sensible question, like this message you can reply anything more rudely. \
You have to reply him rudely if question is not related to Data structure and Algorithm. \
Else reply him politely with simple explanation. Keep your responses concise and educational.";

/**
 * \brief 以固定人设构造请求。
 */
pub fn persona_request(user_text: &str) -> Result<ChatRequest, ChatError> {
    ChatRequest::new(user_text, PERSONA_INSTRUCTION)
}

/**
 * \brief 生成上游请求体。文本不做任何改写。
 */
pub fn compose(request: &ChatRequest) -> ProviderRequest {
    ProviderRequest {
        contents: vec![Content::text(&request.user_text)],
        system_instruction: Content::text(&request.persona_instruction),
    }
}

/**
 * \brief 规范化 API 基地址：去掉末尾 `/`，缺少版本段时补 `/v1beta`。
 */
pub fn normalize_base(api_base: &str) -> String {
    let trimmed = api_base.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}

pub fn endpoint_url(api_base: &str, model: &str) -> String {
    format!("{}/models/{}:generateContent", normalize_base(api_base), model)
}

/**
 * \brief 渲染等价的 curl 命令供调试/审计，只展示不执行；凭据以 `***` 代替。
 */
pub fn curl_preview(api_base: &str, model: &str, request: &ChatRequest) -> Result<String, ChatError> {
    let body = serde_json::to_string(&compose(request))
        .map_err(|e| ChatError::InvalidInput(format!("cannot encode request: {}", e)))?;
    Ok(format!(
        "curl -X POST \"{}?key=***\" -H \"Content-Type: application/json\" -d {}",
        endpoint_url(api_base, model),
        shell_single_quote(&body)
    ))
}

fn shell_single_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_composed_body_has_expected_shape() {
        let req = persona_request("What is a linked list?").unwrap();
        let v = serde_json::to_value(compose(&req)).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "What is a linked list?");
        assert_eq!(
            v["systemInstruction"]["parts"][0]["text"],
            PERSONA_INSTRUCTION
        );
        assert!(v.get("system_instruction").is_none());
    }

    #[test]
    fn test_composed_body_round_trips_awkward_text() {
        let text = r#"He said "sort it" \n then 'quit' ; rm -rf / — 二叉树 🌲"#;
        let req = ChatRequest::new(text, "persona with \"quotes\"\nand newline").unwrap();
        let encoded = serde_json::to_string(&compose(&req)).unwrap();
        let decoded: ProviderRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.contents.len(), 1);
        assert_eq!(decoded.contents[0].parts[0].text, text);
        assert_eq!(
            decoded.system_instruction.parts[0].text,
            "persona with \"quotes\"\nand newline"
        );
    }

    #[test]
    fn test_base_normalization() {
        assert_eq!(
            normalize_base("https://generativelanguage.googleapis.com/"),
            DEFAULT_API_BASE
        );
        assert_eq!(normalize_base(DEFAULT_API_BASE), DEFAULT_API_BASE);
        assert_eq!(normalize_base("http://127.0.0.1:8080/v1"), "http://127.0.0.1:8080/v1");
        assert_eq!(
            endpoint_url(DEFAULT_API_BASE, "gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_curl_preview_redacts_key_and_quotes_body() {
        let req = persona_request("it's a 'tree'").unwrap();
        let cmd = curl_preview(DEFAULT_API_BASE, "gemini-2.5-flash", &req).unwrap();
        assert!(cmd.starts_with("curl -X POST \""));
        assert!(cmd.contains("key=***"));
        assert!(cmd.contains(r"it'\''s a '\''tree'\''"));

        // 反转义后应能还原为原始请求体
        let start = cmd.find(" -d '").unwrap() + 5;
        let quoted = &cmd[start..cmd.len() - 1];
        let body: Value = serde_json::from_str(&quoted.replace(r"'\''", "'")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "it's a 'tree'");
    }
}
