// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::{ErrorCode, PipelineError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// 保留的Markdown头部字符数
const TRUNCATE_HEAD_CHARS: usize = 12_000;

/// 保留的Markdown尾部字符数
const TRUNCATE_TAIL_CHARS: usize = 3_000;

/// 截断省略标记
const ELISION_MARKER: &str = "\n\n[... content elided ...]\n\n";

/// 校验失败后的最大纠正重试次数
const MAX_CORRECTIVE_RETRIES: u32 = 2;

/// LLM客户端特质
///
/// 只负责一次补全调用；提示词组装、截断与输出校验在服务层
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 执行一次补全
    async fn complete(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, PipelineError>;
}

/// OpenAI兼容的chat completions客户端
///
/// # 配置
///
/// 通过环境变量进行配置：
/// - `LLM_API_KEY` - LLM API密钥
/// - `LLM_MODEL` - 使用的模型名称
/// - `LLM_API_BASE_URL` - LLM API基础URL
pub struct OpenAiCompatClient {
    api_key: Option<String>,
    model: String,
    api_base_url: String,
    client: reqwest::Client,
}

impl Default for OpenAiCompatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatClient {
    pub fn new() -> Self {
        Self {
            api_key: env::var("LLM_API_KEY").ok(),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_base_url: env::var("LLM_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn new_with_config(api_key: String, model: String, api_base_url: String) -> Self {
        Self {
            api_key: Some(api_key),
            model,
            api_base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, PipelineError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            PipelineError::new(ErrorCode::LlmProviderError, "LLM API key not configured")
        })?;

        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 0.0
        });

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request_body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::new(ErrorCode::LlmTimeout, "LLM call timed out")
                } else {
                    PipelineError::new(
                        ErrorCode::LlmProviderError,
                        format!("Failed to reach LLM API: {}", e),
                    )
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::new(
                ErrorCode::LlmProviderError,
                format!("LLM API returned {}: {}", status, error_text),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::new(
                ErrorCode::LlmProviderError,
                format!("Failed to parse LLM API response: {}", e),
            )
        })?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::new(
                    ErrorCode::LlmProviderError,
                    "Invalid response format from LLM API",
                )
            })
    }
}

/// LLM结构化提取服务
///
/// 将页面Markdown、用户指令与可选JSON模式组装为提示词，调用
/// 提供商并解析输出；提供模式时输出必须通过校验，失败后携带
/// 校验错误纠正重试至多两次
pub struct LlmExtractionService {
    client: Arc<dyn LlmClient>,
}

impl LlmExtractionService {
    /// 创建新的LLM提取服务
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// 执行结构化提取
    ///
    /// # 参数
    ///
    /// * `markdown` - 页面Markdown
    /// * `instruction` - 用户自然语言指令
    /// * `schema` - 可选JSON模式约束
    /// * `timeout` - 单次LLM调用期限
    ///
    /// # 返回值
    ///
    /// * `Ok(Value)` - 解析并通过校验的JSON
    /// * `Err(PipelineError)` - LLM_TIMEOUT / LLM_PROVIDER_ERROR / LLM_OUTPUT_INVALID
    pub async fn extract_structured(
        &self,
        markdown: &str,
        instruction: &str,
        schema: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value, PipelineError> {
        let content = truncate_head_heavy(markdown, TRUNCATE_HEAD_CHARS, TRUNCATE_TAIL_CHARS);

        let mut system = String::from(
            "You are an expert data extractor. You will be provided with webpage \
             content in Markdown format. Extract the information the user requests \
             and return it as valid JSON. Do not include any preamble or \
             explanation, only the JSON object.",
        );
        if let Some(schema) = schema {
            system.push_str(&format!(
                "\n\nThe extracted data MUST strictly follow this JSON schema: {}",
                schema
            ));
        }

        let base_user = format!(
            "User Request: {}\n\nWebpage Content:\n{}",
            instruction, content
        );

        let mut last_violation = String::new();
        for attempt in 0..=MAX_CORRECTIVE_RETRIES {
            let user = if attempt == 0 {
                base_user.clone()
            } else {
                format!(
                    "{}\n\nYour previous answer was rejected: {}\nReturn corrected JSON only.",
                    base_user, last_violation
                )
            };

            let raw = self.client.complete(&system, &user, timeout).await?;
            let cleaned = strip_code_fences(&raw);

            let parsed: Value = match serde_json::from_str(cleaned) {
                Ok(value) => value,
                Err(e) => {
                    last_violation = format!("response was not valid JSON: {}", e);
                    tracing::warn!("LLM output rejected (attempt {}): {}", attempt + 1, last_violation);
                    continue;
                }
            };

            if let Some(schema) = schema {
                if let Err(violation) = validate_schema(&parsed, schema, "$") {
                    last_violation = violation;
                    tracing::warn!("LLM output rejected (attempt {}): {}", attempt + 1, last_violation);
                    continue;
                }
            }

            return Ok(parsed);
        }

        Err(PipelineError::new(
            ErrorCode::LlmOutputInvalid,
            format!("LLM output failed validation after retries: {}", last_violation),
        ))
    }
}

/// 头重截断：保留开头N个字符与结尾M个字符，中间以省略标记连接
pub fn truncate_head_heavy(text: &str, head_chars: usize, tail_chars: usize) -> String {
    let total = text.chars().count();
    if total <= head_chars + tail_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(head_chars).collect();
    let tail: String = text
        .chars()
        .skip(total - tail_chars)
        .collect();
    format!("{}{}{}", head, ELISION_MARKER, tail)
}

/// 剥离输出外层的Markdown代码围栏
fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// 结构化校验
///
/// 支持提取端点接受的模式子集：type（含类型数组）、required、
/// properties、items、enum；返回首个违例的路径化描述
pub fn validate_schema(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type") {
        let allowed: Vec<String> = match expected {
            Value::String(s) => vec![s.clone()],
            Value::Array(options) => options
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(value, t)) {
            return Err(format!(
                "{}: expected type {}, got {}",
                path,
                allowed.join(" | "),
                type_name(value)
            ));
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            return Err(format!("{}: value is not one of the allowed enum options", path));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        if let Some(object) = value.as_object() {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{}: missing required property '{}'", path, key));
                }
            }
        }
    }

    if let (Some(properties), Some(object)) = (
        schema.get("properties").and_then(Value::as_object),
        value.as_object(),
    ) {
        for (key, sub_schema) in properties {
            if let Some(sub_value) = object.get(key) {
                validate_schema(sub_value, sub_schema, &format!("{}.{}", path, key))?;
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_schema(item, items, &format!("{}[{}]", path, index))?;
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// 按脚本返回预设输出的测试客户端
    struct ScriptedClient {
        responses: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(str::to_string).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _timeout: Duration,
        ) -> Result<String, PipelineError> {
            self.calls.lock().push(user.to_string());
            self.responses.lock().pop().ok_or_else(|| {
                PipelineError::new(ErrorCode::LlmProviderError, "no scripted response left")
            })
        }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "price"],
            "properties": {
                "name": {"type": "string"},
                "price": {"type": "number"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn test_truncate_head_heavy() {
        let text = "a".repeat(100);
        assert_eq!(truncate_head_heavy(&text, 60, 40), text);

        let long: String = ('a'..='z').cycle().take(1000).collect();
        let truncated = truncate_head_heavy(&long, 100, 50);
        assert!(truncated.starts_with(&long.chars().take(100).collect::<String>()));
        assert!(truncated.contains("[... content elided ...]"));
        assert!(truncated.ends_with(
            &long.chars().skip(1000 - 50).collect::<String>()
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "日本語のテキスト".repeat(100);
        let truncated = truncate_head_heavy(&text, 10, 5);
        assert!(truncated.contains("[... content elided ...]"));
    }

    #[test]
    fn test_schema_validation() {
        let s = schema();
        assert!(validate_schema(&json!({"name": "x", "price": 1.5}), &s, "$").is_ok());

        let err = validate_schema(&json!({"name": "x"}), &s, "$").unwrap_err();
        assert!(err.contains("price"));

        let err = validate_schema(&json!({"name": 2, "price": 1}), &s, "$").unwrap_err();
        assert!(err.contains("$.name"));

        let err = validate_schema(
            &json!({"name": "x", "price": 1, "tags": ["a", 3]}),
            &s,
            "$",
        )
        .unwrap_err();
        assert!(err.contains("$.tags[1]"));
    }

    #[test]
    fn test_schema_enum_and_union_types() {
        let s = json!({"type": ["string", "null"]});
        assert!(validate_schema(&json!("x"), &s, "$").is_ok());
        assert!(validate_schema(&Value::Null, &s, "$").is_ok());
        assert!(validate_schema(&json!(5), &s, "$").is_err());

        let s = json!({"enum": ["red", "green"]});
        assert!(validate_schema(&json!("red"), &s, "$").is_ok());
        assert!(validate_schema(&json!("blue"), &s, "$").is_err());
    }

    #[tokio::test]
    async fn test_extract_accepts_valid_first_attempt() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"```json
{"name": "Widget", "price": 9.99}
```"#,
        ]));
        let service = LlmExtractionService::new(client.clone());
        let result = service
            .extract_structured("# Page", "get product", Some(&schema()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["name"], "Widget");
        assert_eq!(client.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_retries_with_corrective_prompt() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"name": "Widget"}"#,
            r#"{"name": "Widget", "price": 9.99}"#,
        ]));
        let service = LlmExtractionService::new(client.clone());
        let result = service
            .extract_structured("# Page", "get product", Some(&schema()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["price"], 9.99);

        let calls = client.calls.lock();
        assert_eq!(calls.len(), 2);
        // 第二次提示词引用了校验错误
        assert!(calls[1].contains("rejected"));
        assert!(calls[1].contains("price"));
    }

    #[tokio::test]
    async fn test_extract_fails_after_two_corrective_retries() {
        let client = Arc::new(ScriptedClient::new(vec!["not json", "still not json", "nope"]));
        let service = LlmExtractionService::new(client.clone());
        let err = service
            .extract_structured("# Page", "get product", Some(&schema()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LlmOutputInvalid);
        assert_eq!(client.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_extract_without_schema_only_needs_json() {
        let client = Arc::new(ScriptedClient::new(vec![r#"{"anything": [1, 2]}"#]));
        let service = LlmExtractionService::new(client);
        let result = service
            .extract_structured("# Page", "summarize", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["anything"][0], 1);
    }
}
