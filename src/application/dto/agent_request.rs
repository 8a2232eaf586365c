// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::RenderPolicy;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// LLM结构化提取请求DTO
///
/// 同时作为作业的input_params持久化
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentExtractRequestDto {
    /// 目标URL
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    /// 自然语言提取指令
    #[validate(length(min = 1, max = 8192))]
    pub prompt: String,

    /// 可选JSON模式约束
    #[serde(default)]
    pub schema_definition: Option<serde_json::Value>,

    /// 渲染策略
    #[serde(default)]
    pub use_playwright: RenderPolicy,

    /// 是否遵循robots.txt
    #[serde(default)]
    pub respect_robots: bool,

    /// 请求期限（毫秒）
    #[validate(range(min = 1000, max = 60000))]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request() {
        let dto: AgentExtractRequestDto = serde_json::from_str(
            r#"{"url": "https://example.com/", "prompt": "extract the product name"}"#,
        )
        .unwrap();
        assert!(dto.validate().is_ok());
        assert_eq!(dto.use_playwright, RenderPolicy::Auto);
        assert!(dto.schema_definition.is_none());
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let dto: AgentExtractRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/", "prompt": ""}"#).unwrap();
        assert!(dto.validate().is_err());
    }
}
