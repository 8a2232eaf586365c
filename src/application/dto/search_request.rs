// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::search_result::SearchType;
use serde::Deserialize;
use validator::Validate;

fn default_num_results() -> u32 {
    10
}

/// 搜索请求DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchRequestDto {
    /// 查询串
    #[validate(length(min = 1, max = 512))]
    pub query: String,

    /// 返回结果数（1-20）
    #[serde(default = "default_num_results")]
    #[validate(range(min = 1, max = 20))]
    pub num_results: u32,

    /// 对前N个结果内联抓取（0禁用）
    #[serde(default)]
    #[validate(range(max = 10))]
    pub scrape_top_n: u32,

    /// 搜索类型
    #[serde(default)]
    pub search_type: SearchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dto: SearchRequestDto = serde_json::from_str(r#"{"query": "rust crawler"}"#).unwrap();
        assert_eq!(dto.num_results, 10);
        assert_eq!(dto.scrape_top_n, 0);
        assert_eq!(dto.search_type, SearchType::Web);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_bounds() {
        let dto: SearchRequestDto =
            serde_json::from_str(r#"{"query": "x", "num_results": 50}"#).unwrap();
        assert!(dto.validate().is_err());
    }
}
