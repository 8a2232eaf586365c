// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 搜索类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// 普通网页搜索
    #[default]
    Web,
    /// 新闻搜索
    News,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SearchType::Web => write!(f, "web"),
            SearchType::News => write!(f, "news"),
        }
    }
}

impl FromStr for SearchType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(SearchType::Web),
            "news" => Ok(SearchType::News),
            _ => Err(()),
        }
    }
}

/// 搜索结果条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 排名（从1开始）
    pub rank: i32,
    /// 标题
    pub title: String,
    /// 结果URL
    pub url: String,
    /// 摘要
    pub snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_type_roundtrip() {
        assert_eq!("web".parse::<SearchType>().unwrap(), SearchType::Web);
        assert_eq!("news".parse::<SearchType>().unwrap(), SearchType::News);
        assert!("images".parse::<SearchType>().is_err());
    }
}
