// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::search_result::{SearchResult, SearchType};
use crate::utils::errors::PipelineError;
use async_trait::async_trait;

/// 搜索提供商特质
///
/// 第三方搜索服务是外部协作方，这里只约定接口；
/// 排名从1开始且不超过请求的结果数
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// 执行一次搜索
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        search_type: SearchType,
    ) -> Result<Vec<SearchResult>, PipelineError>;
}
