// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tokio::sync::watch;

/// Worker trait定义
///
/// 所有后台工作器都必须实现此trait；shutdown翻转为true后
/// 工作器应在当前工作单元结束时退出
#[async_trait]
pub trait Worker: Send + Sync {
    /// 运行工作器直至收到关闭信号
    async fn run(&self, shutdown: watch::Receiver<bool>);

    /// 获取工作器名称
    fn name(&self) -> &str;
}
