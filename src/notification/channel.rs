//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;

use super::message::DiscordMessage;

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（dry-run 或没有内容）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// 通知渠道 trait
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发送消息；网络或服务端错误返回 `Err`
    async fn send(&self, message: &DiscordMessage) -> Result<SendResult>;
}
