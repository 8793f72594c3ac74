//! 通知分发器 - 包装渠道，支持 dry-run

use std::sync::Arc;
use tracing::{info, warn};

use super::channel::{NotificationSink, SendResult};
use super::formatter::format_error_message;
use super::message::DiscordMessage;

/// 通知分发器
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl Dispatcher {
    /// 创建新的分发器
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 发送消息，错误转换为 `SendResult::Failed`
    pub async fn send(&self, message: &DiscordMessage) -> SendResult {
        let name = self.sink.name();

        if self.dry_run {
            eprintln!("[DRY-RUN] Would send to channel: {}", name);
            if let Ok(json) = serde_json::to_string_pretty(message) {
                eprintln!("{}", json);
            }
            return SendResult::Skipped("dry-run".to_string());
        }

        match self.sink.send(message).await {
            Ok(result) => {
                if result.is_sent() {
                    info!(channel = %name, embeds = message.embeds.len(), "Message delivered");
                }
                result
            }
            Err(e) => {
                warn!(channel = %name, error = %format!("{:#}", e), "Channel send failed");
                SendResult::Failed(format!("{:#}", e))
            }
        }
    }

    /// 发送纯文本
    pub async fn send_text(&self, content: impl Into<String>) -> SendResult {
        self.send(&DiscordMessage::text(content)).await
    }

    /// 尽力发送错误提示，失败只记日志
    pub async fn notify_error(&self, error: &anyhow::Error) {
        let result = self.send_text(format_error_message(&format!("{:#}", error))).await;
        if let SendResult::Failed(reason) = result {
            warn!(reason = %reason, "Failed to deliver error notification");
        }
    }
}
