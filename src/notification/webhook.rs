//! Discord Webhook 客户端
//!
//! 把 `DiscordMessage` 以 JSON POST 到 webhook 地址，HTTP 状态码 >= 400 视为失败。

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::channel::{NotificationSink, SendResult};
use super::message::DiscordMessage;

/// Webhook 客户端配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook 地址
    pub url: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Discord Webhook 渠道
#[derive(Debug)]
pub struct DiscordWebhook {
    client: Client,
    config: WebhookConfig,
}

impl DiscordWebhook {
    /// 创建新的 Webhook 客户端
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            bail!("discord webhook URL is not configured");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &DiscordMessage) -> Result<SendResult> {
        let response = self
            .client
            .post(&self.config.url)
            .json(message)
            .send()
            .await
            .context("failed to send message")?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "Discord rejected message");
            bail!("discord API error: {}", status);
        }

        Ok(SendResult::Sent)
    }
}
