//! 通知层 - Discord 消息格式化和投递
//!
//! # 使用示例
//! ```ignore
//! use gh_notifier::notification::{DiscordWebhook, Dispatcher, WebhookConfig};
//!
//! let webhook = DiscordWebhook::new(WebhookConfig::new(url))?;
//! let dispatcher = Dispatcher::new(Arc::new(webhook)).with_dry_run(true);
//! dispatcher.send_text("hello").await;
//! ```

pub mod channel;
pub mod dispatcher;
pub mod formatter;
pub mod message;
pub mod webhook;

pub use channel::{NotificationSink, SendResult};
pub use dispatcher::Dispatcher;
pub use formatter::{
    format_commit_notification, format_daily_digest, format_error_message, format_instant_alert,
    notification_icon, CommitDetails,
};
pub use message::{DiscordMessage, Embed, Field};
pub use webhook::{DiscordWebhook, WebhookConfig};
