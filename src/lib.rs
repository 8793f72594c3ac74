//! GitHub Notifier - 轮询 GitHub 事件，去重后推送到 Discord

pub mod checker;
pub mod cli;
pub mod config;
pub mod digest;
pub mod github;
pub mod history;
pub mod notification;
pub mod runner;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use checker::{fetch_alerts, CheckOptions, CheckResult};
pub use config::Config;
pub use digest::{generate_digest, should_run_daily, DailyDigest, DigestKind, DigestOptions};
pub use github::{EventSource, GitHubClient, ItemState};
pub use history::{
    reconcile_alerts, reconcile_category, Category, CooldownPolicy, Cooldowns, HistoryStore,
    NotificationKey, Reconciliation,
};
pub use notification::{Dispatcher, DiscordMessage, DiscordWebhook, NotificationSink, SendResult};
pub use runner::{RunOptions, RunReport, Runner};
