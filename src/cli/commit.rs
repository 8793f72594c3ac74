//! Commit 命令 - 在 CI 中推送单条提交通知
//!
//! 参数默认从 GitHub Actions 的环境变量读取。与 run 不同，投递失败会让命令以非零状态退出。

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::notification::{
    format_commit_notification, CommitDetails, DiscordWebhook, Dispatcher, SendResult, WebhookConfig,
};

/// Commit 命令参数
#[derive(Args, Debug, Default, Clone)]
pub struct CommitArgs {
    /// 提交 SHA
    #[arg(long, env = "GITHUB_SHA", default_value = "")]
    pub sha: String,

    /// 提交信息
    #[arg(long, env = "COMMIT_MESSAGE", default_value = "")]
    pub message: String,

    /// 作者
    #[arg(long, env = "COMMIT_AUTHOR", default_value = "")]
    pub author: String,

    /// 仓库全名 (owner/name)
    #[arg(long, env = "GITHUB_REPOSITORY", default_value = "")]
    pub repository: String,

    /// 提交链接
    #[arg(long, env = "COMMIT_URL", default_value = "")]
    pub commit_url: String,

    /// 仓库链接
    #[arg(long, env = "REPO_URL", default_value = "")]
    pub repo_url: String,

    /// 作者头像
    #[arg(long, env = "COMMIT_AUTHOR_AVATAR")]
    pub avatar_url: Option<String>,

    /// Discord webhook 地址
    #[arg(long, env = "DISCORD_WEBHOOK", hide_env_values = true)]
    pub webhook: Option<String>,

    /// 只打印不发送
    #[arg(long)]
    pub dry_run: bool,
}

impl CommitArgs {
    pub fn details(&self) -> CommitDetails {
        CommitDetails {
            sha: self.sha.clone(),
            message: self.message.clone(),
            author: self.author.clone(),
            repository: self.repository.clone(),
            commit_url: self.commit_url.clone(),
            repo_url: self.repo_url.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// 处理 commit 命令
pub async fn handle_commit(args: CommitArgs) -> Result<()> {
    let url = args
        .webhook
        .clone()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow!("DISCORD_WEBHOOK environment variable is required"))?;
    let webhook = DiscordWebhook::new(WebhookConfig::new(url))?;
    let dispatcher = Dispatcher::new(Arc::new(webhook)).with_dry_run(args.dry_run);

    deliver_commit(&args, &dispatcher, Utc::now()).await?;
    Ok(())
}

/// 格式化并投递，失败返回错误
pub async fn deliver_commit(args: &CommitArgs, dispatcher: &Dispatcher, now: DateTime<Utc>) -> Result<SendResult> {
    let message = format_commit_notification(&args.details(), now);
    match dispatcher.send(&message).await {
        SendResult::Failed(reason) => bail!("Failed to send commit notification: {}", reason),
        result => {
            info!(sha = %args.sha, repository = %args.repository, "Commit notification handled");
            Ok(result)
        }
    }
}
