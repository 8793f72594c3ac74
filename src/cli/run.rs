//! Run 命令 - 执行一次检查（默认命令）

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::digest::DigestKind;
use crate::github::GitHubClient;
use crate::notification::{DiscordWebhook, Dispatcher, WebhookConfig};
use crate::runner::{RunOptions, RunReport, Runner};

/// Run 命令参数
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// 忽略检查间隔，立即执行即时检查
    #[arg(long)]
    pub force_check: bool,

    /// 忽略每日一次的限制，立即发送日报
    #[arg(long)]
    pub force_digest: bool,

    /// 只打印消息，不发送也不写历史文件
    #[arg(long)]
    pub dry_run: bool,

    /// 日报类型: morning, evening（覆盖 CHECK_TYPE）
    #[arg(long)]
    pub digest: Option<DigestKind>,

    /// 历史文件路径（覆盖 CACHE_FILE）
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// GitHub 用户名（覆盖 GITHUB_USERNAME）
    #[arg(long)]
    pub username: Option<String>,
}

impl RunArgs {
    /// 命令行参数覆盖环境变量
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(path) = &self.cache_file {
            config = config.with_cache_file(path.clone());
        }
        if let Some(username) = &self.username {
            config = config.with_username(username);
        }
        if let Some(kind) = self.digest {
            config = config.with_check_type(kind);
        }
        config
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            force_check: self.force_check,
            force_digest: self.force_digest,
        }
    }
}

/// 处理 run 命令
pub async fn handle_run(args: RunArgs) -> Result<RunReport> {
    let config = args.apply(Config::from_env()?);

    let source = GitHubClient::with_base_url(&config.github_token, &config.github_api_url)?;
    let webhook = DiscordWebhook::new(WebhookConfig::new(&config.discord_webhook))?;
    let dispatcher = Dispatcher::new(Arc::new(webhook)).with_dry_run(args.dry_run);

    Runner::new(config, Arc::new(source), dispatcher)
        .with_options(args.options())
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::from_lookup(|key| match key {
            "GITHUB_TOKEN" => Some("t".to_string()),
            "DISCORD_WEBHOOK" => Some("w".to_string()),
            "CACHE_FILE" => Some("env.json".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_flags_override_env() {
        let args = RunArgs {
            cache_file: Some(PathBuf::from("cli.json")),
            digest: Some(DigestKind::Evening),
            ..Default::default()
        };
        let config = args.apply(base_config());

        assert_eq!(config.cache_file, PathBuf::from("cli.json"));
        assert_eq!(config.check_type, Some(DigestKind::Evening));
        assert_eq!(config.username, None);
    }

    #[test]
    fn test_no_flags_keep_env() {
        let config = RunArgs::default().apply(base_config());
        assert_eq!(config.cache_file, PathBuf::from("env.json"));
    }

    #[test]
    fn test_options() {
        let args = RunArgs {
            force_digest: true,
            ..Default::default()
        };
        let options = args.options();
        assert!(options.force_digest);
        assert!(!options.force_check);
    }
}
