//! 单次运行 - 由外部调度器周期性触发
//!
//! 流程：加载历史 → 确定用户 → 按需执行即时检查和日报 → 清理过期记录 → 保存。
//! 只有配置错误和历史文件损坏会中止运行，其余失败都降级为警告。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checker::{fetch_alerts, CheckOptions};
use crate::config::Config;
use crate::digest::{generate_digest, should_run_daily, DigestKind, DigestOptions};
use crate::github::EventSource;
use crate::history::{reconcile_alerts, Category, Cooldowns, HistoryStore};
use crate::notification::{format_daily_digest, format_instant_alert, Dispatcher, SendResult};

/// 运行选项（来自命令行）
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// 忽略检查间隔，强制即时检查
    pub force_check: bool,
    /// 忽略每日一次的限制，强制发送日报
    pub force_digest: bool,
}

/// 本次运行做了什么
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub username: String,
    /// 是否执行了即时检查
    pub checked: bool,
    /// 对账后新放行的提醒数
    pub new_alerts: usize,
    /// 即时提醒是否投递成功
    pub alert_delivered: bool,
    /// 生成的日报类型
    pub digest: Option<DigestKind>,
    pub digest_delivered: bool,
    /// 清理掉的历史记录数
    pub pruned: usize,
    /// 历史文件是否写回
    pub saved: bool,
}

/// 单次运行的执行器
pub struct Runner {
    config: Config,
    source: Arc<dyn EventSource>,
    dispatcher: Dispatcher,
    options: RunOptions,
}

impl Runner {
    pub fn new(config: Config, source: Arc<dyn EventSource>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            source,
            dispatcher,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// 执行一次
    pub async fn run(&self) -> Result<RunReport> {
        self.run_at(Utc::now()).await
    }

    /// 执行一次（指定当前时间，用于测试）
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let path = &self.config.cache_file;
        let mut store = HistoryStore::load(path)?;
        let username = self.resolve_username().await?;

        let mut report = RunReport {
            username: username.clone(),
            ..Default::default()
        };

        let run_instant =
            self.options.force_check || now.signed_duration_since(store.last_check()) >= self.config.check_interval;
        let run_daily = self.options.force_digest
            || should_run_daily(
                now,
                store.last_daily_report(),
                self.config.daily_report_time,
                self.config.timezone,
            );
        info!(user = %username, instant = run_instant, daily = run_daily, "Running GitHub Notifier");

        if run_instant {
            self.run_instant_check(&mut store, &username, now, &mut report).await;
            store.record_check(now);
        }

        if run_daily {
            let kind = self.digest_kind(now);
            report.digest = Some(kind);
            report.digest_delivered = self.run_daily_digest(&username, kind, now).await;
            if report.digest_delivered || self.dispatcher.is_dry_run() {
                store.record_daily_report(now);
            }
        }

        report.pruned = store.prune_at(self.config.history_retention, now);
        if report.pruned > 0 {
            debug!(pruned = report.pruned, "Pruned old history entries");
        }

        if self.dispatcher.is_dry_run() {
            info!("Dry run, history not saved");
        } else if store.is_dirty() {
            match store.save(path) {
                Ok(()) => report.saved = true,
                Err(e) => warn!(path = %path.display(), error = %format!("{:#}", e), "Failed to save history"),
            }
        }

        info!("GitHub Notifier completed");
        Ok(report)
    }

    async fn resolve_username(&self) -> Result<String> {
        if let Some(username) = &self.config.username {
            return Ok(username.clone());
        }
        let user = self
            .source
            .current_user()
            .await
            .context("Failed to get current user")?;
        Ok(user.login)
    }

    fn digest_kind(&self, now: DateTime<Utc>) -> DigestKind {
        self.config
            .check_type
            .unwrap_or_else(|| DigestKind::for_time(now, self.config.timezone))
    }

    fn cooldowns(&self) -> Cooldowns {
        if self.config.workflow_alert_once {
            Cooldowns::new(self.config.alert_cooldown)
        } else {
            Cooldowns::shared_workflow(self.config.alert_cooldown)
        }
    }

    fn check_options(&self) -> CheckOptions {
        CheckOptions {
            stale_after: self.config.stale_pr_age,
            track_commits: self.config.track_commits_realtime,
            tracked_repositories: self.config.tracked_repositories.clone(),
            commit_lookback: self.config.commit_lookback,
            ..Default::default()
        }
    }

    /// 即时检查：对账在副本上进行，投递成功后才写回
    async fn run_instant_check(
        &self,
        store: &mut HistoryStore,
        username: &str,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        report.checked = true;
        let fetched = fetch_alerts(self.source.as_ref(), username, &self.check_options(), now).await;

        if fetched.all_categories_failed() {
            let error = anyhow::anyhow!(
                "failed to check for alerts: every category failed ({})",
                join_categories(&fetched.failed_categories)
            );
            warn!(error = %error, "Instant check failed");
            self.dispatcher.notify_error(&error).await;
            return;
        }

        if !fetched.has_alerts() {
            info!("No alerts found");
            return;
        }

        let mut staged = store.clone();
        let reconciliation = reconcile_alerts(&mut staged, fetched, &self.cooldowns(), now);
        if !reconciliation.any_new {
            info!("No new alerts since last notification");
            return;
        }
        report.new_alerts = reconciliation.alerts.alert_count();

        let Some(message) = format_instant_alert(&reconciliation.alerts, now) else {
            // 只剩已过期的邀请，记录下来避免反复对账
            *store = staged;
            return;
        };

        match self.dispatcher.send(&message).await {
            SendResult::Sent => {
                info!(count = report.new_alerts, "Sent instant alert");
                report.alert_delivered = true;
                *store = staged;
            }
            SendResult::Skipped(reason) => {
                info!(reason = %reason, count = report.new_alerts, "Instant alert not delivered");
            }
            SendResult::Failed(reason) => {
                warn!(reason = %reason, "Failed to deliver instant alert, will retry next run");
                let error = anyhow::anyhow!("failed to send Discord message: {}", reason);
                self.dispatcher.notify_error(&error).await;
            }
        }
    }

    /// 日报：返回是否投递成功
    async fn run_daily_digest(&self, username: &str, kind: DigestKind, now: DateTime<Utc>) -> bool {
        let options = DigestOptions {
            track_all_commits: self.config.track_all_commits,
            ..Default::default()
        };
        let digest = generate_digest(
            self.source.as_ref(),
            username,
            kind,
            &options,
            now,
            self.config.timezone,
        )
        .await;

        if !digest.failed_categories.is_empty() {
            warn!(
                categories = %join_categories(&digest.failed_categories),
                "Daily digest is missing some categories"
            );
        }

        let message = format_daily_digest(&digest, username, now);
        match self.dispatcher.send(&message).await {
            SendResult::Sent => {
                info!(kind = %kind, "Sent daily digest");
                true
            }
            SendResult::Skipped(reason) => {
                info!(kind = %kind, reason = %reason, "Daily digest not delivered");
                false
            }
            SendResult::Failed(reason) => {
                warn!(kind = %kind, reason = %reason, "Failed to deliver daily digest");
                let error = anyhow::anyhow!("failed to send daily digest: {}", reason);
                self.dispatcher.notify_error(&error).await;
                false
            }
        }
    }
}

fn join_categories(categories: &[Category]) -> String {
    categories
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
