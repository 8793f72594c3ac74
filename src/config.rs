//! 配置 - 从环境变量读取
//!
//! 必填：`GITHUB_TOKEN`、`DISCORD_WEBHOOK`。其余变量缺省或为空时使用默认值；
//! 布尔和整数解析失败时回退到默认值，时长和时间格式错误则报错。

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::digest::DigestKind;
use crate::github::DEFAULT_API_URL;

pub const DEFAULT_CHECK_INTERVAL: &str = "5m";
pub const DEFAULT_DAILY_REPORT_TIME: &str = "09:00";
pub const DEFAULT_CACHE_FILE: &str = "cache.json";
pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";
pub const DEFAULT_COMMIT_LOOKBACK_MINUTES: i64 = 120;
pub const DEFAULT_ALERT_COOLDOWN: &str = "24h";
pub const DEFAULT_HISTORY_RETENTION: &str = "7d";
pub const DEFAULT_STALE_PR_AGE: &str = "48h";

/// 运行配置
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub discord_webhook: String,
    /// 为空时通过 API 查询当前用户
    pub username: Option<String>,
    /// 两次即时检查的最小间隔
    pub check_interval: Duration,
    /// 日报时间（本地时区）
    pub daily_report_time: NaiveTime,
    pub cache_file: PathBuf,
    pub timezone: Tz,
    /// 日报统计所有仓库的提交
    pub track_all_commits: bool,
    /// 即时检查包含新提交
    pub track_commits_realtime: bool,
    /// 提交检查的仓库白名单（空 = 全部）
    pub tracked_repositories: Vec<String>,
    pub commit_lookback: Duration,
    /// 同一提醒的重复间隔
    pub alert_cooldown: Duration,
    /// 失败的 workflow 只提醒一次；关闭后与其他类别共用 `alert_cooldown`
    pub workflow_alert_once: bool,
    /// 历史记录保留时长
    pub history_retention: Duration,
    pub stale_pr_age: Duration,
    /// 强制日报类型
    pub check_type: Option<DigestKind>,
    pub github_api_url: String,
}

impl Config {
    /// 从进程环境读取
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意 key-value 来源读取（测试用）
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let github_token = get("GITHUB_TOKEN")
            .ok_or_else(|| anyhow!("GITHUB_TOKEN environment variable is required"))?;
        let discord_webhook = get("DISCORD_WEBHOOK")
            .ok_or_else(|| anyhow!("DISCORD_WEBHOOK environment variable is required"))?;

        let check_type = get("CHECK_TYPE")
            .map(|v| v.parse::<DigestKind>())
            .transpose()
            .context("invalid CHECK_TYPE")?;

        let commit_lookback_minutes = get("COMMIT_LOOKBACK_MINUTES")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_COMMIT_LOOKBACK_MINUTES);

        Ok(Self {
            github_token,
            discord_webhook,
            username: get("GITHUB_USERNAME"),
            check_interval: parse_duration("CHECK_INTERVAL", &get_or("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL))?,
            daily_report_time: parse_time_of_day(&get_or("DAILY_REPORT_TIME", DEFAULT_DAILY_REPORT_TIME))?,
            cache_file: PathBuf::from(get_or("CACHE_FILE", DEFAULT_CACHE_FILE)),
            timezone: parse_timezone(&get_or("TIMEZONE", DEFAULT_TIMEZONE))?,
            track_all_commits: parse_bool(get("TRACK_ALL_COMMITS").as_deref(), true),
            track_commits_realtime: parse_bool(get("TRACK_COMMITS_REALTIME").as_deref(), false),
            tracked_repositories: parse_list(get("TRACKED_REPOSITORIES").as_deref()),
            commit_lookback: Duration::minutes(commit_lookback_minutes),
            alert_cooldown: parse_duration("ALERT_COOLDOWN", &get_or("ALERT_COOLDOWN", DEFAULT_ALERT_COOLDOWN))?,
            workflow_alert_once: parse_bool(get("WORKFLOW_ALERT_ONCE").as_deref(), true),
            history_retention: parse_duration(
                "HISTORY_RETENTION",
                &get_or("HISTORY_RETENTION", DEFAULT_HISTORY_RETENTION),
            )?,
            stale_pr_age: parse_duration("STALE_PR_AGE", &get_or("STALE_PR_AGE", DEFAULT_STALE_PR_AGE))?,
            check_type,
            github_api_url: get_or("GITHUB_API_URL", DEFAULT_API_URL),
        })
    }

    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = path.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_check_type(mut self, kind: DigestKind) -> Self {
        self.check_type = Some(kind);
        self
    }
}

/// humantime 格式的时长，如 `5m`、`24h`、`7d`
pub fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let std = humantime::parse_duration(value)
        .with_context(|| format!("invalid {} '{}', expected a duration like 5m or 24h", key, value))?;
    Duration::from_std(std).with_context(|| format!("{} '{}' is out of range", key, value))
}

/// `HH:MM`
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("invalid DAILY_REPORT_TIME '{}', expected HH:MM", value))
}

pub fn parse_timezone(value: &str) -> Result<Tz> {
    match value.parse::<Tz>() {
        Ok(tz) => Ok(tz),
        Err(e) => bail!("invalid TIMEZONE '{}': {}", value, e),
    }
}

/// 与 Go 的 strconv.ParseBool 接受的写法一致，无法识别时返回默认值
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some("1" | "t" | "T" | "true" | "TRUE" | "True") => true,
        Some("0" | "f" | "F" | "false" | "FALSE" | "False") => false,
        _ => default,
    }
}

/// 逗号分隔列表，去掉空白项
pub fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
