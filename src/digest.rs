//! 日报 - 早报列出待处理事项，晚报总结当天完成的工作
//!
//! 时间判断都在配置的时区下进行：本地 19 点之后生成晚报，否则生成早报。

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tokio::time::Instant;
use tracing::debug;

use crate::checker::{fetch_category, DEFAULT_FETCH_TIMEOUT};
use crate::github::{Commit, EventSource, Invitation, Issue, ItemState, PullRequest, WorkflowRun};
use crate::history::Category;

/// 本地时间几点之后算晚上
pub const EVENING_START_HOUR: u32 = 19;

/// 日报类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    /// 早报：需要关注的事项
    Morning,
    /// 晚报：当天完成的事项
    Evening,
}

impl DigestKind {
    /// 根据本地时间决定日报类型
    pub fn for_time(now: DateTime<Utc>, tz: Tz) -> Self {
        if now.with_timezone(&tz).hour() >= EVENING_START_HOUR {
            DigestKind::Evening
        } else {
            DigestKind::Morning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestKind::Morning => "morning",
            DigestKind::Evening => "evening",
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(DigestKind::Morning),
            "evening" => Ok(DigestKind::Evening),
            other => bail!("unknown digest type '{}', expected 'morning' or 'evening'", other),
        }
    }
}

/// 日报参数
#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// 是否统计所有仓库的提交
    pub track_all_commits: bool,
    /// 整批请求超时
    pub timeout: StdDuration,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            track_all_commits: true,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// 日报内容
#[derive(Debug, Clone)]
pub struct DailyDigest {
    pub kind: DigestKind,
    /// 本地日期
    pub date: NaiveDate,
    // 晚报
    pub prs_opened: Vec<PullRequest>,
    pub prs_merged: Vec<PullRequest>,
    pub issues_opened: Vec<Issue>,
    pub issues_closed: Vec<Issue>,
    // 早报
    pub pending_reviews: Vec<PullRequest>,
    pub assigned_issues: Vec<Issue>,
    pub repository_invitations: Vec<Invitation>,
    // 两者都有
    pub commits: Vec<Commit>,
    pub failed_workflows: Vec<WorkflowRun>,
    /// 抓取失败的类别
    pub failed_categories: Vec<Category>,
}

impl DailyDigest {
    fn empty(kind: DigestKind, date: NaiveDate) -> Self {
        Self {
            kind,
            date,
            prs_opened: Vec::new(),
            prs_merged: Vec::new(),
            issues_opened: Vec::new(),
            issues_closed: Vec::new(),
            pending_reviews: Vec::new(),
            assigned_issues: Vec::new(),
            repository_invitations: Vec::new(),
            commits: Vec::new(),
            failed_workflows: Vec::new(),
            failed_categories: Vec::new(),
        }
    }

    fn take<T>(&mut self, category: Category, items: Option<Vec<T>>) -> Vec<T> {
        items.unwrap_or_else(|| {
            if !self.failed_categories.contains(&category) {
                self.failed_categories.push(category);
            }
            Vec::new()
        })
    }
}

/// 本地当天零点（UTC 表示）
pub fn start_of_local_day(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    now.with_timezone(&tz)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now - Duration::hours(24))
}

/// 今天是否还需要发日报：上次发送不是今天，且已过设定时间
pub fn should_run_daily(now: DateTime<Utc>, last_run: DateTime<Utc>, at: NaiveTime, tz: Tz) -> bool {
    let local_now = now.with_timezone(&tz);
    let last_local = last_run.with_timezone(&tz);
    last_local.date_naive() != local_now.date_naive() && local_now.time() > at
}

/// 生成日报
pub async fn generate_digest<S>(
    source: &S,
    username: &str,
    kind: DigestKind,
    options: &DigestOptions,
    now: DateTime<Utc>,
    tz: Tz,
) -> DailyDigest
where
    S: EventSource + ?Sized,
{
    let started = Instant::now();
    let deadline = started + options.timeout;
    let date = now.with_timezone(&tz).date_naive();
    let mut digest = DailyDigest::empty(kind, date);

    match kind {
        DigestKind::Evening => {
            let start_of_day = start_of_local_day(now, tz);
            let (prs, issues, commits, workflows) = tokio::join!(
                fetch_category(
                    Category::StalePr,
                    deadline,
                    source.user_pull_requests(username, ItemState::All)
                ),
                fetch_category(Category::AssignedIssue, deadline, source.user_issues(username)),
                fetch_commits(source, username, start_of_day, options, deadline),
                fetch_category(Category::Workflow, deadline, source.failed_workflow_runs(username)),
            );

            let prs = digest.take(Category::StalePr, prs);
            digest.prs_opened = prs.iter().filter(|pr| pr.created_at >= start_of_day).cloned().collect();
            digest.prs_merged = prs
                .into_iter()
                .filter(|pr| pr.merged_at().is_some_and(|merged| merged >= start_of_day))
                .collect();

            let issues = digest.take(Category::AssignedIssue, issues);
            digest.issues_opened = issues
                .iter()
                .filter(|issue| issue.created_at >= start_of_day)
                .cloned()
                .collect();
            digest.issues_closed = issues
                .into_iter()
                .filter(|issue| {
                    issue.state == "closed"
                        && issue.closed_at.unwrap_or(issue.updated_at) >= start_of_day
                })
                .collect();

            digest.commits = digest.take(Category::Commit, commits);
            digest.failed_workflows = digest.take(Category::Workflow, workflows);
        }
        DigestKind::Morning => {
            let since = now - Duration::days(1);
            let (reviews, assigned, invitations, commits, workflows) = tokio::join!(
                fetch_category(Category::ReviewRequest, deadline, source.review_requests(username)),
                fetch_category(Category::AssignedIssue, deadline, source.assigned_issues(username)),
                fetch_category(Category::Invitation, deadline, source.repository_invitations()),
                fetch_commits(source, username, since, options, deadline),
                fetch_category(Category::Workflow, deadline, source.failed_workflow_runs(username)),
            );

            digest.pending_reviews = digest.take(Category::ReviewRequest, reviews);
            digest.assigned_issues = digest.take(Category::AssignedIssue, assigned);
            digest.repository_invitations = digest
                .take(Category::Invitation, invitations)
                .into_iter()
                .filter(|invitation| !invitation.is_expired(now))
                .collect();
            digest.commits = digest.take(Category::Commit, commits);
            digest.failed_workflows = digest.take(Category::Workflow, workflows);
        }
    }

    debug!(
        kind = %kind,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Daily digest generated"
    );
    digest
}

/// 统计提交（功能关闭时直接返回空）
async fn fetch_commits<S>(
    source: &S,
    username: &str,
    since: DateTime<Utc>,
    options: &DigestOptions,
    deadline: Instant,
) -> Option<Vec<Commit>>
where
    S: EventSource + ?Sized,
{
    if !options.track_all_commits {
        return Some(Vec::new());
    }
    fetch_category(Category::Commit, deadline, source.recent_commits(username, since, &[])).await
}
