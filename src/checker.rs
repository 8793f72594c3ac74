//! 即时检查 - 并发拉取各类提醒
//!
//! 六个类别并发请求，各自写入独立的结果字段；任一类别失败或超时只记录警告，
//! 该类别按空处理，不影响其他类别。整批请求共享一个截止时间。

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::time::Duration as StdDuration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::github::{
    Commit, EventSource, Invitation, Issue, ItemState, Notification, PullRequest, WorkflowRun,
};
use crate::history::Category;

/// 每次都会并发请求的类别数，提交检查另计
const INSTANT_CATEGORIES: usize = 6;

/// 整批抓取的默认超时
pub const DEFAULT_FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// 即时检查的结果
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub prs_needing_review: Vec<PullRequest>,
    pub stale_own_prs: Vec<PullRequest>,
    pub assigned_issues: Vec<Issue>,
    pub unread_notifications: Vec<Notification>,
    pub failed_workflows: Vec<WorkflowRun>,
    pub repository_invitations: Vec<Invitation>,
    pub recent_commits: Vec<Commit>,
    /// 本轮抓取失败的类别（已按空处理）
    pub failed_categories: Vec<Category>,
    /// 本轮实际请求的类别数
    pub attempted_categories: usize,
}

impl CheckResult {
    pub fn has_alerts(&self) -> bool {
        self.alert_count() > 0
    }

    pub fn alert_count(&self) -> usize {
        self.prs_needing_review.len()
            + self.stale_own_prs.len()
            + self.assigned_issues.len()
            + self.unread_notifications.len()
            + self.failed_workflows.len()
            + self.repository_invitations.len()
            + self.recent_commits.len()
    }

    /// 请求过的类别全部失败
    pub fn all_categories_failed(&self) -> bool {
        self.attempted_categories > 0 && self.failed_categories.len() >= self.attempted_categories
    }
}

/// 即时检查参数
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// 超过多久没更新的 PR 算 stale
    pub stale_after: Duration,
    /// 是否检查最近的提交
    pub track_commits: bool,
    /// 提交检查的仓库白名单（空 = 全部）
    pub tracked_repositories: Vec<String>,
    /// 提交检查回溯时长
    pub commit_lookback: Duration,
    /// 整批请求超时
    pub timeout: StdDuration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(48),
            track_commits: false,
            tracked_repositories: Vec::new(),
            commit_lookback: Duration::minutes(120),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// 在截止时间内执行单个类别的请求，失败降级为空列表
pub(crate) async fn fetch_category<T, F>(
    category: Category,
    deadline: Instant,
    fetch: F,
) -> Option<Vec<T>>
where
    F: Future<Output = Result<Vec<T>>>,
{
    match timeout_at(deadline, fetch).await {
        Ok(Ok(items)) => {
            debug!(category = %category, count = items.len(), "Fetched category");
            Some(items)
        }
        Ok(Err(e)) => {
            warn!(category = %category, error = %format!("{:#}", e), "Failed to fetch category, treating as empty");
            None
        }
        Err(_) => {
            warn!(category = %category, "Fetch timed out, treating as empty");
            None
        }
    }
}

/// 拉取所有即时提醒
pub async fn fetch_alerts<S>(
    source: &S,
    username: &str,
    options: &CheckOptions,
    now: DateTime<Utc>,
) -> CheckResult
where
    S: EventSource + ?Sized,
{
    let started = Instant::now();
    let deadline = started + options.timeout;

    let (reviews, own_prs, assigned, notifications, invitations, workflows) = tokio::join!(
        fetch_category(Category::ReviewRequest, deadline, source.review_requests(username)),
        fetch_category(
            Category::StalePr,
            deadline,
            source.user_pull_requests(username, ItemState::Open)
        ),
        fetch_category(Category::AssignedIssue, deadline, source.assigned_issues(username)),
        fetch_category(Category::Notification, deadline, source.notifications()),
        fetch_category(Category::Invitation, deadline, source.repository_invitations()),
        fetch_category(Category::Workflow, deadline, source.failed_workflow_runs(username)),
    );

    let mut result = CheckResult {
        attempted_categories: INSTANT_CATEGORIES,
        ..Default::default()
    };
    let mut failed = Vec::new();

    result.prs_needing_review = or_empty(&mut failed, Category::ReviewRequest, reviews);
    result.stale_own_prs = or_empty(&mut failed, Category::StalePr, own_prs)
        .into_iter()
        .filter(|pr| is_stale(pr, options.stale_after, now))
        .collect();
    result.assigned_issues = or_empty(&mut failed, Category::AssignedIssue, assigned);
    result.unread_notifications = or_empty(&mut failed, Category::Notification, notifications)
        .into_iter()
        .filter(|notification| notification.unread)
        .collect();
    result.repository_invitations = or_empty(&mut failed, Category::Invitation, invitations);
    result.failed_workflows = or_empty(&mut failed, Category::Workflow, workflows);

    if options.track_commits && options.commit_lookback > Duration::zero() {
        let since = now - options.commit_lookback;
        debug!(since = %since, "Checking for recent commits");
        let commits = fetch_category(
            Category::Commit,
            deadline,
            source.recent_commits(username, since, &options.tracked_repositories),
        )
        .await;
        result.attempted_categories += 1;
        result.recent_commits = or_empty(&mut failed, Category::Commit, commits);
    }

    result.failed_categories = failed;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Alert fetch completed");
    result
}

fn or_empty<T>(failed: &mut Vec<Category>, category: Category, items: Option<Vec<T>>) -> Vec<T> {
    items.unwrap_or_else(|| {
        failed.push(category);
        Vec::new()
    })
}

/// 非 draft 且超过 `stale_after` 没有更新
pub fn is_stale(pr: &PullRequest, stale_after: Duration, now: DateTime<Utc>) -> bool {
    !pr.is_draft() && now.signed_duration_since(pr.updated_at) > stale_after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSource;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn pr(number: u64, updated_hours_ago: i64, draft: bool) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {}", number),
            updated_at: now() - Duration::hours(updated_hours_ago),
            draft: Some(draft),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_stale() {
        let limit = Duration::hours(48);
        assert!(is_stale(&pr(1, 72, false), limit, now()));
        assert!(!is_stale(&pr(2, 72, true), limit, now()));
        assert!(!is_stale(&pr(3, 12, false), limit, now()));
    }

    #[test]
    fn test_alert_count() {
        let result = CheckResult {
            prs_needing_review: vec![pr(1, 0, false)],
            stale_own_prs: vec![pr(2, 0, false), pr(3, 0, false)],
            ..Default::default()
        };
        assert_eq!(result.alert_count(), 3);
        assert!(result.has_alerts());
        assert!(!CheckResult::default().has_alerts());
    }

    #[tokio::test]
    async fn test_fetch_alerts_filters_stale_and_unread() {
        let source = FakeSource {
            own_prs: vec![pr(1, 72, false), pr(2, 1, false), pr(3, 100, true)],
            notifications: vec![
                Notification {
                    id: "a".to_string(),
                    unread: true,
                    ..Default::default()
                },
                Notification {
                    id: "b".to_string(),
                    unread: false,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let result = fetch_alerts(&source, "octocat", &CheckOptions::default(), now()).await;
        assert_eq!(result.stale_own_prs.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1]);
        assert_eq!(result.unread_notifications.len(), 1);
        assert_eq!(result.unread_notifications[0].id, "a");
        assert!(result.failed_categories.is_empty());
    }

    #[tokio::test]
    async fn test_category_failure_is_isolated() {
        let source = FakeSource {
            reviews: vec![pr(12, 0, false)],
            failing: vec![Category::Notification, Category::Workflow],
            ..Default::default()
        };

        let result = fetch_alerts(&source, "octocat", &CheckOptions::default(), now()).await;
        assert_eq!(result.prs_needing_review.len(), 1);
        assert!(result.unread_notifications.is_empty());
        assert_eq!(
            result.failed_categories,
            vec![Category::Notification, Category::Workflow]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_category_hits_shared_deadline() {
        let source = FakeSource {
            reviews: vec![pr(12, 0, false)],
            assigned: vec![Issue {
                number: 5,
                title: "Bug".to_string(),
                ..Default::default()
            }],
            slow: vec![Category::AssignedIssue],
            ..Default::default()
        };
        let options = CheckOptions {
            timeout: StdDuration::from_secs(30),
            ..Default::default()
        };

        let result = fetch_alerts(&source, "octocat", &options, now()).await;
        assert_eq!(result.prs_needing_review.len(), 1);
        assert!(result.assigned_issues.is_empty());
        assert_eq!(result.failed_categories, vec![Category::AssignedIssue]);
    }

    #[tokio::test]
    async fn test_commits_only_when_enabled() {
        let source = FakeSource {
            commits: vec![Commit {
                sha: "abc1234".to_string(),
                date: now() - Duration::minutes(30),
                ..Default::default()
            }],
            ..Default::default()
        };

        let disabled = fetch_alerts(&source, "octocat", &CheckOptions::default(), now()).await;
        assert!(disabled.recent_commits.is_empty());

        let options = CheckOptions {
            track_commits: true,
            ..Default::default()
        };
        let enabled = fetch_alerts(&source, "octocat", &options, now()).await;
        assert_eq!(enabled.recent_commits.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_counts_only_requested_categories() {
        let failing_but_reviews: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| *c != Category::ReviewRequest)
            .collect();
        let source = FakeSource {
            reviews: vec![pr(12, 0, false)],
            failing: failing_but_reviews,
            ..Default::default()
        };
        let with_commits = CheckOptions {
            track_commits: true,
            ..Default::default()
        };

        // 提交检查开启时共 7 类，6 类失败不算全部失败
        let result = fetch_alerts(&source, "octocat", &with_commits, now()).await;
        assert_eq!(result.attempted_categories, 7);
        assert_eq!(result.failed_categories.len(), 6);
        assert!(!result.all_categories_failed());
        assert_eq!(result.prs_needing_review.len(), 1);

        let everything = FakeSource {
            failing: Category::ALL.to_vec(),
            ..Default::default()
        };
        let result = fetch_alerts(&everything, "octocat", &CheckOptions::default(), now()).await;
        assert_eq!(result.attempted_categories, 6);
        assert!(result.all_categories_failed());
        assert!(!CheckResult::default().all_categories_failed());
    }
}
