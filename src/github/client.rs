//! GitHub REST 客户端
//!
//! 使用静态 token 认证，不做重试；单个请求超时 30 秒。

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use super::models::{CommitResponse, Repo};
use super::{Commit, EventSource, Invitation, Issue, ItemState, Notification, PullRequest, User, WorkflowRun};

/// GitHub API 默认地址
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// 请求超时（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 检查 workflow 的仓库数量上限（避免触发限流）
const MAX_WORKFLOW_REPOS: usize = 5;

/// 每个仓库取最近几次失败的 run
const WORKFLOW_RUNS_PER_REPO: u32 = 3;

/// 只关心最近几天的失败
const WORKFLOW_LOOKBACK_DAYS: i64 = 3;

/// 缺少 notifications 权限时 GitHub 返回的消息
const MISSING_PERMISSION_MESSAGE: &str = "Resource not accessible by personal access token";

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// GitHub 客户端
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    /// 创建客户端
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    /// 创建客户端（自定义 API 地址，用于 GHE 或测试）
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("gh-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// 发送 GET 请求并解析 JSON，非 2xx 状态转换为错误
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GitHub request");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", path))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        serde_json::from_str(&body).with_context(|| format!("failed to decode response from {}", path))
    }

    async fn search<T: DeserializeOwned>(&self, query: String) -> Result<Vec<T>> {
        let response: SearchResponse<T> = self.get_json("/search/issues", &[("q", query)]).await?;
        Ok(response.items)
    }

    /// 用户的仓库，按更新时间排序
    pub async fn user_repositories(&self, username: &str) -> Result<Vec<Repo>> {
        self.get_json(
            &format!("/users/{}/repos", username),
            &[
                ("type", "all".to_string()),
                ("sort", "updated".to_string()),
                ("per_page", "100".to_string()),
            ],
        )
        .await
        .context("failed to get user repositories")
    }

    /// 某个仓库 `since` 之后的提交
    pub async fn repo_commits(&self, repo: &Repo, since: DateTime<Utc>) -> Result<Vec<Commit>> {
        let responses: Vec<CommitResponse> = self
            .get_json(
                &format!("/repos/{}/commits", repo.full_name),
                &[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))],
            )
            .await?;

        Ok(responses
            .into_iter()
            .map(|response| response.into_commit(repo.clone()))
            .collect())
    }

    async fn repo_failed_runs(&self, repo: &Repo, cutoff: DateTime<Utc>) -> Result<Vec<WorkflowRun>> {
        let response: WorkflowRunsResponse = self
            .get_json(
                &format!("/repos/{}/actions/runs", repo.full_name),
                &[
                    ("status", "failure".to_string()),
                    ("per_page", WORKFLOW_RUNS_PER_REPO.to_string()),
                ],
            )
            .await?;

        Ok(response
            .workflow_runs
            .into_iter()
            .filter(|run| run.is_failure() && run.created_at > cutoff)
            .map(|run| WorkflowRun {
                repository: repo.clone(),
                ..run
            })
            .collect())
    }
}

/// 把错误响应转换为可读的错误
fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) if status == StatusCode::FORBIDDEN && error.message == MISSING_PERMISSION_MESSAGE => {
            anyhow!("GitHub token missing 'notifications' permission, regenerate it with the required scopes")
        }
        Ok(error) => anyhow!("GitHub API error: {} (status: {})", error.message, status.as_u16()),
        Err(_) => anyhow!("GitHub API error: status {}", status.as_u16()),
    }
}

/// 仓库是否在白名单内（白名单为空表示全部）
fn is_tracked(repo: &Repo, tracked: &[String]) -> bool {
    tracked.is_empty()
        || tracked
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&repo.full_name) || name.eq_ignore_ascii_case(&repo.name))
}

#[async_trait]
impl EventSource for GitHubClient {
    async fn current_user(&self) -> Result<User> {
        self.get_json("/user", &[]).await.context("failed to get current user")
    }

    async fn review_requests(&self, username: &str) -> Result<Vec<PullRequest>> {
        self.search(format!("type:pr review-requested:{} state:open", username))
            .await
            .context("failed to get review requests")
    }

    async fn user_pull_requests(&self, username: &str, state: ItemState) -> Result<Vec<PullRequest>> {
        let query = match state {
            ItemState::Open => format!("type:pr author:{} state:open", username),
            ItemState::All => format!("type:pr author:{}", username),
        };
        self.search(query).await.context("failed to get pull requests")
    }

    async fn assigned_issues(&self, username: &str) -> Result<Vec<Issue>> {
        self.search(format!("type:issue assignee:{} state:open", username))
            .await
            .context("failed to get assigned issues")
    }

    async fn user_issues(&self, username: &str) -> Result<Vec<Issue>> {
        self.search(format!("type:issue author:{}", username))
            .await
            .context("failed to get user issues")
    }

    async fn notifications(&self) -> Result<Vec<Notification>> {
        self.get_json(
            "/notifications",
            &[("all", "false".to_string()), ("participating", "false".to_string())],
        )
        .await
        .context("failed to get notifications")
    }

    async fn repository_invitations(&self) -> Result<Vec<Invitation>> {
        self.get_json("/user/repository_invitations", &[])
            .await
            .context("failed to get repository invitations")
    }

    async fn failed_workflow_runs(&self, username: &str) -> Result<Vec<WorkflowRun>> {
        let repos = self.user_repositories(username).await?;
        let cutoff = Utc::now() - Duration::days(WORKFLOW_LOOKBACK_DAYS);

        let mut failed = Vec::new();
        for repo in repos
            .iter()
            .filter(|repo| !repo.archived && !repo.fork && !repo.private)
            .take(MAX_WORKFLOW_REPOS)
        {
            match self.repo_failed_runs(repo, cutoff).await {
                Ok(runs) => failed.extend(runs),
                // 没有 Actions 权限的仓库（403/404）直接跳过
                Err(e) => debug!(repo = %repo.full_name, error = %e, "Skipping workflow runs"),
            }
        }

        Ok(failed)
    }

    async fn recent_commits(
        &self,
        username: &str,
        since: DateTime<Utc>,
        tracked: &[String],
    ) -> Result<Vec<Commit>> {
        let repos = self.user_repositories(username).await?;

        let mut commits = Vec::new();
        for repo in repos
            .iter()
            .filter(|repo| !repo.archived && !repo.fork && is_tracked(repo, tracked))
        {
            match self.repo_commits(repo, since).await {
                Ok(repo_commits) => commits.extend(
                    repo_commits
                        .into_iter()
                        .filter(|commit| commit.author.login.eq_ignore_ascii_case(username)),
                ),
                Err(e) => warn!(repo = %repo.full_name, error = %e, "Failed to get commits"),
            }
        }

        Ok(commits)
    }
}
