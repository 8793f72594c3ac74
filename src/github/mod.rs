//! GitHub 事件源 - 拉取 PR、issue、通知、workflow、邀请和提交

pub mod client;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use client::{GitHubClient, DEFAULT_API_URL};
pub use models::{Commit, Invitation, Issue, Notification, PullRequest, Repo, User, WorkflowRun};

/// 搜索时的状态过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// 只要 open
    Open,
    /// 不限状态
    All,
}

/// 事件源抽象
///
/// 每个方法对应一个类别，可能单独失败；调用方负责把失败降级为空列表。
#[async_trait]
pub trait EventSource: Send + Sync {
    /// 当前 token 对应的用户
    async fn current_user(&self) -> Result<User>;

    /// 请求我 review 的 open PR
    async fn review_requests(&self, username: &str) -> Result<Vec<PullRequest>>;

    /// 我创建的 PR
    async fn user_pull_requests(&self, username: &str, state: ItemState) -> Result<Vec<PullRequest>>;

    /// 分配给我的 open issue
    async fn assigned_issues(&self, username: &str) -> Result<Vec<Issue>>;

    /// 我创建的 issue（不限状态）
    async fn user_issues(&self, username: &str) -> Result<Vec<Issue>>;

    /// 通知列表（包含已读，调用方自行过滤）
    async fn notifications(&self) -> Result<Vec<Notification>>;

    /// 待接受的仓库邀请
    async fn repository_invitations(&self) -> Result<Vec<Invitation>>;

    /// 最近失败的 workflow run
    async fn failed_workflow_runs(&self, username: &str) -> Result<Vec<WorkflowRun>>;

    /// `since` 之后我推送的提交；`tracked` 为空表示所有仓库
    async fn recent_commits(
        &self,
        username: &str,
        since: DateTime<Utc>,
        tracked: &[String],
    ) -> Result<Vec<Commit>>;
}
