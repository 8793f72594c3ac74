//! 测试辅助 - 内存中的事件源和通知渠道

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use crate::github::{
    Commit, EventSource, Invitation, Issue, ItemState, Notification, PullRequest, User, WorkflowRun,
};
use crate::history::Category;
use crate::notification::{DiscordMessage, NotificationSink, SendResult};

/// 内存事件源
///
/// `failing` 中的类别返回错误，`slow` 中的类别会挂起 10 分钟。
#[derive(Debug, Default)]
pub struct FakeSource {
    pub user: User,
    pub reviews: Vec<PullRequest>,
    pub own_prs: Vec<PullRequest>,
    pub assigned: Vec<Issue>,
    pub user_issues: Vec<Issue>,
    pub notifications: Vec<Notification>,
    pub invitations: Vec<Invitation>,
    pub workflows: Vec<WorkflowRun>,
    pub commits: Vec<Commit>,
    pub failing: Vec<Category>,
    pub slow: Vec<Category>,
}

impl FakeSource {
    async fn respond<T: Clone>(&self, category: Category, items: &[T]) -> Result<Vec<T>> {
        if self.slow.contains(&category) {
            tokio::time::sleep(StdDuration::from_secs(600)).await;
        }
        if self.failing.contains(&category) {
            bail!("{} unavailable", category);
        }
        Ok(items.to_vec())
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn current_user(&self) -> Result<User> {
        Ok(self.user.clone())
    }

    async fn review_requests(&self, _username: &str) -> Result<Vec<PullRequest>> {
        self.respond(Category::ReviewRequest, &self.reviews).await
    }

    async fn user_pull_requests(&self, _username: &str, state: ItemState) -> Result<Vec<PullRequest>> {
        let prs = self.respond(Category::StalePr, &self.own_prs).await?;
        Ok(match state {
            ItemState::Open => prs.into_iter().filter(|pr| pr.state != "closed").collect(),
            ItemState::All => prs,
        })
    }

    async fn assigned_issues(&self, _username: &str) -> Result<Vec<Issue>> {
        self.respond(Category::AssignedIssue, &self.assigned).await
    }

    async fn user_issues(&self, _username: &str) -> Result<Vec<Issue>> {
        self.respond(Category::AssignedIssue, &self.user_issues).await
    }

    async fn notifications(&self) -> Result<Vec<Notification>> {
        self.respond(Category::Notification, &self.notifications).await
    }

    async fn repository_invitations(&self) -> Result<Vec<Invitation>> {
        self.respond(Category::Invitation, &self.invitations).await
    }

    async fn failed_workflow_runs(&self, _username: &str) -> Result<Vec<WorkflowRun>> {
        self.respond(Category::Workflow, &self.workflows).await
    }

    async fn recent_commits(
        &self,
        _username: &str,
        since: DateTime<Utc>,
        _tracked: &[String],
    ) -> Result<Vec<Commit>> {
        let commits = self.respond(Category::Commit, &self.commits).await?;
        Ok(commits.into_iter().filter(|c| c.date >= since).collect())
    }
}

/// 记录所有消息的通知渠道
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<DiscordMessage>>,
    /// 为 true 时所有发送都失败
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<DiscordMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &DiscordMessage) -> Result<SendResult> {
        if self.fail {
            bail!("webhook unreachable");
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
        Ok(SendResult::Sent)
    }
}
