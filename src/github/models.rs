//! GitHub REST v3 response models
//!
//! Only the fields the notifier actually renders or filters on are modelled;
//! everything else in the payloads is ignored by serde.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Repository invitations expire seven days after they are sent.
pub const INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
}

/// Merge metadata attached to pull requests returned by the search API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestLinks {
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

/// A pull request as returned by `search/issues`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub pull_request: Option<PullRequestLinks>,
}

impl PullRequest {
    pub fn is_draft(&self) -> bool {
        self.draft.unwrap_or(false)
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        self.pull_request.as_ref().and_then(|links| links.merged_at)
    }

    /// `owner/repo`, derived from the API repository URL.
    pub fn repo_full_name(&self) -> Option<&str> {
        repo_from_api_url(&self.repository_url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub assignee: Option<User>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub comments: u64,
}

impl Issue {
    pub fn repo_full_name(&self) -> Option<&str> {
        repo_from_api_url(&self.repository_url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// An entry from `GET /notifications`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    pub subject: Subject,
    #[serde(default)]
    pub repository: Repo,
}

impl Notification {
    /// Browser URL for the subject; the API only hands out REST URLs.
    pub fn html_url(&self) -> String {
        match self.subject.url.as_deref() {
            Some(url) => url
                .replacen("https://api.github.com/repos/", "https://github.com/", 1)
                .replacen("/pulls/", "/pull/", 1),
            None => self.repository.html_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: u64,
    #[serde(default)]
    pub repository: Repo,
    #[serde(default)]
    pub invitee: User,
    #[serde(default)]
    pub inviter: User,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

impl Invitation {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(INVITATION_TTL_DAYS)
    }

    /// Whole days left before expiry, clamped at zero.
    pub fn days_until_expiration(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at().signed_duration_since(now).num_days().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub repository: Repo,
}

impl WorkflowRun {
    pub fn is_failure(&self) -> bool {
        self.conclusion.as_deref() == Some("failure")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: User,
    pub date: DateTime<Utc>,
    pub html_url: String,
    pub repository: Repo,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }

    /// First line of the commit message.
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Raw shape of `GET /repos/{owner}/{repo}/commits` entries.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CommitResponse {
    pub sha: String,
    pub commit: CommitDetail,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub author: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CommitDetail {
    pub message: String,
    pub author: CommitSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CommitSignature {
    #[serde(default)]
    pub name: String,
    pub date: DateTime<Utc>,
}

impl CommitResponse {
    pub fn into_commit(self, repository: Repo) -> Commit {
        let author = self.author.unwrap_or_else(|| User {
            login: self.commit.author.name.clone(),
            avatar_url: String::new(),
        });
        Commit {
            sha: self.sha,
            message: self.commit.message,
            author,
            date: self.commit.author.date,
            html_url: self.html_url,
            repository,
        }
    }
}

/// Seven-character abbreviation used in messages.
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn repo_from_api_url(url: &str) -> Option<&str> {
    url.split_once("/repos/").map(|(_, rest)| rest).filter(|rest| !rest.is_empty())
}
