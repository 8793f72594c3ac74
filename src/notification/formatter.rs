//! 消息格式化模块 - 把检查结果和日报转换为 Discord 消息
//!
//! 每个类别对应一个 embed field；列表超出 field 长度上限或整个 embed 的
//! 字符上限时保留能放下的行，末尾注明省略了多少条。

use chrono::{DateTime, Utc};
use std::fmt::Display;

use super::message::{
    truncate, DiscordMessage, Embed, Field, COLOR_BLUE, COLOR_GREEN, COLOR_MORNING, COLOR_ORANGE,
    EMBED_TOTAL_LIMIT, FIELD_VALUE_LIMIT,
};
use crate::checker::CheckResult;
use crate::digest::{DailyDigest, DigestKind};
use crate::github::{Invitation, Issue, PullRequest, WorkflowRun};

const FOOTER: &str = "GitHub Notifier";
const FOOTER_DAILY: &str = "GitHub Notifier • Daily Report";
const FOOTER_COMMIT: &str = "GitHub Notifier • Commit Tracker";

/// 单条提交通知的内容
#[derive(Debug, Clone, Default)]
pub struct CommitDetails {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub repository: String,
    pub commit_url: String,
    pub repo_url: String,
    pub avatar_url: Option<String>,
}

/// 即时提醒；没有可显示的内容时返回 `None`
pub fn format_instant_alert(result: &CheckResult, now: DateTime<Utc>) -> Option<DiscordMessage> {
    if !result.has_alerts() {
        return None;
    }

    let mut fields = Vec::new();

    if !result.prs_needing_review.is_empty() {
        fields.push(section(
            "🔍 PRs waiting for your review",
            result.prs_needing_review.iter().map(pr_line),
        ));
    }

    if !result.stale_own_prs.is_empty() {
        fields.push(section(
            "⏰ Your PRs need attention",
            result.stale_own_prs.iter().map(|pr| {
                let days = now.signed_duration_since(pr.updated_at).num_days();
                format!("{} ({} days old)", pr_line(pr), days)
            }),
        ));
    }

    if !result.assigned_issues.is_empty() {
        fields.push(section(
            "📋 Issues assigned to you",
            result.assigned_issues.iter().map(issue_line),
        ));
    }

    if !result.unread_notifications.is_empty() {
        fields.push(section(
            "📬 Unread notifications",
            result.unread_notifications.iter().map(|n| {
                format!(
                    "{} [{}]({}) in {}",
                    notification_icon(&n.reason),
                    n.subject.title,
                    n.html_url(),
                    n.repository.full_name
                )
            }),
        ));
    }

    if !result.failed_workflows.is_empty() {
        fields.push(section(
            "🚨 Failed workflows",
            result.failed_workflows.iter().map(workflow_line),
        ));
    }

    let invitations: Vec<String> = result
        .repository_invitations
        .iter()
        .filter(|invite| !invite.is_expired(now))
        .map(|invite| invitation_line(invite, now))
        .collect();
    if !invitations.is_empty() {
        fields.push(section("📨 New Repository Invitations", invitations));
    }

    if !result.recent_commits.is_empty() {
        fields.push(section(
            "📝 New commits",
            result.recent_commits.iter().map(|commit| {
                format!(
                    "• [`{}`]({}) {} in {}",
                    commit.short_sha(),
                    commit.html_url,
                    commit.headline(),
                    commit.repository.name
                )
            }),
        ));
    }

    // 只剩过期邀请时不发空消息
    if fields.is_empty() {
        return None;
    }

    let mut embed = Embed::new(
        format!("🔔 GitHub Alerts ({} items)", result.alert_count()),
        COLOR_ORANGE,
    )
    .with_description("Here are some items that need your attention:")
    .with_timestamp(now)
    .with_footer(FOOTER);
    embed.fields = fit_fields(embed.char_count(), fields);

    Some(DiscordMessage::embed(embed))
}

/// 日报
pub fn format_daily_digest(digest: &DailyDigest, username: &str, now: DateTime<Utc>) -> DiscordMessage {
    let date = digest.date.format("%Y-%m-%d");
    let mut fields = Vec::new();

    let embed = match digest.kind {
        DigestKind::Evening => {
            if !digest.prs_opened.is_empty() {
                fields.push(section("📤 Pull Requests Opened", digest.prs_opened.iter().map(pr_line)));
            }
            if !digest.prs_merged.is_empty() {
                fields.push(section("✅ Pull Requests Merged", digest.prs_merged.iter().map(pr_line)));
            }
            if !digest.issues_opened.is_empty() {
                fields.push(section("🐛 Issues Opened", digest.issues_opened.iter().map(issue_line)));
            }
            if !digest.issues_closed.is_empty() {
                fields.push(section("✅ Issues Resolved", digest.issues_closed.iter().map(issue_line)));
            }
            if !digest.commits.is_empty() {
                fields.push(
                    Section::single("💻 Activity", format!("{} commits today", digest.commits.len())).inline(),
                );
            }
            if fields.is_empty() {
                fields.push(Section::single("🌙 Quiet day", "No significant GitHub activity today"));
            }

            Embed::new(format!("🌆 Evening Summary – {}", date), COLOR_GREEN)
                .with_description(format!("Here's what you accomplished today, {}!", username))
        }
        DigestKind::Morning => {
            if !digest.pending_reviews.is_empty() {
                fields.push(section("👀 Reviews Waiting", digest.pending_reviews.iter().map(pr_line)));
            }
            if !digest.assigned_issues.is_empty() {
                fields.push(section("📝 Issues Assigned", digest.assigned_issues.iter().map(issue_line)));
            }
            let invitations: Vec<String> = digest
                .repository_invitations
                .iter()
                .filter(|invite| !invite.is_expired(now))
                .map(|invite| invitation_line(invite, now))
                .collect();
            if !invitations.is_empty() {
                fields.push(section("📨 Pending Repository Invitations", invitations));
            }
            if fields.is_empty() {
                fields.push(Section::single(
                    "✨ All clear!",
                    "No pending reviews, assigned issues, or invitations",
                ));
            }
            if !digest.commits.is_empty() {
                fields.push(
                    Section::single(
                        "💻 Activity",
                        format!("{} commits in the last 24 hours", digest.commits.len()),
                    )
                    .inline(),
                );
            }

            Embed::new(format!("🌅 Morning Briefing – {}", date), COLOR_MORNING).with_description(format!(
                "Good morning {}! Here's what needs your attention:",
                username
            ))
        }
    };

    if !digest.failed_workflows.is_empty() {
        fields.push(section("🚨 Failed Workflows", digest.failed_workflows.iter().map(workflow_line)));
    }

    let mut embed = embed.with_timestamp(now).with_footer(FOOTER_DAILY);
    embed.fields = fit_fields(embed.char_count(), fields);
    DiscordMessage::embed(embed)
}

/// 单条提交通知
pub fn format_commit_notification(commit: &CommitDetails, now: DateTime<Utc>) -> DiscordMessage {
    let short_sha = crate::github::models::short_sha(&commit.sha);

    let mut embed = Embed::new("📝 New Commit Pushed", COLOR_BLUE)
        .with_description(format!("Here's the latest commit from **{}**!", commit.author))
        .with_timestamp(now)
        .with_field(Field::new(
            "🚀 Commit Details",
            format!("**[{}]({})** {}", short_sha, commit.commit_url, commit.message),
        ))
        .with_field(
            Field::new(" Repository", format!("[{}]({})", commit.repository, commit.repo_url)).inline(),
        )
        .with_footer(FOOTER_COMMIT);

    if let Some(avatar) = commit.avatar_url.as_deref().filter(|url| !url.is_empty()) {
        embed = embed.with_author(commit.author.as_str(), avatar);
    }

    DiscordMessage::embed(embed)
}

/// 错误提示文本
pub fn format_error_message(error: &impl Display) -> String {
    format!("🚨 **Error**\n```\n{}\n```", error)
}

/// 通知原因对应的图标
pub fn notification_icon(reason: &str) -> &'static str {
    match reason {
        "review_requested" => "👀",
        "mention" => "💬",
        "assign" => "📋",
        "comment" => "💭",
        "push" => "📤",
        "ci_activity" => "🔧",
        "invitation" => "📩",
        "repository_invitation" => "📨",
        "team_mention" => "👥",
        "security_alert" => "🚨",
        "state_change" => "🔄",
        "author" => "✏️",
        _ => "🔔",
    }
}

/// 邀请过期提示
pub fn expiry_text(days_left: i64) -> String {
    match days_left {
        0 => "expires today".to_string(),
        1 => "expires tomorrow".to_string(),
        n => format!("expires in {} days", n),
    }
}

fn pr_line(pr: &PullRequest) -> String {
    format!("• [#{} {}]({})", pr.number, pr.title, pr.html_url)
}

fn issue_line(issue: &Issue) -> String {
    format!("• [#{} {}]({})", issue.number, issue.title, issue.html_url)
}

fn workflow_line(run: &WorkflowRun) -> String {
    format!("• [{}]({}) in {} ❌", run.name, run.html_url, run.repository.name)
}

fn invitation_line(invite: &Invitation, now: DateTime<Utc>) -> String {
    format!(
        "• **{}** to [{}]({}) ({})",
        invite.inviter.login,
        invite.repository.full_name,
        invite.html_url,
        expiry_text(invite.days_until_expiration(now))
    )
}

/// 待排版的 field：名称加若干行
struct Section {
    name: String,
    lines: Vec<String>,
    inline: bool,
}

impl Section {
    fn single(name: &str, text: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            lines: vec![text.into()],
            inline: false,
        }
    }

    fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// 全部展开时 value 的字符数
    fn full_len(&self) -> usize {
        let chars: usize = self.lines.iter().map(|line| line.chars().count()).sum();
        chars + self.lines.len().saturating_sub(1)
    }
}

fn section<I>(name: &str, lines: I) -> Section
where
    I: IntoIterator<Item = String>,
{
    Section {
        name: name.to_string(),
        lines: lines.into_iter().collect(),
        inline: false,
    }
}

/// 在整个 embed 的字符上限内排版所有 field。
///
/// `header_chars` 是标题、描述、footer 已占用的字符数。短的 field 先分配，
/// 省下的额度留给后面更长的 field；顺序保持不变。
fn fit_fields(header_chars: usize, sections: Vec<Section>) -> Vec<Field> {
    let names: usize = sections.iter().map(|s| s.name.chars().count()).sum();
    let mut remaining = EMBED_TOTAL_LIMIT.saturating_sub(header_chars + names);

    let mut order: Vec<usize> = (0..sections.len()).collect();
    order.sort_by_key(|&i| sections[i].full_len());

    let mut fields: Vec<Option<Field>> = vec![None; sections.len()];
    for (placed, &i) in order.iter().enumerate() {
        let share = (remaining / (sections.len() - placed)).min(FIELD_VALUE_LIMIT);
        let section = &sections[i];
        let mut field = list_field(&section.name, &section.lines, share);
        field.inline = section.inline;
        remaining = remaining.saturating_sub(field.value.chars().count());
        fields[i] = Some(field);
    }

    fields.into_iter().flatten().collect()
}

/// 按行拼接到 `limit` 个字符以内；放不下的行折叠成 "…and N more"
fn list_field(name: &str, lines: &[String], limit: usize) -> Field {
    let total = lines.len();
    let mut value = String::new();
    let mut used = 0;

    for (i, line) in lines.iter().enumerate() {
        let remaining = total - i - 1;
        let reserve = if remaining > 0 { more_suffix(remaining).chars().count() + 1 } else { 0 };
        let needed = line.chars().count() + usize::from(!value.is_empty());
        if used + needed + reserve > limit && !value.is_empty() {
            value.push('\n');
            value.push_str(&more_suffix(total - i));
            break;
        }
        if !value.is_empty() {
            value.push('\n');
        }
        value.push_str(line);
        used += needed;
    }

    Field::new(name, truncate(&value, limit))
}

fn more_suffix(count: usize) -> String {
    format!("…and {} more", count)
}
