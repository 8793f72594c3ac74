//! 提醒对账 - 对比本轮抓取结果与历史记录，筛出需要发送的提醒
//!
//! 每个类别独立处理，同一类别内保持原始顺序。被放行的提醒会立即
//! 记录到历史中，同一批次里重复出现的 id 只会放行一次。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{Category, HistoryStore, NotificationKey};
use crate::checker::CheckResult;

/// 单个类别的去重策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// 距上次发送超过该时长后允许再次提醒
    Cooldown(Duration),
    /// 只提醒一次，记录进已处理集合，不受保留期清理影响
    Once,
}

/// 各类别的去重策略配置
#[derive(Debug, Clone)]
pub struct Cooldowns {
    default: Duration,
    overrides: HashMap<Category, CooldownPolicy>,
}

impl Cooldowns {
    /// 默认配置：失败的 workflow 和新提交只提醒一次，其余类别共用 `default`
    pub fn new(default: Duration) -> Self {
        Self::uniform(default)
            .with_policy(Category::Workflow, CooldownPolicy::Once)
            .with_policy(Category::Commit, CooldownPolicy::Once)
    }

    /// 新提交只提醒一次，失败的 workflow 与其他类别共用 `default`
    pub fn shared_workflow(default: Duration) -> Self {
        Self::uniform(default).with_policy(Category::Commit, CooldownPolicy::Once)
    }

    /// 所有类别使用同一个冷却时间
    pub fn uniform(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// 为某个类别单独设置策略
    pub fn with_policy(mut self, category: Category, policy: CooldownPolicy) -> Self {
        self.overrides.insert(category, policy);
        self
    }

    pub fn policy_for(&self, category: Category) -> CooldownPolicy {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or(CooldownPolicy::Cooldown(self.default))
    }
}

/// 对账结果
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// 只包含本轮新放行的提醒
    pub alerts: CheckResult,
    /// 是否有任何新提醒
    pub any_new: bool,
}

/// 对单个类别做对账，返回需要发送的子集并记录到历史
pub fn reconcile_category<T, F>(
    store: &mut HistoryStore,
    category: Category,
    policy: CooldownPolicy,
    items: Vec<T>,
    id_of: F,
    now: DateTime<Utc>,
) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let total = items.len();
    let admitted: Vec<T> = items
        .into_iter()
        .filter(|item| {
            let id = id_of(item);
            let key = NotificationKey::new(category, &id);

            let suppressed = match policy {
                CooldownPolicy::Cooldown(cooldown) => store.is_suppressed_at(&key, cooldown, now),
                CooldownPolicy::Once => {
                    store.is_processed(category, &id)
                        || store.is_suppressed_at(&key, Duration::zero(), now)
                }
            };

            if suppressed {
                debug!(key = %key, "Alert suppressed");
                return false;
            }

            store.mark_sent_at(key, now);
            if policy == CooldownPolicy::Once {
                store.mark_processed(category, id);
            }
            true
        })
        .collect();

    if total > 0 {
        debug!(
            category = %category,
            total,
            admitted = admitted.len(),
            "Reconciled category"
        );
    }
    admitted
}

/// 对整批抓取结果做对账
pub fn reconcile_alerts(
    store: &mut HistoryStore,
    fetched: CheckResult,
    cooldowns: &Cooldowns,
    now: DateTime<Utc>,
) -> Reconciliation {
    let CheckResult {
        prs_needing_review,
        stale_own_prs,
        assigned_issues,
        unread_notifications,
        failed_workflows,
        repository_invitations,
        recent_commits,
        failed_categories,
        attempted_categories,
    } = fetched;

    let alerts = CheckResult {
        prs_needing_review: reconcile_category(
            store,
            Category::ReviewRequest,
            cooldowns.policy_for(Category::ReviewRequest),
            prs_needing_review,
            |pr| pr.number.to_string(),
            now,
        ),
        stale_own_prs: reconcile_category(
            store,
            Category::StalePr,
            cooldowns.policy_for(Category::StalePr),
            stale_own_prs,
            |pr| pr.number.to_string(),
            now,
        ),
        assigned_issues: reconcile_category(
            store,
            Category::AssignedIssue,
            cooldowns.policy_for(Category::AssignedIssue),
            assigned_issues,
            |issue| issue.number.to_string(),
            now,
        ),
        unread_notifications: reconcile_category(
            store,
            Category::Notification,
            cooldowns.policy_for(Category::Notification),
            unread_notifications,
            |notification| notification.id.clone(),
            now,
        ),
        failed_workflows: reconcile_category(
            store,
            Category::Workflow,
            cooldowns.policy_for(Category::Workflow),
            failed_workflows,
            |run| run.id.to_string(),
            now,
        ),
        repository_invitations: reconcile_category(
            store,
            Category::Invitation,
            cooldowns.policy_for(Category::Invitation),
            repository_invitations,
            |invitation| invitation.id.to_string(),
            now,
        ),
        recent_commits: reconcile_category(
            store,
            Category::Commit,
            cooldowns.policy_for(Category::Commit),
            recent_commits,
            |commit| commit.sha.clone(),
            now,
        ),
        failed_categories,
        attempted_categories,
    };

    let any_new = alerts.has_alerts();
    if any_new {
        info!(count = alerts.alert_count(), "New alerts after reconciliation");
    }

    Reconciliation { alerts, any_new }
}
