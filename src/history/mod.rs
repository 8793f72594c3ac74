//! 通知历史存储 - 记录每条提醒最后一次发送的时间
//!
//! 进程每次被调度器唤醒只运行一轮，所以"是否已经提醒过"必须持久化到本地
//! JSON 文件，跨进程重启仍然有效。
//!
//! ## 判定规则
//! 1. 从未发送过的 key 不会被抑制
//! 2. cooldown 为 0 表示"只提醒一次"，发送过就永久抑制
//! 3. 其余情况：距上次发送不足 cooldown 则抑制
//! 4. 超过保留期（默认 7 天）的记录会被清理，对应事件再次出现时视为新事件

pub mod reconcile;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

pub use reconcile::{reconcile_alerts, reconcile_category, CooldownPolicy, Cooldowns, Reconciliation};

/// 提醒类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 等待我 review 的 PR
    ReviewRequest,
    /// 自己创建但长时间无更新的 PR
    StalePr,
    /// 分配给我的 issue
    AssignedIssue,
    /// 未读通知
    Notification,
    /// 失败的 workflow run
    Workflow,
    /// 仓库邀请
    Invitation,
    /// 新提交
    Commit,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::ReviewRequest,
        Category::StalePr,
        Category::AssignedIssue,
        Category::Notification,
        Category::Workflow,
        Category::Invitation,
        Category::Commit,
    ];

    /// 用于 key 和日志的稳定名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ReviewRequest => "review_request",
            Category::StalePr => "stale_pr",
            Category::AssignedIssue => "assigned_issue",
            Category::Notification => "notification",
            Category::Workflow => "workflow",
            Category::Invitation => "invitation",
            Category::Commit => "commit",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提醒的唯一标识：`<category>_<id>`
///
/// 类别总是 key 的前缀，不同类别的相同 id 不会冲突。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn new(category: Category, id: impl fmt::Display) -> Self {
        Self(format!("{}_{}", category.as_str(), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 持久化的历史状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStore {
    /// 上次即时检查的时间
    #[serde(default)]
    last_check: DateTime<Utc>,
    /// 上次日报的时间
    #[serde(default)]
    last_daily_report: DateTime<Utc>,
    /// key -> 最后发送时间
    #[serde(default, deserialize_with = "null_as_default")]
    sent_notifications: HashMap<NotificationKey, DateTime<Utc>>,
    /// 按类别记录"见过即永不重复"的 id，没有过期
    #[serde(default, deserialize_with = "null_as_default")]
    processed: BTreeMap<Category, BTreeSet<String>>,
    /// 本次运行是否修改过（不持久化）
    #[serde(skip)]
    dirty: bool,
}

impl HistoryStore {
    /// 创建空的历史状态
    pub fn new() -> Self {
        Self::new_at(Utc::now())
    }

    /// 创建空的历史状态（指定当前时间，用于测试）
    ///
    /// `last_daily_report` 设为前一天，首次运行即可发送日报；
    /// `last_check` 设为 epoch，首次运行即可做即时检查。
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            last_check: DateTime::<Utc>::default(),
            last_daily_report: now - Duration::days(1),
            sent_notifications: HashMap::new(),
            processed: BTreeMap::new(),
            dirty: false,
        }
    }

    /// 从文件加载
    ///
    /// 文件不存在时返回新的空状态；文件存在但无法读取或解析是致命错误，
    /// 静默丢弃历史会导致所有提醒被重复发送。
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "History file not found, starting fresh");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read history file {}", path.display()))
            }
        };

        let store: HistoryStore = serde_json::from_str(&content)
            .with_context(|| format!("history file {} is corrupt", path.display()))?;

        debug!(
            path = %path.display(),
            sent = store.sent_notifications.len(),
            "Loaded notification history"
        );
        Ok(store)
    }

    /// 保存到文件（先写临时文件再原子替换）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("failed to serialize history")?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("failed to replace history file {}", path.display()))?;

        Ok(())
    }

    /// 检查 key 是否处于抑制期
    pub fn is_suppressed(&self, key: &NotificationKey, cooldown: Duration) -> bool {
        self.is_suppressed_at(key, cooldown, Utc::now())
    }

    /// 检查 key 是否处于抑制期（指定当前时间，用于测试）
    pub fn is_suppressed_at(
        &self,
        key: &NotificationKey,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last_sent) = self.sent_notifications.get(key) else {
            return false;
        };

        // cooldown 为 0：只提醒一次
        if cooldown.is_zero() {
            return true;
        }

        now.signed_duration_since(*last_sent) < cooldown
    }

    /// 记录 key 已发送
    pub fn mark_sent(&mut self, key: NotificationKey) {
        self.mark_sent_at(key, Utc::now());
    }

    /// 记录 key 已发送（指定当前时间，用于测试）
    pub fn mark_sent_at(&mut self, key: NotificationKey, now: DateTime<Utc>) {
        self.sent_notifications.insert(key, now);
        self.dirty = true;
    }

    /// 获取 key 的最后发送时间
    pub fn last_sent(&self, key: &NotificationKey) -> Option<DateTime<Utc>> {
        self.sent_notifications.get(key).copied()
    }

    /// 已记录的 key 数量
    pub fn sent_count(&self) -> usize {
        self.sent_notifications.len()
    }

    /// 清理早于 `max_age` 的记录，返回清理数量
    pub fn prune(&mut self, max_age: Duration) -> usize {
        self.prune_at(max_age, Utc::now())
    }

    /// 清理早于 `now - max_age` 的记录（指定当前时间，用于测试）
    pub fn prune_at(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let before = self.sent_notifications.len();
        self.sent_notifications.retain(|_, sent_at| *sent_at >= cutoff);

        let removed = before - self.sent_notifications.len();
        if removed > 0 {
            debug!(removed, "Pruned expired notification records");
            self.dirty = true;
        }
        removed
    }

    /// 检查 id 是否已在该类别中处理过
    pub fn is_processed(&self, category: Category, id: &str) -> bool {
        self.processed
            .get(&category)
            .is_some_and(|ids| ids.contains(id))
    }

    /// 标记 id 已处理（永久有效，直到 `clear_processed`）
    pub fn mark_processed(&mut self, category: Category, id: impl Into<String>) {
        self.processed.entry(category).or_default().insert(id.into());
        self.dirty = true;
    }

    /// 清除某类别的全部已处理记录，返回清除数量
    pub fn clear_processed(&mut self, category: Category) -> usize {
        let removed = self.processed.remove(&category).map_or(0, |ids| ids.len());
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        self.last_check
    }

    pub fn last_daily_report(&self) -> DateTime<Utc> {
        self.last_daily_report
    }

    /// 记录即时检查时间
    pub fn record_check(&mut self, at: DateTime<Utc>) {
        self.last_check = at;
        self.dirty = true;
    }

    /// 记录日报时间
    pub fn record_daily_report(&mut self, at: DateTime<Utc>) {
        self.last_daily_report = at;
        self.dirty = true;
    }

    /// 本次运行中是否被修改过
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// 把 JSON 中的 `null` 当作空容器处理
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn key(n: u64) -> NotificationKey {
        NotificationKey::new(Category::ReviewRequest, n)
    }

    #[test]
    fn test_unseen_key_is_not_suppressed() {
        let store = HistoryStore::new_at(t0());
        assert!(!store.is_suppressed_at(&key(1), Duration::hours(24), t0()));
        assert!(!store.is_suppressed_at(&key(1), Duration::zero(), t0()));
    }

    #[test]
    fn test_mark_sent_then_suppressed() {
        let mut store = HistoryStore::new_at(t0());
        store.mark_sent_at(key(1), t0());
        assert!(store.is_suppressed_at(&key(1), Duration::hours(24), t0()));
        // 其他 key 不受影响
        assert!(!store.is_suppressed_at(&key(2), Duration::hours(24), t0()));
    }

    #[test]
    fn test_zero_cooldown_suppresses_forever() {
        let mut store = HistoryStore::new_at(t0());
        store.mark_sent_at(key(7), t0());

        let far_future = t0() + Duration::days(3650);
        assert!(store.is_suppressed_at(&key(7), Duration::zero(), far_future));
    }

    #[test]
    fn test_cooldown_expiry_boundary() {
        let mut store = HistoryStore::new_at(t0());
        let cooldown = Duration::hours(2);
        store.mark_sent_at(key(3), t0());

        let just_before = t0() + cooldown - Duration::seconds(1);
        assert!(store.is_suppressed_at(&key(3), cooldown, just_before));
        assert!(!store.is_suppressed_at(&key(3), cooldown, t0() + cooldown));
        assert!(!store.is_suppressed_at(&key(3), cooldown, t0() + Duration::hours(5)));
    }

    #[test]
    fn test_mark_sent_overwrites_and_is_idempotent() {
        let mut store = HistoryStore::new_at(t0());
        store.mark_sent_at(key(1), t0());
        store.mark_sent_at(key(1), t0());
        assert_eq!(store.last_sent(&key(1)), Some(t0()));
        assert_eq!(store.sent_count(), 1);

        let later = t0() + Duration::hours(30);
        store.mark_sent_at(key(1), later);
        assert_eq!(store.last_sent(&key(1)), Some(later));
    }

    #[test]
    fn test_keys_do_not_collide_across_categories() {
        let review = NotificationKey::new(Category::ReviewRequest, 12);
        let stale = NotificationKey::new(Category::StalePr, 12);
        assert_ne!(review, stale);
        assert_eq!(review.as_str(), "review_request_12");
        assert_eq!(stale.as_str(), "stale_pr_12");

        let mut store = HistoryStore::new_at(t0());
        store.mark_sent_at(review.clone(), t0());
        assert!(store.is_suppressed_at(&review, Duration::hours(24), t0()));
        assert!(!store.is_suppressed_at(&stale, Duration::hours(24), t0()));
    }

    #[test]
    fn test_prune_boundary() {
        let now = t0();
        let max_age = Duration::days(7);
        let mut store = HistoryStore::new_at(now);
        store.mark_sent_at(key(1), now - max_age - Duration::seconds(1));
        store.mark_sent_at(key(2), now - max_age + Duration::seconds(1));

        let removed = store.prune_at(max_age, now);

        assert_eq!(removed, 1);
        assert_eq!(store.last_sent(&key(1)), None);
        assert!(store.last_sent(&key(2)).is_some());
    }

    #[test]
    fn test_prune_empty_store() {
        let mut store = HistoryStore::new_at(t0());
        assert_eq!(store.prune_at(Duration::days(7), t0()), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_pruned_key_becomes_unseen() {
        let mut store = HistoryStore::new_at(t0());
        store.mark_sent_at(key(5), t0());

        let later = t0() + Duration::days(8);
        store.prune_at(Duration::days(7), later);
        assert!(!store.is_suppressed_at(&key(5), Duration::zero(), later));
    }

    #[test]
    fn test_processed_set() {
        let mut store = HistoryStore::new_at(t0());
        assert!(!store.is_processed(Category::Workflow, "42"));

        store.mark_processed(Category::Workflow, "42");
        assert!(store.is_processed(Category::Workflow, "42"));
        assert!(!store.is_processed(Category::Commit, "42"));

        // 清理 sent 记录不影响已处理集合
        store.prune_at(Duration::days(7), t0() + Duration::days(30));
        assert!(store.is_processed(Category::Workflow, "42"));

        assert_eq!(store.clear_processed(Category::Workflow), 1);
        assert!(!store.is_processed(Category::Workflow, "42"));
        assert_eq!(store.clear_processed(Category::Workflow), 0);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut store = HistoryStore::new_at(t0());
        assert!(!store.is_dirty());
        let _ = store.is_suppressed_at(&key(1), Duration::hours(1), t0());
        assert!(!store.is_dirty());
        store.mark_sent_at(key(1), t0());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_fresh_store_digest_is_eligible() {
        let now = Utc::now();
        let store = HistoryStore::new();
        assert!(store.last_daily_report() < now);
        assert_eq!(store.sent_count(), 0);
    }

    #[test]
    fn test_load_missing_file_returns_fresh_store() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(store.sent_count(), 0);
        assert!(store.last_daily_report() < Utc::now());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let err = HistoryStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_load_normalizes_missing_maps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"last_check":"2025-03-10T09:00:00Z","last_daily_report":"2025-03-09T02:00:00+07:00"}"#,
        )
        .unwrap();

        let store = HistoryStore::load(&path).unwrap();
        assert_eq!(store.sent_count(), 0);
        assert!(!store.is_processed(Category::Notification, "x"));
        assert_eq!(store.last_check(), t0());
        assert_eq!(
            store.last_daily_report(),
            Utc.with_ymd_and_hms(2025, 3, 8, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_load_tolerates_null_and_legacy_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "last_check": "2025-03-10T09:00:00Z",
                "last_daily_report": "2025-03-10T09:00:00Z",
                "sent_notifications": {"review_request_12": "2025-03-10T08:00:00Z"},
                "processed": null,
                "processed_prs": {},
                "processed_issues": null
            }"#,
        )
        .unwrap();

        let store = HistoryStore::load(&path).unwrap();
        assert_eq!(store.sent_count(), 1);
        assert!(store.is_suppressed_at(&key(12), Duration::hours(24), t0()));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut store = HistoryStore::new_at(t0());
        store.record_check(t0());
        store.mark_sent_at(key(12), t0());
        store.mark_sent_at(NotificationKey::new(Category::Invitation, 99), t0() - Duration::hours(3));
        store.mark_processed(Category::Workflow, "555");
        store.save(&path).unwrap();

        let loaded = HistoryStore::load(&path).unwrap();
        assert_eq!(loaded.last_check(), store.last_check());
        assert_eq!(loaded.last_daily_report(), store.last_daily_report());
        assert_eq!(loaded.sent_count(), 2);
        assert_eq!(loaded.last_sent(&key(12)), Some(t0()));
        assert!(loaded.is_processed(Category::Workflow, "555"));
        assert!(!loaded.is_dirty());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_save_into_missing_directory_fails_cleanly() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let store = HistoryStore::new_at(t0());
        assert!(store.save(&blocker.join("cache.json")).is_err());
    }
}
