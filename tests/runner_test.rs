//! 完整运行流程：内存事件源 + 模拟的 Discord webhook

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gh_notifier::github::{Invitation, Issue, PullRequest, Repo, User, WorkflowRun};
use gh_notifier::notification::{DiscordWebhook, WebhookConfig};
use gh_notifier::test_support::FakeSource;
use gh_notifier::{Config, Dispatcher, HistoryStore, Runner};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// 03:00 UTC = 10:00 ICT
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap()
}

fn config(dir: &TempDir, webhook: &str) -> Config {
    let webhook = webhook.to_string();
    Config::from_lookup(move |key| match key {
        "GITHUB_TOKEN" => Some("ghp_test".to_string()),
        "DISCORD_WEBHOOK" => Some(webhook.clone()),
        "GITHUB_USERNAME" => Some("octocat".to_string()),
        _ => None,
    })
    .unwrap()
    .with_cache_file(dir.path().join("state").join("cache.json"))
}

fn source() -> FakeSource {
    FakeSource {
        reviews: vec![PullRequest {
            number: 12,
            title: "Add retry".to_string(),
            html_url: "https://github.com/octo/app/pull/12".to_string(),
            ..Default::default()
        }],
        own_prs: vec![PullRequest {
            number: 34,
            title: "Old branch".to_string(),
            state: "open".to_string(),
            updated_at: now() - Duration::days(4),
            draft: Some(false),
            ..Default::default()
        }],
        assigned: vec![Issue {
            number: 7,
            title: "Crash on start".to_string(),
            ..Default::default()
        }],
        invitations: vec![Invitation {
            id: 55,
            created_at: now() - Duration::days(1),
            inviter: User {
                login: "alice".to_string(),
                ..Default::default()
            },
            repository: Repo {
                full_name: "alice/tools".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }],
        workflows: vec![WorkflowRun {
            id: 9001,
            name: "CI".to_string(),
            conclusion: Some("failure".to_string()),
            repository: Repo {
                name: "app".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_run_sends_alert_and_digest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir, &format!("{}/hook", server.uri()));
    let webhook = DiscordWebhook::new(WebhookConfig::new(&config.discord_webhook)).unwrap();
    let runner = Runner::new(config.clone(), Arc::new(source()), Dispatcher::new(Arc::new(webhook)));

    let report = runner.run_at(now()).await.unwrap();

    assert_eq!(report.username, "octocat");
    assert_eq!(report.new_alerts, 5);
    assert!(report.alert_delivered);
    assert!(report.digest_delivered);
    assert!(report.saved);

    let requests = server.received_requests().await.unwrap();
    let alert: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(alert["embeds"][0]["title"], "🔔 GitHub Alerts (5 items)");
    let digest: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(digest["embeds"][0]["title"], "🌅 Morning Briefing – 2025-03-10");

    let store = HistoryStore::load(&config.cache_file).unwrap();
    assert_eq!(store.sent_count(), 5);
    assert_eq!(store.last_check(), now());
    assert_eq!(store.last_daily_report(), now());
}

#[tokio::test]
async fn test_repeat_run_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir, &server.uri());
    let webhook = DiscordWebhook::new(WebhookConfig::new(&config.discord_webhook)).unwrap();
    let runner = Runner::new(config, Arc::new(source()), Dispatcher::new(Arc::new(webhook)));

    runner.run_at(now()).await.unwrap();
    let first_count = server.received_requests().await.unwrap().len();

    let report = runner.run_at(now() + Duration::minutes(15)).await.unwrap();

    assert!(report.checked);
    assert_eq!(report.new_alerts, 0);
    assert!(report.digest.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), first_count);
}

#[tokio::test]
async fn test_webhook_outage_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&dir, &server.uri());
    let webhook = DiscordWebhook::new(WebhookConfig::new(&config.discord_webhook)).unwrap();
    let runner = Runner::new(config.clone(), Arc::new(source()), Dispatcher::new(Arc::new(webhook)));

    let report = runner.run_at(now()).await.unwrap();

    assert!(!report.alert_delivered);
    assert!(!report.digest_delivered);
    // 提醒未记为已发送，日报下次重试
    let store = HistoryStore::load(&config.cache_file).unwrap();
    assert_eq!(store.sent_count(), 0);
    assert_ne!(store.last_daily_report(), now());
}
