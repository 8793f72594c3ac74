//! GitHub Notifier CLI
//!
//! 轮询 GitHub，把去重后的提醒和日报推送到 Discord。由 cron / GitHub Actions 周期性调用。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{fmt, EnvFilter};

use gh_notifier::cli::{handle_commit, handle_run, CommitArgs, RunArgs};

#[derive(Parser)]
#[command(name = "gh-notify")]
#[command(about = "GitHub Notifier - 把 GitHub 提醒和日报推送到 Discord")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 不指定子命令时等同于 run
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行一次检查：即时提醒 + 到点的日报（默认）
    Run(RunArgs),
    /// 推送单条提交通知（用于 CI）
    Commit(CommitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=gh_notifier=debug gh-notify --force-check
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gh_notifier=info,gh_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Commit(args)) => handle_commit(args).await,
        Some(Commands::Run(args)) => handle_run(args).await.map(|report| debug!(?report, "Run finished")),
        None => handle_run(cli.run).await.map(|report| debug!(?report, "Run finished")),
    };

    if let Err(e) = &outcome {
        error!(error = %format!("{:#}", e), "GitHub Notifier failed");
    }
    outcome
}
