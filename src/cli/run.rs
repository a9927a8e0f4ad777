// src/cli/run.rs
//! Run 命令 - 启动通知转发
//!
//! 启动顺序：加载配置 → 检查 GitHub 授权 → 构建投递渠道 → 进入轮询循环。
//! 前两步失败都直接返回错误，进程以非零状态退出。

use crate::config::{resolve_config_path, RelayConfig};
use crate::relay::{CommentMessageBuilder, DeliverySink, LogSink, PollLoop, WebhookConfig, WebhookSink};
use crate::source::{GitHubClient, GitHubConfig, NotificationSource};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Run 命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// 配置文件路径 (默认: ./config.yml，存在时使用)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 只打印消息，不发送 webhook
    #[arg(long)]
    pub dry_run: bool,

    /// 只运行一轮后退出
    #[arg(long)]
    pub once: bool,

    /// GitHub API 地址（GitHub Enterprise 使用）
    #[arg(long, env = "GITHUB_API_URL", default_value = crate::source::github::GITHUB_API_URL)]
    pub api_url: String,
}

/// 处理 run 命令
pub async fn handle_run(args: RunArgs) -> Result<()> {
    // 1. 配置
    let config_path = resolve_config_path(args.config);
    match &config_path {
        Some(path) => debug!(path = %path.display(), "Using config file"),
        None => debug!("No config file found, using defaults and environment"),
    }
    let config = RelayConfig::load(config_path.as_deref()).context("Error parsing config")?;
    trace!(?config, "Current config");

    // 2. GitHub 授权
    let github = GitHubClient::new(GitHubConfig {
        api_url: args.api_url,
        token: config.github_token.clone(),
        ..Default::default()
    })?;
    github
        .check_authorization()
        .await
        .context("Got an error when checking authorization")?;
    let source: Arc<dyn NotificationSource> = Arc::new(github);

    // 3. 投递渠道
    let sink: Arc<dyn DeliverySink> = if args.dry_run {
        warn!("Dry-run mode, messages will only be logged");
        Arc::new(LogSink)
    } else {
        Arc::new(WebhookSink::new(WebhookConfig::new(config.webhook_url.clone()))?)
    };

    let builder = Arc::new(CommentMessageBuilder::new(source.clone()));
    let mut poll_loop = PollLoop::new(config.loop_config(), source, builder, sink);

    // 4. 轮询
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if args.once {
        let report = poll_loop.run_cycle(&shutdown).await;
        info!(
            fetched = report.fetched,
            allowed = report.allowed,
            sent = report.sent,
            failed = report.failed,
            "Single cycle finished"
        );
        return Ok(());
    }

    poll_loop.run(shutdown).await
}

/// Ctrl-C / SIGTERM 时取消 token
pub fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cannot install SIGTERM handler, only Ctrl-C stops the relay");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("Shutdown signal received");
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_run_args_defaults() {
        let cli = TestCli::try_parse_from(["notification-relay"]).unwrap();
        assert!(cli.run.config.is_none());
        assert!(!cli.run.dry_run);
        assert!(!cli.run.once);
    }

    #[test]
    fn test_run_args_flags() {
        let cli = TestCli::try_parse_from([
            "notification-relay",
            "-c",
            "/etc/relay/config.yml",
            "--dry-run",
            "--once",
            "--api-url",
            "https://github.example.com/api/v3",
        ])
        .unwrap();
        assert_eq!(cli.run.config, Some(PathBuf::from("/etc/relay/config.yml")));
        assert!(cli.run.dry_run);
        assert!(cli.run.once);
        assert_eq!(cli.run.api_url, "https://github.example.com/api/v3");
    }
}
