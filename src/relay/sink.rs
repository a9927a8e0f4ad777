//! 消息投递 - webhook 客户端和 dry-run 渠道

use super::message::DeliveryMessage;
use crate::error::{body_excerpt, RelayError};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, trace, warn};

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（如 dry-run）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 投递渠道
///
/// 每次调用只做一次 POST，不重试。
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    async fn send(&self, message: &DeliveryMessage) -> Result<SendResult>;
}

/// Webhook 配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// 目标地址
    pub url: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: 30,
        }
    }
}

/// Discord 兼容的 webhook 渠道
#[derive(Debug)]
pub struct WebhookSink {
    client: Client,
    config: WebhookConfig,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(RelayError::MissingEndpoint(crate::config::WEBHOOK_ENV).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RelayError::Http)?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &DeliveryMessage) -> Result<SendResult> {
        let response = match self.client.post(&self.config.url).json(message).send().await {
            Ok(response) => response,
            Err(e) => return Ok(SendResult::Failed(format!("HTTP request failed: {}", e))),
        };

        let status = response.status();
        if status.is_success() {
            trace!(status = status.as_u16(), "Webhook accepted message");
            return Ok(SendResult::Sent);
        }

        let body = response.text().await.unwrap_or_default();
        let error = RelayError::Delivery {
            status: status.as_u16(),
            body: body_excerpt(&body),
        };
        Ok(SendResult::Failed(error.to_string()))
    }
}

/// dry-run 渠道：只记录日志，不发送
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, message: &DeliveryMessage) -> Result<SendResult> {
        match serde_json::to_string(message) {
            Ok(json) => info!(payload = %json, "[DRY-RUN] Would send webhook"),
            Err(e) => warn!(error = %e, "[DRY-RUN] Cannot serialize message"),
        }
        Ok(SendResult::Skipped("dry-run".to_string()))
    }
}
