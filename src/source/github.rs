//! GitHub REST API 客户端
//!
//! 只实现轮询需要的三个调用：鉴权检查、通知列表、详情。

use super::{CommentDetail, NotificationRecord, NotificationSource};
use crate::error::{body_excerpt, RelayError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

/// GitHub API 基础 URL
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// 每页通知数量（GitHub 上限 50）
pub const PER_PAGE: usize = 50;

/// GitHub 客户端配置
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API 基础 URL（测试时指向 mock server）
    pub api_url: String,
    /// Personal Access Token
    pub token: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// GitHub 通知来源
#[derive(Debug)]
pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(RelayError::MissingCredential(crate::config::TOKEN_ENV).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("notification-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RelayError::Http)?;

        Ok(Self { client, config })
    }

    /// 启动时检查 token 是否有效
    pub async fn check_authorization(&self) -> Result<()> {
        let url = format!("{}/user", self.base());
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RelayError::Authorization(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Authorization(format!(
                "{} {}",
                status.as_u16(),
                body_excerpt(&body)
            ))
            .into());
        }

        debug!("GitHub authorization check passed");
        Ok(())
    }

    fn base(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn fetch_page(
        &self,
        since: Option<DateTime<Utc>>,
        all: bool,
        page: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let url = format!("{}/notifications", self.base());
        let mut query = vec![
            ("all", all.to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        trace!(url = %url, ?query, "Listing notifications");
        let response = self
            .authorized(self.client.get(&url))
            .query(&query)
            .send()
            .await?;

        parse_json(response).await
    }
}

#[async_trait]
impl NotificationSource for GitHubClient {
    async fn list_notifications(
        &self,
        since: Option<DateTime<Utc>>,
        all: bool,
    ) -> Result<Vec<NotificationRecord>> {
        let mut notifications = Vec::new();
        let mut page = 1;

        // 必须取完所有页：cursor 随后会推进到本轮开始时间，漏掉的页不会再被拉到
        loop {
            let batch = self.fetch_page(since, all, page).await?;
            let count = batch.len();
            notifications.extend(batch);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(pages = page, count = notifications.len(), "Listed notifications");
        Ok(notifications)
    }

    async fn fetch_detail(&self, reference: &str) -> Result<CommentDetail> {
        trace!(url = %reference, "Fetching notification detail");
        let response = self.authorized(self.client.get(reference)).send().await?;
        parse_json(response).await
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Source {
            status: status.as_u16(),
            body: body_excerpt(&body),
        }
        .into());
    }

    Ok(response.json::<T>().await?)
}
