//! 通知来源 - 拉取通知列表和单条通知的详情
//!
//! 轮询循环只依赖 `NotificationSource` trait，不依赖具体的 API schema。

pub mod github;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use github::{GitHubClient, GitHubConfig};

/// 通知主体（issue、PR、release 等）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub title: String,
    /// 主体 API 地址
    #[serde(default)]
    pub url: Option<String>,
    /// 最新评论 API 地址
    #[serde(default)]
    pub latest_comment_url: Option<String>,
    /// 主体类型，如 "Issue"、"PullRequest"
    #[serde(rename = "type", default)]
    pub subject_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 仓库展示信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub owner: Owner,
}

/// 一条通知，拉取后不可变，只在当前轮次内使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub reason: String,
    #[serde(default)]
    pub unread: bool,
    pub subject: Subject,
    #[serde(default)]
    pub repository: RepositoryMeta,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    /// 详情地址：优先最新评论，否则使用主体本身
    pub fn detail_reference(&self) -> Option<&str> {
        let non_empty: fn(&Option<String>) -> Option<&str> = |url| url.as_deref().filter(|url| !url.is_empty());
        non_empty(&self.subject.latest_comment_url).or_else(|| non_empty(&self.subject.url))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailAuthor {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 评论或主体详情
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentDetail {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<DetailAuthor>,
}

/// 通知来源
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// 拉取 `since` 之后的通知；`since` 为 None 时不限制时间
    async fn list_notifications(
        &self,
        since: Option<DateTime<Utc>>,
        all: bool,
    ) -> Result<Vec<NotificationRecord>>;

    /// 拉取单条通知的详情
    async fn fetch_detail(&self, reference: &str) -> Result<CommentDetail>;
}
