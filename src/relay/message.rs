//! 消息构建 - 把一条通知和它的详情转换为 webhook 消息

use crate::source::{CommentDetail, NotificationRecord, NotificationSource};
use anyhow::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, trace};

/// webhook 显示的用户名
pub const DISPLAY_NAME: &str = "Notification Relay";

/// 正文最大长度（字符）
pub const MAX_BODY_CHARS: usize = 1000;

/// Embed 缩略图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

/// 富文本块
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
}

/// POST 到 webhook 的消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMessage {
    pub username: String,
    #[serde(rename = "avatar_url", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(rename = "embeds", skip_serializing_if = "Vec::is_empty", default)]
    pub embeds: Vec<Embed>,
}

impl DeliveryMessage {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            avatar: None,
            embeds: Vec::new(),
        }
    }

    pub fn with_avatar(mut self, avatar: Option<String>) -> Self {
        self.avatar = avatar;
        self
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }
}

/// 消息构建器
///
/// 返回 `Ok(None)` 表示跳过这条通知。实现不应 panic；
/// 返回的错误由轮询循环记录后跳过该条。
#[async_trait]
pub trait MessageBuilder: Send + Sync {
    async fn build(&self, record: &NotificationRecord) -> Result<Option<DeliveryMessage>>;
}

/// 超过上限时截断正文并追加网页链接
pub fn truncate_with_link(body: &str, url: &str, max_chars: usize) -> String {
    // 恰好 max_chars 个字符也追加链接
    if body.chars().count() < max_chars {
        return body.to_string();
    }

    let end = body
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(body.len());
    format!("{}{}", &body[..end], fallback_link(url))
}

fn fallback_link(url: &str) -> String {
    format!("\n\n**[Click Here]({})** to view message in web browser", url)
}

/// 基于评论详情的构建器
pub struct CommentMessageBuilder {
    source: Arc<dyn NotificationSource>,
}

impl CommentMessageBuilder {
    pub fn new(source: Arc<dyn NotificationSource>) -> Self {
        Self { source }
    }

    /// 由通知和详情组装消息
    pub fn compose(&self, record: &NotificationRecord, detail: &CommentDetail) -> DeliveryMessage {
        let html_url = detail.html_url.clone().unwrap_or_default();
        let body = detail.body.as_deref().unwrap_or_default();

        let embed = Embed {
            title: format!("New {}", record.subject.subject_type),
            url: detail.html_url.clone(),
            description: truncate_with_link(body, &html_url, MAX_BODY_CHARS),
            timestamp: detail
                .updated_at
                .or(record.updated_at)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            thumbnail: detail
                .user
                .as_ref()
                .and_then(|u| u.avatar_url.clone())
                .map(|url| EmbedThumbnail { url }),
        };

        DeliveryMessage::new(DISPLAY_NAME)
            .with_avatar(record.repository.owner.avatar_url.clone())
            .with_embed(embed)
    }
}

#[async_trait]
impl MessageBuilder for CommentMessageBuilder {
    async fn build(&self, record: &NotificationRecord) -> Result<Option<DeliveryMessage>> {
        let Some(reference) = record.detail_reference() else {
            info!(id = %record.id, subject = %record.subject.subject_type, "Notification has no detail URL, skipping");
            return Ok(None);
        };

        let detail = self.source.fetch_detail(reference).await?;
        trace!(id = %record.id, ?detail, "Fetched notification detail");
        Ok(Some(self.compose(record, &detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DetailAuthor, Owner, RepositoryMeta, Subject};
    use chrono::{TimeZone, Utc};

    fn record() -> NotificationRecord {
        NotificationRecord {
            id: "1".to_string(),
            reason: "mention".to_string(),
            unread: true,
            subject: Subject {
                title: "Bug".to_string(),
                url: Some("https://api.github.com/repos/o/r/issues/1".to_string()),
                latest_comment_url: Some("https://api.github.com/repos/o/r/issues/comments/9".to_string()),
                subject_type: "Issue".to_string(),
            },
            repository: RepositoryMeta {
                full_name: "o/r".to_string(),
                owner: Owner {
                    login: "o".to_string(),
                    avatar_url: Some("https://avatars/o".to_string()),
                },
            },
            updated_at: None,
        }
    }

    fn detail(body: &str) -> CommentDetail {
        CommentDetail {
            body: Some(body.to_string()),
            html_url: Some("https://github.com/o/r/issues/1#issuecomment-9".to_string()),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            user: Some(DetailAuthor {
                login: "alice".to_string(),
                avatar_url: Some("https://avatars/alice".to_string()),
            }),
        }
    }

    struct NoSource;

    #[async_trait]
    impl NotificationSource for NoSource {
        async fn list_notifications(
            &self,
            _since: Option<chrono::DateTime<Utc>>,
            _all: bool,
        ) -> Result<Vec<NotificationRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_detail(&self, _reference: &str) -> Result<CommentDetail> {
            anyhow::bail!("detail unavailable")
        }
    }

    #[test]
    fn test_short_body_unchanged() {
        let body = "a".repeat(999);
        assert_eq!(truncate_with_link(&body, "https://x", 1000), body);
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "a".repeat(1200);
        let result = truncate_with_link(&body, "https://x", 1000);
        assert_eq!(
            result,
            format!("{}\n\n**[Click Here](https://x)** to view message in web browser", "a".repeat(1000))
        );
    }

    #[test]
    fn test_exact_length_gets_link() {
        let body = "a".repeat(1000);
        let result = truncate_with_link(&body, "https://x", 1000);
        assert!(result.starts_with(&body));
        assert!(result.ends_with("to view message in web browser"));
    }

    #[test]
    fn test_truncate_multibyte() {
        let body = "通知".repeat(600);
        let result = truncate_with_link(&body, "https://x", 1000);
        let kept: String = body.chars().take(1000).collect();
        assert!(result.starts_with(&kept));
        assert!(result.contains("**[Click Here](https://x)**"));
    }

    #[test]
    fn test_compose() {
        let builder = CommentMessageBuilder::new(Arc::new(NoSource));
        let message = builder.compose(&record(), &detail("hello"));

        assert_eq!(message.username, "Notification Relay");
        assert_eq!(message.avatar.as_deref(), Some("https://avatars/o"));
        assert_eq!(message.embeds.len(), 1);

        let embed = &message.embeds[0];
        assert_eq!(embed.title, "New Issue");
        assert_eq!(embed.description, "hello");
        assert_eq!(embed.timestamp.as_deref(), Some("2024-01-02T03:04:05Z"));
        assert_eq!(embed.thumbnail.as_ref().map(|t| t.url.as_str()), Some("https://avatars/alice"));
    }

    #[test]
    fn test_compose_truncates_at_max_body_chars() {
        let builder = CommentMessageBuilder::new(Arc::new(NoSource));
        let long = "b".repeat(MAX_BODY_CHARS + 1);
        let message = builder.compose(&record(), &detail(&long));

        let description = &message.embeds[0].description;
        assert!(description.starts_with(&"b".repeat(MAX_BODY_CHARS)));
        assert!(!description.starts_with(&"b".repeat(MAX_BODY_CHARS + 1)));
        assert!(description.ends_with("to view message in web browser"));
    }

    #[test]
    fn test_serialized_shape() {
        let message = DeliveryMessage::new("Notification Relay").with_embed(Embed {
            title: "New Issue".to_string(),
            description: "hi".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["username"], "Notification Relay");
        assert!(json.get("avatar_url").is_none());
        assert_eq!(json["embeds"][0]["title"], "New Issue");
        assert!(json["embeds"][0].get("thumbnail").is_none());
    }

    #[tokio::test]
    async fn test_build_without_reference_skips() {
        let builder = CommentMessageBuilder::new(Arc::new(NoSource));
        let mut r = record();
        r.subject.url = None;
        r.subject.latest_comment_url = None;

        assert!(builder.build(&r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_propagates_detail_error() {
        let builder = CommentMessageBuilder::new(Arc::new(NoSource));
        assert!(builder.build(&record()).await.is_err());
    }
}
