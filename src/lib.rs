//! Notification Relay - 轮询 GitHub 通知并转发到 webhook

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod source;

pub use config::{LoopConfig, NotificationReason, ReasonSet, RelayConfig};
pub use error::RelayError;
pub use relay::{
    CommentMessageBuilder, CycleReport, DeliveryMessage, DeliverySink, LogSink, MessageBuilder,
    PollCursor, PollLoop, SendResult, WebhookConfig, WebhookSink,
};
pub use source::{CommentDetail, GitHubClient, GitHubConfig, NotificationRecord, NotificationSource};
