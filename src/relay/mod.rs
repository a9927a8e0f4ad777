//! 通知转发 - 过滤、构建、投递和轮询循环
//!
//! # 组成
//! 1. `filter`：按配置的原因过滤通知
//! 2. `message`：把通知转换为 webhook 消息
//! 3. `sink`：投递消息，失败互不影响
//! 4. `poll_loop`：控制节奏、推进 cursor、编排以上三步

pub mod filter;
pub mod message;
pub mod poll_loop;
pub mod sink;

pub use filter::allowed;
pub use message::{CommentMessageBuilder, DeliveryMessage, Embed, EmbedThumbnail, MessageBuilder, truncate_with_link};
pub use poll_loop::{Clock, CycleReport, PollCursor, PollLoop, SystemClock, remaining_sleep};
pub use sink::{DeliverySink, LogSink, SendResult, WebhookConfig, WebhookSink};
