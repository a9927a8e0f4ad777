//! 轮询循环
//!
//! 每一轮：记录开始时间 t0 → 拉取 cursor 之后的通知 → 按原因过滤 →
//! 逐条构建并投递（每条之后暂停 message_delay）→ cursor 设为 t0 →
//! 睡眠 `poll_interval - 本轮耗时`（不小于 0）。
//!
//! cursor 使用 t0 而不是本轮结束时间：处理期间新产生的通知会在下一轮再次被拉到，
//! 代价是竞争窗口内的通知可能重复投递，但不会丢失。

use super::filter;
use super::message::MessageBuilder;
use super::sink::{DeliverySink, SendResult};
use crate::config::LoopConfig;
use crate::source::{NotificationRecord, NotificationSource};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// 墙上时钟，测试时可替换
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 增量拉取游标：此时刻之后的通知尚未处理
///
/// 初始为零值，表示不限制时间。只保存在内存中。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCursor(Option<DateTime<Utc>>);

impl PollCursor {
    pub fn zero() -> Self {
        Self(None)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// 传给通知来源的 since 参数
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    fn advance_to(&mut self, cycle_start: DateTime<Utc>) {
        self.0 = Some(cycle_start);
    }
}

/// 单轮统计
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 本轮开始的墙上时间（即新的 cursor）
    pub started_at: DateTime<Utc>,
    /// 拉取是否失败
    pub fetch_failed: bool,
    /// 拉取到的通知数
    pub fetched: usize,
    /// 通过原因过滤的通知数
    pub allowed: usize,
    /// 构建器跳过或失败的通知数
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    /// 被 dry-run 等渠道跳过的消息数
    pub not_sent: usize,
    /// 是否因关闭信号提前结束
    pub interrupted: bool,
    /// 本轮耗时（拉取到投递结束）
    pub elapsed: Duration,
    /// 本轮结束后应睡眠的时间
    pub sleep: Duration,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            fetch_failed: false,
            fetched: 0,
            allowed: 0,
            skipped: 0,
            sent: 0,
            failed: 0,
            not_sent: 0,
            interrupted: false,
            elapsed: Duration::ZERO,
            sleep: Duration::ZERO,
        }
    }
}

/// 剩余睡眠时间，本轮超时则为 0
pub fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// 轮询循环，独占 cursor
pub struct PollLoop {
    config: LoopConfig,
    source: Arc<dyn NotificationSource>,
    builder: Arc<dyn MessageBuilder>,
    sink: Arc<dyn DeliverySink>,
    clock: Arc<dyn Clock>,
    cursor: PollCursor,
    cycles: u64,
}

impl PollLoop {
    pub fn new(
        config: LoopConfig,
        source: Arc<dyn NotificationSource>,
        builder: Arc<dyn MessageBuilder>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            config,
            source,
            builder,
            sink,
            clock: Arc::new(SystemClock),
            cursor: PollCursor::zero(),
            cycles: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cursor(&self) -> PollCursor {
        self.cursor
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// 持续运行直到收到关闭信号
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let span = info_span!("poll_loop", sink = self.sink.name());
        async {
            debug!(
                interval = ?self.config.poll_interval,
                delay = ?self.config.message_delay,
                reasons = self.config.reasons.len(),
                "Starting loop"
            );

            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                let report = self.run_cycle(&shutdown).await;
                debug!(elapsed = ?report.elapsed, sleep = ?report.sleep, "Loop finished, sleeping for the remainder");

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(report.sleep) => {}
                }
            }

            info!(cycles = self.cycles, "Poll loop stopped");
        }
        .instrument(span)
        .await;

        Ok(())
    }

    /// 执行一轮：拉取、过滤、投递，然后推进 cursor
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleReport {
        self.cycles += 1;
        let span = info_span!("cycle", n = self.cycles);
        self.cycle_inner(shutdown).instrument(span).await
    }

    async fn cycle_inner(&mut self, shutdown: &CancellationToken) -> CycleReport {
        let started_at = self.clock.now();
        let start = Instant::now();
        let mut report = CycleReport::new(started_at);

        let notifications = match self
            .source
            .list_notifications(self.cursor.since(), self.config.allow_unread)
            .await
        {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!(error = %e, "Error when listing notifications");
                report.fetch_failed = true;
                Vec::new()
            }
        };
        report.fetched = notifications.len();

        if notifications.is_empty() {
            debug!("No new notifications");
        } else {
            let allowed: Vec<NotificationRecord> = notifications
                .into_iter()
                .filter(|n| {
                    trace!(id = %n.id, reason = %n.reason, "Checking notification reason");
                    filter::allowed(&n.reason, &self.config.reasons)
                })
                .collect();
            report.allowed = allowed.len();
            debug!(count = allowed.len(), "Have notifications to relay");

            self.deliver_all(&allowed, shutdown, &mut report).await;
        }

        report.elapsed = start.elapsed();
        self.cursor.advance_to(started_at);
        report.sleep = remaining_sleep(self.config.poll_interval, report.elapsed);

        if report.sleep.is_zero() {
            warn!(elapsed = ?report.elapsed, interval = ?self.config.poll_interval, "Cycle overran the poll interval");
        }

        report
    }

    async fn deliver_all(
        &self,
        notifications: &[NotificationRecord],
        shutdown: &CancellationToken,
        report: &mut CycleReport,
    ) {
        for notification in notifications {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let message = match self.builder.build(notification).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(id = %notification.id, "Builder skipped notification");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    info!(id = %notification.id, error = %e, "Error building message, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            trace!(id = %notification.id, ?message, "Sending");
            match self.sink.send(&message).await {
                Ok(SendResult::Sent) => {
                    debug!(id = %notification.id, "Message sent");
                    report.sent += 1;
                }
                Ok(SendResult::Skipped(reason)) => {
                    debug!(id = %notification.id, reason = %reason, "Message not sent");
                    report.not_sent += 1;
                }
                Ok(SendResult::Failed(e)) => {
                    error!(id = %notification.id, sink = self.sink.name(), error = %e, "Error sending webhook payload");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(id = %notification.id, sink = self.sink.name(), error = %e, "Error sending webhook payload");
                    report.failed += 1;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                _ = sleep(self.config.message_delay) => {}
            }
        }
    }
}
