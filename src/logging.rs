//! 日志初始化
//!
//! 日志级别只在启动时根据命令行决定一次，之后不再修改。

use clap::builder::FalseyValueParser;
use clap::Args;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// 日志相关的命令行参数
///
/// 环境变量按 "falsey" 规则解析：未设置、空串、`0`、`false`、`no`、`off` 为假，其余为真。
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// 输出 trace 日志
    #[arg(long, short, env = "LOG_LEVEL_TRACE", value_parser = FalseyValueParser::new())]
    pub trace: bool,

    /// 输出 debug 日志
    #[arg(long, short, env = "LOG_LEVEL_DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// 输出 info 日志
    #[arg(long, env = "LOG_LEVEL_INFO", value_parser = FalseyValueParser::new())]
    pub verbose: bool,
}

impl LogArgs {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.trace, self.debug, self.verbose)
    }
}

/// 命令行选择的详细程度，优先级 trace > debug > verbose > 默认(warn)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Warn,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn from_flags(trace: bool, debug: bool, verbose: bool) -> Self {
        if trace {
            Verbosity::Trace
        } else if debug {
            Verbosity::Debug
        } else if verbose {
            Verbosity::Info
        } else {
            Verbosity::Warn
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }

    /// 默认的过滤指令（`RUST_LOG` 未设置时使用）
    pub fn directive(&self) -> String {
        let level = self.level().as_str().to_lowercase();
        format!("notification_relay={level},warn")
    }
}

/// 初始化全局 subscriber，`RUST_LOG` 优先于命令行参数
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
