//! Notification Relay CLI
//!
//! 轮询 GitHub 通知，按原因过滤后转发到 Discord 兼容的 webhook

use clap::Parser;
use notification_relay::cli::{handle_run, RunArgs};
use notification_relay::logging::{self, LogArgs};
use tracing::{debug, error, trace};

#[derive(Parser)]
#[command(name = "notification-relay")]
#[command(about = "Get notifications and relay them as webhook POSTs")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbosity = cli.log.verbosity();
    logging::init(verbosity);
    trace!(flags = ?cli.log, "Verbosity flags");
    debug!(level = %verbosity.level(), "Log level set");

    if let Err(e) = handle_run(cli.run).await {
        error!(error = %format!("{:#}", e), "Error running relay");
        std::process::exit(1);
    }
}
