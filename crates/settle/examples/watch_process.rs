//! Watch a child process until it exits
//!
//! Spawns a command and reports how it finished: success, a non-zero exit
//! code, or the signal that killed it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example watch_process -- sh -c "exit 3"
//!
//! # Kill anything still running after two seconds
//! SETTLE_TIMEOUT_MS=2000 cargo run --example watch_process -- sleep 10
//!
//! # See the tracker's own events
//! RUST_LOG=settle=debug cargo run --example watch_process -- true
//! ```

use anyhow::Context;
use settle::{CompletionConfig, finished};
use settle_transport::{ProcessConfig, ProcessHandle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let program = args.next().context("usage: watch_process <program> [args...]")?;
    let mut config = ProcessConfig::new(program)
        .with_args(args)
        .with_inherited_output();
    if let Ok(ms) = std::env::var("SETTLE_TIMEOUT_MS") {
        let ms: u64 = ms.parse().context("SETTLE_TIMEOUT_MS must be a number")?;
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let process = ProcessHandle::spawn(config).await?;
    println!("spawned pid {:?}", process.pid());

    match finished(&process, CompletionConfig::default())?.await {
        Ok(()) => println!("process finished successfully"),
        Err(err) if err.is_process_exit() => {
            let (code, signal) = (err.exit_code(), err.signal());
            println!("process failed: {} (code {:?}, signal {:?})", err, code, signal);
        }
        Err(err) => return Err(err).context("watching process"),
    }
    Ok(())
}
