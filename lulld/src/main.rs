use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};

use lulld::{Config, Monitor};

#[derive(Parser, Debug)]
#[clap(about = "CPU idle-alert daemon")]
struct Args {
    /// Path to a TOML configuration file; built-in defaults when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Emit status updates as JSON lines instead of plain text.
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut monitor = Monitor::new(config);
    let mut status_rx = monitor.subscribe();
    let mut instant_rx = monitor.instant();
    monitor.start()?;

    let json = args.json;
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if json {
                match serde_json::to_string(&status) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("[lulld] failed to serialize status: {err}"),
                }
            } else {
                println!("{status}");
            }
        }
    });
    let readout = tokio::spawn(async move {
        while instant_rx.changed().await.is_ok() {
            debug!("[instant] cpu {:.1}%", *instant_rx.borrow_and_update());
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("[lulld] shutting down");
    monitor.stop().await?;

    printer.abort();
    readout.abort();
    Ok(())
}
