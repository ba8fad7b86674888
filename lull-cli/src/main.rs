//! Headless readout loop: prints instantaneous cpu utilization on one
//! rewritten line and rings the terminal bell when usage is low. No
//! rolling window, no alert gate — just the calculator on a timer.

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::warn;

use lulld::stat::{CounterSource, ProcStat};
use lulld::usage::utilization;

#[derive(Parser, Debug)]
#[clap(about = "Per-second CPU utilization readout with a low-usage bell")]
struct Args {
    /// Path of the cumulative cpu counter file.
    #[clap(long, default_value = ProcStat::PROC_STAT)]
    stat_path: PathBuf,

    /// Seconds between samples.
    #[clap(long, default_value_t = 1)]
    interval: u64,

    /// Usage at or below this percentage rings the bell.
    #[clap(long, default_value_t = 30.0)]
    threshold: f64,

    /// Number of samples to print before exiting; runs forever when omitted.
    #[clap(long)]
    count: Option<u64>,

    /// Suppress the terminal bell.
    #[clap(long)]
    no_bell: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source = ProcStat::at(&args.stat_path);
    // The baseline must exist before any reading; a missing source at
    // startup is a hard error rather than something to retry silently.
    let mut prev = source.capture()?;
    let mut printed = 0u64;

    loop {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        thread::sleep(Duration::from_secs(args.interval));

        let curr = match source.capture() {
            Ok(curr) => curr,
            Err(err) => {
                warn!("[lull] skipping sample: {err}");
                continue;
            }
        };
        let pct = utilization(&prev, &curr);

        print!("\rcpu utilization: {pct:6.2}% ");
        if !args.no_bell && pct <= args.threshold {
            print!("\x07");
        }
        io::stdout().flush()?;

        prev = curr;
        printed += 1;
    }

    println!();
    Ok(())
}
