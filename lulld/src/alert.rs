//! Low-usage alarm and alert delivery.

use std::io::{self, Write};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::AlertConfig;

/// Tracks consecutive low-usage samples and decides when to raise the alarm.
///
/// A sample exactly at the threshold counts as low; only usage strictly
/// above it resets the streak. Firing also resets the streak, so a single
/// sustained low period raises exactly one alarm per `trigger` samples.
#[derive(Debug, Clone)]
pub struct IdleAlarm {
    threshold: f64,
    trigger: u32,
    streak: u32,
}

impl IdleAlarm {
    pub fn new(threshold: f64, trigger: u32) -> Self {
        Self {
            threshold,
            trigger,
            streak: 0,
        }
    }

    /// Feeds one utilization sample; returns true when the alarm fires.
    pub fn observe(&mut self, sample: f64) -> bool {
        if sample > self.threshold {
            self.streak = 0;
            return false;
        }
        self.streak += 1;
        if self.streak >= self.trigger {
            self.streak = 0;
            true
        } else {
            false
        }
    }

    /// Current consecutive-low count, for display.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn trigger(&self) -> u32 {
        self.trigger
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert command failed to run: {0}")]
    Spawn(#[from] io::Error),
    #[error("alert command exited with {0}")]
    Exit(ExitStatus),
}

/// Delivers an alert. Failure here must never stop the sampling loop.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self) -> Result<(), SinkError>;
}

/// Rings the terminal bell.
#[derive(Debug, Default)]
pub struct BellSink;

#[async_trait]
impl AlertSink for BellSink {
    async fn notify(&self) -> Result<(), SinkError> {
        let mut stdout = io::stdout();
        stdout.write_all(b"\x07")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Runs an external command, e.g. a sound player.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AlertSink for CommandSink {
    async fn notify(&self) -> Result<(), SinkError> {
        let status = Command::new(&self.program).args(&self.args).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(SinkError::Exit(status))
        }
    }
}

/// Builds the sink described by the configuration; the terminal bell when
/// no command is configured.
pub fn sink_for(config: &AlertConfig) -> Arc<dyn AlertSink> {
    match config.command.as_deref() {
        Some([program, args @ ..]) => Arc::new(CommandSink::new(program.clone(), args.to_vec())),
        _ => Arc::new(BellSink),
    }
}
