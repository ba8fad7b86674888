//! Aggregate cpu counter source.
//!
//! The kernel exposes cumulative per-state cpu time in `/proc/stat`; the
//! first line holds the aggregate for all cores:
//!
//!   cpu  user nice system idle iowait irq softirq steal [guest guest_nice]
//!
//! The counters are monotonic and only meaningful as a difference between
//! two captures. Trailing columns and every other line are ignored.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// One capture of the aggregate cpu time counters, in kernel tick units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

#[derive(Debug, Error)]
pub enum StatError {
    /// The counter file could not be opened or read.
    #[error("cpu counter source unavailable: {0}")]
    Unavailable(#[from] io::Error),
    /// The first record did not match the expected aggregate cpu line.
    #[error("malformed aggregate cpu line: {0:?}")]
    Parse(String),
}

impl CpuSnapshot {
    /// Parses the aggregate `cpu` line of `/proc/stat`.
    pub fn parse(line: &str) -> Result<Self, StatError> {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("cpu") {
            return Err(StatError::Parse(line.to_string()));
        }

        let mut counters = [0u64; 8];
        for slot in &mut counters {
            *slot = fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| StatError::Parse(line.to_string()))?;
        }

        let [user, nice, system, idle, iowait, irq, softirq, steal] = counters;
        Ok(Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        })
    }

    /// Ticks spent idle or waiting on i/o.
    pub fn idle_ticks(&self) -> u128 {
        self.idle as u128 + self.iowait as u128
    }

    /// Ticks spent doing work of any kind.
    pub fn active_ticks(&self) -> u128 {
        self.user as u128
            + self.nice as u128
            + self.system as u128
            + self.irq as u128
            + self.softirq as u128
            + self.steal as u128
    }

    pub fn total_ticks(&self) -> u128 {
        self.idle_ticks() + self.active_ticks()
    }
}

/// A provider of cpu counter snapshots.
pub trait CounterSource: Send + Sync {
    fn capture(&self) -> Result<CpuSnapshot, StatError>;
}

/// Counters backed by a `/proc/stat`-shaped file.
#[derive(Debug, Clone)]
pub struct ProcStat {
    path: PathBuf,
}

impl ProcStat {
    pub const PROC_STAT: &str = "/proc/stat";

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::at(Self::PROC_STAT)
    }
}

impl CounterSource for ProcStat {
    fn capture(&self) -> Result<CpuSnapshot, StatError> {
        let content = fs::read_to_string(&self.path)?;
        let first = content
            .lines()
            .next()
            .ok_or_else(|| StatError::Parse(String::new()))?;
        CpuSnapshot::parse(first)
    }
}
