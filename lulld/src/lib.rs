//! lull: a CPU idle-alert daemon.
//!
//! Samples the aggregate cpu counters from `/proc/stat` once a second,
//! keeps a rolling window of utilization readings, and fires an alert once
//! usage has stayed at or below a threshold for a sustained stretch — the
//! inverse of the usual overload monitor: it tells you when the machine
//! has gone quiet.

pub mod alert;
pub mod config;
pub mod monitor;
pub mod stat;
pub mod usage;
pub mod window;

pub use alert::{AlertSink, BellSink, CommandSink, IdleAlarm, SinkError};
pub use config::{AlertConfig, Config};
pub use monitor::{Monitor, SessionError, Status};
pub use stat::{CounterSource, CpuSnapshot, ProcStat, StatError};
pub use window::RollingWindow;
