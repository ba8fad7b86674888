//! Background sampling session.
//!
//! One spawned task owns the previous snapshot, the rolling window and the
//! alarm; nothing else reads or writes them. The foreground interacts with
//! a session only through [`Monitor::start`]/[`Monitor::stop`] and the
//! watch channels, so status updates always arrive on the consumer's own
//! execution context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::alert::{self, AlertSink, IdleAlarm};
use crate::config::Config;
use crate::stat::{CounterSource, CpuSnapshot, ProcStat};
use crate::usage::utilization;
use crate::window::RollingWindow;

/// The most recent state of a sampling session, published after each tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    /// No session is running.
    Idle,
    /// Sampling, but the window has not filled yet.
    Collecting {
        current: f64,
        filled: usize,
        window: usize,
    },
    /// The window is full and the rolling average is meaningful.
    Steady {
        current: f64,
        average: f64,
        low_streak: u32,
        trigger: u32,
    },
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("monitoring stopped"),
            Status::Collecting {
                current,
                filled,
                window,
            } => write!(f, "current: {current:.1}% | collecting {filled}/{window}"),
            Status::Steady {
                current,
                average,
                low_streak,
                trigger,
            } => write!(
                f,
                "current: {current:.1}% | avg: {average:.1}% | low streak: {low_streak}/{trigger}"
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a monitoring session is already running")]
    AlreadyRunning,
    #[error("no monitoring session is running")]
    NotRunning,
}

/// Per-tick state owned by the sampler task: the previous snapshot, the
/// window, and the alarm.
struct Engine {
    prev: Option<CpuSnapshot>,
    window: RollingWindow,
    alarm: IdleAlarm,
}

struct TickReport {
    status: Status,
    fire: bool,
}

impl Engine {
    fn new(config: &Config) -> Self {
        Self {
            prev: None,
            window: RollingWindow::new(config.window),
            alarm: IdleAlarm::new(config.low_threshold, config.trigger),
        }
    }

    /// Folds one capture in. The first capture only establishes the
    /// baseline and yields no report.
    fn ingest(&mut self, curr: CpuSnapshot) -> Option<TickReport> {
        let prev = match self.prev.replace(curr) {
            Some(prev) => prev,
            None => return None,
        };

        let current = utilization(&prev, &curr);
        self.window.push(current);
        let fire = self.alarm.observe(current);

        let status = match self.window.average() {
            Some(average) => Status::Steady {
                current,
                average,
                low_streak: self.alarm.streak(),
                trigger: self.alarm.trigger(),
            },
            None => Status::Collecting {
                current,
                filled: self.window.len(),
                window: self.window.capacity(),
            },
        };

        Some(TickReport { status, fire })
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    sampler: JoinHandle<()>,
    instant: JoinHandle<()>,
}

/// A cpu monitoring session: owns the configuration and the channels,
/// and runs at most one background sampler at a time.
pub struct Monitor {
    config: Config,
    source: Arc<dyn CounterSource>,
    sink: Arc<dyn AlertSink>,
    status_tx: watch::Sender<Status>,
    instant_tx: watch::Sender<f64>,
    running: Option<Running>,
}

impl Monitor {
    pub fn new(config: Config) -> Self {
        let source: Arc<dyn CounterSource> = Arc::new(ProcStat::at(config.stat_path.clone()));
        let sink = alert::sink_for(&config.alert);
        Self::with_parts(config, source, sink)
    }

    /// Constructor with injected source and sink, for embedding and tests.
    pub fn with_parts(
        config: Config,
        source: Arc<dyn CounterSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (status_tx, _) = watch::channel(Status::Idle);
        let (instant_tx, _) = watch::channel(0.0);
        Self {
            config,
            source,
            sink,
            status_tx,
            instant_tx,
            running: None,
        }
    }

    /// Receiver for per-tick session status updates.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Receiver for the instantaneous utilization readout. This is a
    /// read-only projection with its own baseline; it never touches the
    /// window or the alarm.
    pub fn instant(&self) -> watch::Receiver<f64> {
        self.instant_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the sampler and instant-readout tasks.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sampler = tokio::spawn(run_sampler(
            Engine::new(&self.config),
            self.config.interval(),
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            self.status_tx.clone(),
            shutdown_rx.clone(),
        ));
        let instant = tokio::spawn(run_instant(
            self.config.instant_interval(),
            Arc::clone(&self.source),
            self.instant_tx.clone(),
            shutdown_rx,
        ));

        self.running = Some(Running {
            shutdown: shutdown_tx,
            sampler,
            instant,
        });
        info!(
            "[monitor] sampling every {}s (low <= {:.1}%, alert after {} samples)",
            self.config.interval_secs, self.config.low_threshold, self.config.trigger
        );
        Ok(())
    }

    /// Signals the background tasks to finish their current tick and waits
    /// for both to exit before returning.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(Running {
            shutdown,
            sampler,
            instant,
        }) = self.running.take()
        else {
            return Err(SessionError::NotRunning);
        };

        let _ = shutdown.send(true);
        if let Err(err) = sampler.await {
            error!("[monitor] sampler task failed: {err}");
        }
        if let Err(err) = instant.await {
            error!("[monitor] instant task failed: {err}");
        }

        self.status_tx.send_replace(Status::Idle);
        info!("[monitor] sampling stopped");
        Ok(())
    }
}

async fn run_sampler(
    mut engine: Engine,
    period: Duration,
    source: Arc<dyn CounterSource>,
    sink: Arc<dyn AlertSink>,
    status_tx: watch::Sender<Status>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match source.capture() {
                    Ok(snapshot) => {
                        let Some(TickReport { status, fire }) = engine.ingest(snapshot) else {
                            continue;
                        };
                        status_tx.send_replace(status);
                        if fire {
                            info!("[monitor] sustained low cpu usage detected");
                            if let Err(err) = sink.notify().await {
                                warn!("[monitor] alert delivery failed: {err}");
                            }
                        }
                    }
                    // A failed capture skips the tick entirely: the window
                    // and alarm are left untouched and the previous
                    // snapshot stays authoritative for the next attempt.
                    Err(err) => warn!("[monitor] skipping sample: {err}"),
                }
            }
        }
    }
    debug!("[monitor] sampler exited");
}

async fn run_instant(
    period: Duration,
    source: Arc<dyn CounterSource>,
    instant_tx: watch::Sender<f64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut prev: Option<CpuSnapshot> = None;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match source.capture() {
                    Ok(curr) => {
                        if let Some(prev) = prev.replace(curr) {
                            instant_tx.send_replace(utilization(&prev, &curr));
                        }
                    }
                    Err(err) => debug!("[instant] skipping readout: {err}"),
                }
            }
        }
    }
    debug!("[instant] readout exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SinkError;
    use crate::stat::StatError;
    use async_trait::async_trait;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// A source whose counters advance at a constant rate, so every
    /// interval reads the same utilization no matter which task samples
    /// it. Failure injection covers the skipped-tick policy.
    struct SteadySource {
        ticks: Mutex<u64>,
        active_per_tick: u64,
        idle_per_tick: u64,
        fail: AtomicBool,
    }

    impl SteadySource {
        fn new(active_per_tick: u64, idle_per_tick: u64) -> Arc<Self> {
            Arc::new(Self {
                ticks: Mutex::new(0),
                active_per_tick,
                idle_per_tick,
                fail: AtomicBool::new(false),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }
    }

    impl CounterSource for SteadySource {
        fn capture(&self) -> Result<CpuSnapshot, StatError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StatError::Unavailable(io::Error::new(
                    io::ErrorKind::NotFound,
                    "source down",
                )));
            }
            let mut ticks = self.ticks.lock().unwrap();
            *ticks += 1;
            Ok(CpuSnapshot {
                user: *ticks * self.active_per_tick,
                idle: *ticks * self.idle_per_tick,
                ..CpuSnapshot::default()
            })
        }
    }

    struct CountingSink {
        fired: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fired: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn notify(&self) -> Result<(), SinkError> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        async fn notify(&self) -> Result<(), SinkError> {
            Err(SinkError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "no player",
            )))
        }
    }

    fn test_config(window: usize, trigger: u32) -> Config {
        Config {
            window,
            trigger,
            ..Config::default()
        }
    }

    fn snapshot_of(status: &watch::Receiver<Status>) -> Status {
        status.borrow().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected() {
        let source = SteadySource::new(10, 90);
        let mut monitor = Monitor::with_parts(test_config(30, 30), source, CountingSink::new());

        monitor.start().unwrap();
        assert_eq!(monitor.start(), Err(SessionError::AlreadyRunning));
        assert!(monitor.is_running());

        // The first session keeps sampling undisturbed.
        sleep(Duration::from_millis(2500)).await;
        assert!(matches!(
            snapshot_of(&monitor.subscribe()),
            Status::Collecting { filled: 2, .. }
        ));

        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_is_rejected() {
        let source = SteadySource::new(10, 90);
        let mut monitor = Monitor::with_parts(test_config(30, 30), source, CountingSink::new());
        assert_eq!(monitor.stop().await, Err(SessionError::NotRunning));
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_joins_and_republishes_idle() {
        let source = SteadySource::new(10, 90);
        let mut monitor = Monitor::with_parts(test_config(30, 30), source, CountingSink::new());
        let status = monitor.subscribe();

        monitor.start().unwrap();
        sleep(Duration::from_millis(1500)).await;
        monitor.stop().await.unwrap();

        assert!(!monitor.is_running());
        assert_eq!(snapshot_of(&status), Status::Idle);

        // A fresh session may start after a clean stop.
        monitor.start().unwrap();
        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn window_fills_then_reports_steady_average() {
        // 10 active / 90 idle ticks per interval: constant 10% usage.
        let source = SteadySource::new(10, 90);
        let mut monitor =
            Monitor::with_parts(test_config(3, 100), source, CountingSink::new());
        let status = monitor.subscribe();

        monitor.start().unwrap();
        sleep(Duration::from_millis(1500)).await;
        assert!(matches!(
            snapshot_of(&status),
            Status::Collecting { filled: 1, .. }
        ));

        sleep(Duration::from_millis(2000)).await;
        match snapshot_of(&status) {
            Status::Steady {
                current, average, ..
            } => {
                assert!((current - 10.0).abs() < 1e-6);
                assert!((average - 10.0).abs() < 1e-6);
            }
            other => panic!("expected steady status, got {other:?}"),
        }

        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_low_usage_fires_the_sink_once() {
        let source = SteadySource::new(10, 90);
        let sink = CountingSink::new();
        let mut monitor = Monitor::with_parts(test_config(3, 3), source, Arc::clone(&sink) as _);

        monitor.start().unwrap();
        // Baseline at t=0, samples at t=1..=4: streak reaches 3 once.
        sleep(Duration::from_millis(4500)).await;
        monitor.stop().await.unwrap();

        assert_eq!(sink.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_does_not_stop_the_loop() {
        let source = SteadySource::new(10, 90);
        let mut monitor =
            Monitor::with_parts(test_config(3, 2), source, Arc::new(FailingSink) as _);
        let status = monitor.subscribe();

        monitor.start().unwrap();
        sleep(Duration::from_millis(6500)).await;

        // The loop kept sampling well past the failed deliveries.
        assert!(matches!(snapshot_of(&status), Status::Steady { .. }));

        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_capture_skips_the_tick() {
        let source = SteadySource::new(10, 90);
        let mut monitor = Monitor::with_parts(
            test_config(30, 30),
            Arc::clone(&source) as _,
            CountingSink::new(),
        );
        let status = monitor.subscribe();

        monitor.start().unwrap();
        sleep(Duration::from_millis(2500)).await;
        assert!(matches!(
            snapshot_of(&status),
            Status::Collecting { filled: 2, .. }
        ));

        source.set_failing(true);
        sleep(Duration::from_millis(1000)).await;
        // No entry was pushed and no synthetic zero appeared.
        assert!(matches!(
            snapshot_of(&status),
            Status::Collecting { filled: 2, .. }
        ));

        source.set_failing(false);
        sleep(Duration::from_millis(1000)).await;
        assert!(matches!(
            snapshot_of(&status),
            Status::Collecting { filled: 3, .. }
        ));

        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn instant_readout_tracks_the_source() {
        // 50 active / 50 idle: constant 50% usage.
        let source = SteadySource::new(50, 50);
        let mut monitor = Monitor::with_parts(test_config(30, 30), source, CountingSink::new());
        let instant = monitor.instant();

        monitor.start().unwrap();
        sleep(Duration::from_millis(3500)).await;
        assert!((*instant.borrow() - 50.0).abs() < 1e-6);

        monitor.stop().await.unwrap();
    }

    #[test]
    fn engine_first_capture_is_baseline_only() {
        let mut engine = Engine::new(&test_config(30, 30));
        let snap = CpuSnapshot {
            user: 100,
            idle: 900,
            ..CpuSnapshot::default()
        };
        assert!(engine.ingest(snap).is_none());
    }

    #[test]
    fn engine_reports_collecting_then_steady() {
        let mut engine = Engine::new(&test_config(2, 30));
        let mut tick = 0u64;
        let mut next = || {
            tick += 1;
            CpuSnapshot {
                user: tick * 25,
                idle: tick * 75,
                ..CpuSnapshot::default()
            }
        };

        assert!(engine.ingest(next()).is_none());
        let first = engine.ingest(next()).unwrap();
        assert!(matches!(
            first.status,
            Status::Collecting { filled: 1, window: 2, .. }
        ));
        let second = engine.ingest(next()).unwrap();
        match second.status {
            Status::Steady { average, .. } => assert!((average - 25.0).abs() < 1e-6),
            other => panic!("expected steady status, got {other:?}"),
        }
    }

    #[test]
    fn status_display_matches_the_label_text() {
        let collecting = Status::Collecting {
            current: 12.34,
            filled: 5,
            window: 30,
        };
        assert_eq!(collecting.to_string(), "current: 12.3% | collecting 5/30");

        let steady = Status::Steady {
            current: 12.34,
            average: 45.67,
            low_streak: 3,
            trigger: 30,
        };
        assert_eq!(
            steady.to_string(),
            "current: 12.3% | avg: 45.7% | low streak: 3/30"
        );

        assert_eq!(Status::Idle.to_string(), "monitoring stopped");
    }
}
