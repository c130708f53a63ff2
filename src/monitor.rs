//! Periodic re-scanning against a fixed baseline
//!
//! A [`Monitor`] cycles through
//! `Idle -> Scanning -> Reporting -> Sleeping -> Scanning -> ...` until a
//! stop is requested, `max_cycles` is reached, or a fatal error occurs.
//!
//! - The baseline is loaded once, before the first cycle. Every cycle
//!   compares against that same snapshot; only a separate `accept` moves it.
//! - The interval is measured from the end of one cycle to the start of the
//!   next. A slow cycle is followed immediately by the next one.
//! - A stop request is observed while sleeping. A cycle in progress always
//!   finishes and emits its report first.
//! - A failed walk or report write costs one cycle. Errors for which
//!   [`FimError::is_fatal_for_monitor`] holds end the loop.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fim::monitor::{stop_channel, Monitor, MonitorOptions};
//! use fim::report::{ReportTarget, ReportWriter};
//! use fim::{BaselineStore, IgnoreRuleSet, Walker};
//! use std::time::Duration;
//!
//! # async fn example() -> fim::Result<()> {
//! let walker = Walker::new("/srv/www".into(), IgnoreRuleSet::empty());
//! let store = BaselineStore::for_root(walker.root());
//! let options = MonitorOptions::default().with_interval(Duration::from_secs(30));
//! let mut monitor = Monitor::from_store(walker, &store, options)?;
//!
//! let (handle, token) = stop_channel();
//! let mut sink = ReportWriter::new(ReportTarget::stdout());
//! let stats = monitor.run(&mut sink, token).await?;
//! # drop(handle);
//! println!("{} cycles", stats.cycles);
//! # Ok(())
//! # }
//! ```

use crate::baseline::BaselineStore;
use crate::comparator;
use crate::error::{FimError, Result};
use crate::report::ReportSink;
use crate::types::{ChangeSet, Snapshot};
use crate::walker::Walker;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default pause between cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Which cycles produce a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    /// Report every cycle, including those with no changes
    #[default]
    EveryCycle,
    /// Report only cycles whose change set is non-empty
    OnChange,
}

/// Monitor loop configuration
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Stop after this many cycles; `None` runs until stopped
    pub max_cycles: Option<usize>,
    /// Which cycles produce a report
    pub emit: EmitPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_cycles: None,
            emit: EmitPolicy::EveryCycle,
        }
    }
}

impl MonitorOptions {
    /// Set the pause between cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after `cycles` cycles
    pub fn with_max_cycles(mut self, cycles: usize) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Set the emit policy
    pub fn with_emit(mut self, emit: EmitPolicy) -> Self {
        self.emit = emit;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_cycles == Some(0) {
            return Err(FimError::InvalidConfiguration(
                "max_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, not yet running
    Idle,
    /// Walking the tree and comparing
    Scanning,
    /// Emitting the cycle's report
    Reporting,
    /// Waiting for the next cycle
    Sleeping,
    /// Finished; will not run again
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Idle => "idle",
            MonitorState::Scanning => "scanning",
            MonitorState::Reporting => "reporting",
            MonitorState::Sleeping => "sleeping",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Cycles started and finished
    pub cycles: usize,
    /// Reports successfully delivered to the sink
    pub reports_emitted: usize,
    /// Cycles whose change set was non-empty
    pub cycles_with_changes: usize,
    /// Cycles whose walk or report write failed
    pub failed_cycles: usize,
    /// Walk warnings summed over all cycles
    pub warnings: usize,
}

/// Requests a running monitor to stop
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Ask the monitor to stop once its current cycle completes
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }
}

/// Observes stop requests from a [`StopHandle`]
#[derive(Debug, Clone)]
pub struct StopToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl StopToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.receiver
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    /// Resolve once a stop has been requested
    ///
    /// If every handle is dropped without stopping, this never resolves.
    pub async fn cancelled(&mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            if receiver.wait_for(|stopped| *stopped).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/// Create a connected stop handle and token
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (sender, receiver) = watch::channel(false);
    (
        StopHandle {
            sender: Arc::new(sender),
        },
        StopToken {
            receiver: Some(receiver),
        },
    )
}

/// Repeated walk-and-compare against a fixed baseline
#[derive(Debug)]
pub struct Monitor {
    walker: Walker,
    baseline: Arc<Snapshot>,
    options: MonitorOptions,
    state: MonitorState,
}

impl Monitor {
    /// Monitor comparing against an already loaded baseline
    pub fn new(walker: Walker, baseline: Snapshot, options: MonitorOptions) -> Self {
        Self {
            walker,
            baseline: Arc::new(baseline),
            options,
            state: MonitorState::Idle,
        }
    }

    /// Load the baseline from `store` and build a monitor around it
    ///
    /// # Errors
    ///
    /// - [`FimError::BaselineNotFound`] if no baseline has been recorded
    /// - [`FimError::BaselineCorrupt`] if the stored baseline is invalid
    pub fn from_store(walker: Walker, store: &BaselineStore, options: MonitorOptions) -> Result<Self> {
        let baseline = store.load()?;
        Ok(Self::new(walker, baseline, options))
    }

    /// Current state of the loop
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Baseline every cycle compares against
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    /// Loop configuration
    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Run cycles until stopped, `max_cycles` is reached, or a fatal error
    ///
    /// Returns the accumulated statistics on a normal stop.
    pub async fn run(&mut self, sink: &mut dyn ReportSink, mut stop: StopToken) -> Result<MonitorStats> {
        if self.state == MonitorState::Stopped {
            return Err(FimError::internal("Monitor has already run"));
        }
        self.options.validate()?;

        info!(
            "Monitoring {:?} every {} against {} baseline files",
            self.walker.root(),
            humantime::format_duration(self.options.interval),
            self.baseline.len()
        );

        let mut stats = MonitorStats::default();

        loop {
            if stop.is_stopped() {
                info!("Stop requested");
                break;
            }

            self.transition(MonitorState::Scanning);
            let cycle_number = stats.cycles + 1;
            let start = Instant::now();
            let outcome = self.scan_once().await;
            stats.cycles += 1;

            match outcome {
                Ok(changes) => {
                    stats.warnings += changes.warnings.len();
                    if changes.has_changes() {
                        stats.cycles_with_changes += 1;
                    }

                    if self.should_emit(&changes) {
                        self.transition(MonitorState::Reporting);
                        match sink.emit(&changes) {
                            Ok(()) => stats.reports_emitted += 1,
                            Err(e) => {
                                stats.failed_cycles += 1;
                                warn!("Cycle {}: failed to write report: {}", cycle_number, e);
                            }
                        }
                    }

                    debug!(
                        "Cycle {} finished in {:?}: {} changes, {} warnings",
                        cycle_number,
                        start.elapsed(),
                        changes.total_changes(),
                        changes.warnings.len()
                    );
                }
                Err(e) if e.is_fatal_for_monitor() => {
                    error!("Cycle {}: {}; stopping monitor", cycle_number, e);
                    self.transition(MonitorState::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    stats.failed_cycles += 1;
                    warn!("Cycle {} failed: {}", cycle_number, e);
                }
            }

            if self
                .options
                .max_cycles
                .is_some_and(|max| stats.cycles >= max)
            {
                debug!("Reached {} cycles", stats.cycles);
                break;
            }

            self.transition(MonitorState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(self.options.interval) => {}
                _ = stop.cancelled() => {
                    info!("Stop requested");
                    break;
                }
            }
        }

        self.transition(MonitorState::Stopped);
        info!(
            "Monitor stopped after {} cycles ({} reports, {} with changes, {} failed)",
            stats.cycles, stats.reports_emitted, stats.cycles_with_changes, stats.failed_cycles
        );
        Ok(stats)
    }

    /// Walk once on a blocking thread and compare against the baseline
    async fn scan_once(&self) -> Result<ChangeSet> {
        let walker = self.walker.clone();
        let result = tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|e| FimError::internal(format!("Walk task failed: {}", e)))??;

        let changes = comparator::compare(&self.baseline, &result.snapshot);
        Ok(changes.with_warnings(result.warnings))
    }

    fn should_emit(&self, changes: &ChangeSet) -> bool {
        match self.options.emit {
            EmitPolicy::EveryCycle => true,
            EmitPolicy::OnChange => changes.has_changes(),
        }
    }

    fn transition(&mut self, next: MonitorState) {
        debug!("Monitor {} -> {}", self.state, next);
        self.state = next;
    }
}
