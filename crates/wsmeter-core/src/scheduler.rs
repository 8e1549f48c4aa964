//! Self-pacing scan loop.
//!
//! Each cycle discovers workspaces, measures them all, dispatches the
//! samples, then sleeps for whatever is left of the target interval. A cycle
//! that overruns the interval is followed immediately by the next one, so
//! slow scans do not compound delay.
//!
//! ```text
//!   Idle ──▶ Scanning ──▶ Dispatching ──┬──▶ Exiting   (permanent failure)
//!    ▲                                  ├──▶ Halted    (single-shot)
//!    └─────────── Sleeping ◀────────────┘
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::discover::{DiscoverError, discover};
use crate::fmt::{format_bytes, format_duration};
use crate::gateway::PublicationGateway;
use crate::measure::SizeMeasurer;
use crate::processor::{CycleResult, SampleProcessor};

/// Granularity of the inter-cycle sleep, bounding stop latency.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Scan loop configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory whose subdirectories are the workspaces.
    pub root: PathBuf,
    /// Target time between cycle starts.
    pub interval: Duration,
    /// Run a single cycle and stop.
    pub once: bool,
}

impl SchedulerConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interval: Self::DEFAULT_INTERVAL,
            once: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Dispatching,
    Sleeping,
    /// Terminal: a cycle failed permanently or discovery failed.
    Exiting,
    /// Terminal: single-shot cycle succeeded.
    Halted,
}

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Single-shot cycle completed.
    Completed,
    /// Stop was requested between cycles.
    Stopped,
}

/// Error type for fatal scheduler conditions.
#[derive(Debug)]
pub enum SchedulerError {
    /// Workspace root could not be listed.
    Discover(DiscoverError),
    /// At least one workspace failed permanently in the last cycle.
    PermanentFailure { failed: usize },
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Discover(e) => write!(f, "discovery failed: {}", e),
            SchedulerError::PermanentFailure { failed } => {
                write!(f, "{} workspace(s) failed permanently", failed)
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Discover(e) => Some(e),
            SchedulerError::PermanentFailure { .. } => None,
        }
    }
}

impl From<DiscoverError> for SchedulerError {
    fn from(e: DiscoverError) -> Self {
        SchedulerError::Discover(e)
    }
}

/// Outcome and duration of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub result: CycleResult,
    pub elapsed: Duration,
}

/// Time to sleep after a cycle that took `elapsed`, or `None` if the cycle
/// used up the whole interval.
pub fn pacing_delay(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Drives discover → process → dispatch cycles.
pub struct Scheduler<M: SizeMeasurer> {
    config: SchedulerConfig,
    processor: SampleProcessor<M>,
    state: ScanState,
    cycles: u64,
}

impl<M: SizeMeasurer> Scheduler<M> {
    pub fn new(config: SchedulerConfig, measurer: M) -> Self {
        Self {
            config,
            processor: SampleProcessor::new(measurer),
            state: ScanState::Idle,
            cycles: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one full cycle, dispatching samples into `gateway`.
    ///
    /// Permanent failures are reported in the returned result, not as an
    /// error; only a discovery failure is an error here.
    pub fn run_cycle<G>(&mut self, gateway: &mut G) -> Result<CycleReport, SchedulerError>
    where
        G: PublicationGateway + ?Sized,
    {
        self.state = ScanState::Scanning;
        self.cycles += 1;
        let scan_start = Instant::now();

        info!(
            "Scanning all workspace dirs in {} (cycle #{})",
            self.config.root.display(),
            self.cycles
        );
        let requests = discover(&self.config.root).inspect_err(|_| {
            self.state = ScanState::Exiting;
        })?;
        let actions = self.processor.process(requests);

        self.state = ScanState::Dispatching;
        let result = self.processor.dispatch(actions, gateway);

        let elapsed = scan_start.elapsed();
        info!(
            "Scan took {}: {} workspaces, {} published ({}), {} failed, {} publish errors",
            format_duration(elapsed),
            result.scanned(),
            result.published(),
            format_bytes(result.bytes()),
            result.failed(),
            result.publish_errors()
        );

        Ok(CycleReport { result, elapsed })
    }

    /// Runs cycles until single-shot completion, a stop request, or a fatal
    /// error.
    ///
    /// `running` is checked between cycles and while sleeping; an in-flight
    /// cycle always completes.
    pub fn run<G>(
        &mut self,
        gateway: &mut G,
        running: &AtomicBool,
    ) -> Result<RunOutcome, SchedulerError>
    where
        G: PublicationGateway + ?Sized,
    {
        let interval = self.config.interval;

        while running.load(Ordering::SeqCst) {
            self.state = ScanState::Idle;
            let report = self.run_cycle(gateway)?;

            if report.result.any_permanent() {
                // A stop signal can also reach `du` (e.g. a whole-cgroup
                // kill); failures from such a cycle are not reported.
                if !running.load(Ordering::SeqCst) {
                    warn!(
                        "Stop requested during scan; ignoring {} failed workspace(s)",
                        report.result.failed()
                    );
                    self.state = ScanState::Idle;
                    return Ok(RunOutcome::Stopped);
                }
                self.state = ScanState::Exiting;
                error!("Got permanent error during scan - exiting");
                return Err(SchedulerError::PermanentFailure {
                    failed: report.result.failed(),
                });
            }

            if self.config.once {
                self.state = ScanState::Halted;
                return Ok(RunOutcome::Completed);
            }

            self.state = ScanState::Sleeping;
            match pacing_delay(interval, report.elapsed) {
                Some(delay) => {
                    debug!("Sleeping {} until next scan", format_duration(delay));
                    sleep_while_running(delay, running);
                }
                None => warn!(
                    "Scan took {}, longer than target interval {}; starting next scan now",
                    format_duration(report.elapsed),
                    format_duration(interval)
                ),
            }
        }

        self.state = ScanState::Idle;
        Ok(RunOutcome::Stopped)
    }
}

/// Sleeps for `duration` in short slices, returning early once `running`
/// is cleared.
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let mut remaining = duration;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(SLEEP_SLICE);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}
