//! Adaptive poll timing.
//!
//! Writes to the vendor API only show up on a later read, so after a write
//! the scheduler runs a short burst of quick polls before returning to the
//! slow standard cadence. Failures switch to exponential backoff, which
//! overrides any burst in progress.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

pub const DEFAULT_STANDARD_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_QUICK_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_QUICK_COUNT: u32 = 3;
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1800);

/// Absorbs timer jitter so a due poll is not skipped by a few milliseconds.
const EARLY_FACTOR: f64 = 0.9;
const BURST_SLACK: f64 = 0.1;

/// `now + interval * factor`, or `now` when that is not representable.
fn deadline(now: Instant, interval: Duration, factor: f64) -> Instant {
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor)
        .ok()
        .and_then(|offset| now.checked_add(offset))
        .unwrap_or(now)
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub standard_interval: Duration,
    pub quick_interval: Duration,
    pub quick_count: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            standard_interval: DEFAULT_STANDARD_INTERVAL,
            quick_interval: DEFAULT_QUICK_INTERVAL,
            quick_count: DEFAULT_QUICK_COUNT,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Standard,
    Quick,
    BackingOff,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDecision {
    pub poll_now: bool,
    pub next_interval: Duration,
}

pub struct PollScheduler<C: Clock = SystemClock> {
    config: SchedulerConfig,
    clock: C,
    state: PollState,
    current_backoff: Option<Duration>,
    next_expected_at: Instant,
    last_expected_at: Instant,
}

impl PollScheduler<SystemClock> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> PollScheduler<C> {
    pub fn with_clock(config: SchedulerConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            config,
            clock,
            state: PollState::Standard,
            current_backoff: None,
            next_expected_at: now,
            last_expected_at: now,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Interval matching the current state.
    pub fn interval(&self) -> Duration {
        match self.state {
            PollState::Standard => self.config.standard_interval,
            PollState::Quick => self.config.quick_interval,
            PollState::BackingOff => self.current_backoff.unwrap_or(self.config.min_backoff),
        }
    }

    /// Decide whether this tick should poll and how long to wait afterwards.
    pub fn on_update_tick(&mut self) -> PollDecision {
        let now = self.clock.now();
        match self.state {
            PollState::Standard => {
                self.next_expected_at = deadline(now, self.config.standard_interval, EARLY_FACTOR);
                PollDecision {
                    poll_now: true,
                    next_interval: self.config.standard_interval,
                }
            }
            PollState::Quick => {
                if now < self.next_expected_at {
                    trace!(wait = ?self.config.quick_interval, "quick tick too early, skipping");
                    return PollDecision {
                        poll_now: false,
                        next_interval: self.config.quick_interval,
                    };
                }
                if now < self.last_expected_at {
                    debug!(wait = ?self.config.quick_interval, "quick poll, burst continues");
                    return PollDecision {
                        poll_now: true,
                        next_interval: self.config.quick_interval,
                    };
                }
                self.state = PollState::Standard;
                debug!(wait = ?self.config.standard_interval, "final quick poll, back to standard interval");
                PollDecision {
                    poll_now: true,
                    next_interval: self.config.standard_interval,
                }
            }
            PollState::BackingOff => {
                debug!(wait = ?self.interval(), "backing off");
                PollDecision {
                    poll_now: true,
                    next_interval: self.interval(),
                }
            }
        }
    }

    /// Open (or extend) a quick-poll window after a local write.
    ///
    /// Returns `true` when the caller should trigger a tick right away, which
    /// is only the case when coming from the standard cadence.
    pub fn request_quick_window(&mut self, count: Option<u32>) -> bool {
        let now = self.clock.now();
        let count = count.unwrap_or(self.config.quick_count).max(1);
        let quick = self.config.quick_interval;

        let next_expected_at = deadline(now, quick, EARLY_FACTOR);
        let last_expected_at = deadline(now, quick, count as f64 - BURST_SLACK);

        self.last_expected_at = self.last_expected_at.max(last_expected_at);
        self.next_expected_at = next_expected_at;

        match self.state {
            PollState::Standard => {
                debug!(count, "quick updates requested");
                self.state = PollState::Quick;
                true
            }
            PollState::Quick => {
                debug!(count, "quick updates requested, burst already active");
                false
            }
            PollState::BackingOff => {
                debug!(count, "quick updates requested while backing off");
                false
            }
        }
    }

    pub fn on_success(&mut self) -> Duration {
        if self.state == PollState::BackingOff {
            debug!("poll succeeded, leaving backoff");
            self.state = PollState::Standard;
            self.current_backoff = None;
        }
        self.interval()
    }

    pub fn on_error(&mut self) -> Duration {
        let backoff = match (self.state, self.current_backoff) {
            (PollState::BackingOff, Some(current)) => current.saturating_mul(2).min(self.config.max_backoff),
            _ => self.config.min_backoff.min(self.config.max_backoff),
        };
        self.state = PollState::BackingOff;
        self.current_backoff = Some(backoff);
        backoff
    }
}
