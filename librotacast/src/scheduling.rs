//! Schedules and the publishing loop
//!
//! A channel runs either at fixed local times every day or at a fixed
//! interval. The [`Scheduler`] owns one publisher per channel and runs their
//! cycles until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;
use crate::publisher::{ChannelPublisher, CycleOutcome};

/// Upper bound on a single sleep, so wall-clock jumps are noticed
const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Pause between channels when several run back to back at startup
const DEFAULT_STARTUP_SPACING: Duration = Duration::from_secs(1);

/// Ten years
const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0 * 10.0;

/// When a channel should publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at each of these local times (sorted, deduplicated)
    DailyAt(Vec<NaiveTime>),
    /// Repeatedly, this long after the previous run
    Every(Duration),
}

impl Schedule {
    /// Build a daily schedule from `HH:MM` (or `HH:MM:SS`) strings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the list is empty or any time
    /// does not parse.
    pub fn daily<S: AsRef<str>>(times: &[S]) -> Result<Self, ConfigError> {
        if times.is_empty() {
            return Err(invalid("schedule.times", "at least one time is required"));
        }

        let mut parsed = times
            .iter()
            .map(|t| parse_time(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        parsed.sort();
        parsed.dedup();

        Ok(Schedule::DailyAt(parsed))
    }

    /// Build an interval schedule.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero or unrepresentably long
    /// interval.
    pub fn every(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(invalid("schedule.interval", "must be greater than zero"));
        }
        if chrono::Duration::from_std(interval).is_err() {
            return Err(invalid("schedule.interval", "interval is too long"));
        }
        Ok(Schedule::Every(interval))
    }

    /// Build an interval schedule from a whole or fractional number of hours
    pub fn every_hours(hours: f64) -> Result<Self, ConfigError> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(invalid(
                "schedule.interval_hours",
                "must be a positive number",
            ));
        }
        if hours > MAX_INTERVAL_HOURS {
            return Err(invalid("schedule.interval_hours", "interval is too long"));
        }
        Self::every(Duration::from_secs_f64(hours * 3600.0))
    }

    /// Build an interval schedule from a humantime string such as `"90m"`
    pub fn parse_interval(input: &str) -> Result<Self, ConfigError> {
        let interval = humantime::parse_duration(input.trim())
            .map_err(|e| invalid("schedule.interval", &format!("'{}': {}", input, e)))?;
        Self::every(interval)
    }

    /// The first run strictly after `after`.
    ///
    /// Daily times that do not exist on a given day (skipped by a DST change)
    /// are passed over. Returns `None` only if no run can be represented.
    pub fn next_run<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Schedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.clone().checked_add_signed(step)
            }
            Schedule::DailyAt(times) => {
                let tz = after.timezone();
                let mut date = after.date_naive();
                // Two extra days cover a time lost to a DST gap tomorrow.
                for _ in 0..3 {
                    for time in times {
                        let candidate = tz.from_local_datetime(&date.and_time(*time)).earliest();
                        if let Some(candidate) = candidate {
                            if candidate > *after {
                                return Some(candidate);
                            }
                        }
                    }
                    date = date.succ_opt()?;
                }
                None
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::DailyAt(times) => {
                let times: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                write!(f, "daily at {}", times.join(", "))
            }
            Schedule::Every(interval) => {
                write!(f, "every {}", humantime::format_duration(*interval))
            }
        }
    }
}

fn parse_time(input: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| {
            invalid(
                "schedule.times",
                &format!("'{}' is not a valid HH:MM time", input),
            )
        })
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

struct ScheduledChannel {
    publisher: Arc<ChannelPublisher>,
    schedule: Schedule,
}

/// Runs publish cycles for a set of channels on their schedules
pub struct Scheduler {
    channels: Vec<ScheduledChannel>,
    run_on_start: bool,
    startup_spacing: Duration,
}

impl Scheduler {
    pub fn new(run_on_start: bool) -> Self {
        Self {
            channels: Vec::new(),
            run_on_start,
            startup_spacing: DEFAULT_STARTUP_SPACING,
        }
    }

    /// Pause between channels run back to back (startup and `run_once`)
    pub fn with_startup_spacing(mut self, spacing: Duration) -> Self {
        self.startup_spacing = spacing;
        self
    }

    pub fn add(&mut self, publisher: ChannelPublisher, schedule: Schedule) {
        info!(
            channel = publisher.channel_id(),
            "Scheduled {}",
            schedule
        );
        self.channels.push(ScheduledChannel {
            publisher: Arc::new(publisher),
            schedule,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Run one cycle on every channel, in the order they were added.
    pub async fn run_once(&self) -> Vec<(String, CycleOutcome)> {
        let mut outcomes = Vec::with_capacity(self.channels.len());
        for (i, scheduled) in self.channels.iter().enumerate() {
            if i > 0 && !self.startup_spacing.is_zero() {
                sleep(self.startup_spacing).await;
            }
            let channel_id = scheduled.publisher.channel_id().to_string();
            if let Some(outcome) = run_cycle(&scheduled.publisher).await {
                outcomes.push((channel_id, outcome));
            }
        }
        outcomes
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between cycles; a delivery already in flight
    /// is allowed to finish (it is bounded by the publisher's timeout).
    pub async fn run(&self, shutdown: CancellationToken) {
        if self.channels.is_empty() {
            warn!("No scheduled channels; waiting for shutdown");
            shutdown.cancelled().await;
            return;
        }

        if self.run_on_start {
            info!("Running every channel once at startup");
            for (i, scheduled) in self.channels.iter().enumerate() {
                if shutdown.is_cancelled() {
                    return;
                }
                if i > 0 && !self.startup_spacing.is_zero() {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = sleep(self.startup_spacing) => {}
                    }
                }
                run_cycle(&scheduled.publisher).await;
            }
        }

        let now = Local::now();
        let mut next_runs: Vec<Option<DateTime<Local>>> = self
            .channels
            .iter()
            .map(|scheduled| next_run_logged(scheduled, &now))
            .collect();

        loop {
            let Some(next) = next_runs.iter().flatten().min().copied() else {
                warn!("No channel has a future run; waiting for shutdown");
                shutdown.cancelled().await;
                break;
            };

            let wait = (next - Local::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(CHECK_INTERVAL);

            if !wait.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(wait) => {}
                }
            }

            for (scheduled, next_run) in self.channels.iter().zip(next_runs.iter_mut()) {
                if shutdown.is_cancelled() {
                    break;
                }
                let due = matches!(next_run, Some(at) if *at <= Local::now());
                if !due {
                    continue;
                }

                run_cycle(&scheduled.publisher).await;
                // Missed runs collapse into one; schedule from completion time.
                *next_run = next_run_logged(scheduled, &Local::now());
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        info!("Scheduler stopped");
    }
}

fn next_run_logged(scheduled: &ScheduledChannel, after: &DateTime<Local>) -> Option<DateTime<Local>> {
    let next = scheduled.schedule.next_run(after);
    match &next {
        Some(at) => debug!(
            channel = scheduled.publisher.channel_id(),
            "Next run at {}",
            at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => error!(
            channel = scheduled.publisher.channel_id(),
            "Could not compute next run; channel disabled"
        ),
    }
    next
}

/// Run one cycle on its own task so a panicking channel cannot take the
/// scheduler down with it.
async fn run_cycle(publisher: &Arc<ChannelPublisher>) -> Option<CycleOutcome> {
    let publisher = Arc::clone(publisher);
    let channel_id = publisher.channel_id().to_string();
    match tokio::spawn(async move { publisher.publish_cycle().await }).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(channel = %channel_id, "Publish cycle aborted: {}", e);
            None
        }
    }
}
