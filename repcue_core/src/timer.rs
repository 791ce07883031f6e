//! Single-interval exercise timer.
//!
//! The timer is a wall-clock-based state machine with no internal thread.
//! The caller asks for the live tick schedule, waits, and calls `tick()` with
//! the handle and a fresh clock sample.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> [Countdown] -> Running -> Completed
//! Idle -> Resting -> Completed
//! Completed -> (display hold) -> Completed
//! any -> cancel() -> Idle
//! ```
//!
//! Elapsed time is always `now - anchor`, never a sum of tick intervals, so
//! late or irregular ticks cannot accumulate drift.

use crate::clock::{TickHandle, Ticker};
use crate::effects::{Cue, Effect};
use crate::{Error, Result, TickMode, TimerPhase, TimerState};
use std::time::Duration;

/// Tick granularities used when scheduling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickIntervals {
    pub whole_second: Duration,
    pub smooth: Duration,
}

impl TickIntervals {
    pub fn for_mode(&self, mode: TickMode) -> Duration {
        match mode {
            TickMode::WholeSeconds => self.whole_second,
            TickMode::Smooth => self.smooth,
        }
    }
}

impl Default for TickIntervals {
    fn default() -> Self {
        Self {
            whole_second: Duration::from_millis(1000),
            smooth: Duration::from_millis(100),
        }
    }
}

/// Parameters for one run of the timer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedRun {
    pub target_seconds: f64,
    pub pre_countdown_seconds: u32,
    pub mode: TickMode,
    /// Emit an interval cue every N whole seconds while running
    pub interval_seconds: Option<u32>,
}

/// What a tick did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stale handle, missing clock sample, or non-monotonic sample
    Noop,
    /// Elapsed advanced without a transition
    Progress,
    /// Countdown reached zero; the run is now in progress, anchored where
    /// the countdown ended. A late sample may already cover part of the
    /// run, so callers tick again with the same sample.
    Started,
    /// The run or rest reached its target; reported exactly once
    Finished,
    /// The display hold after completion elapsed
    HoldElapsed,
}

/// Wall-clock span of one phase
#[derive(Clone, Copy, Debug)]
struct Span {
    target: f64,
    mode: TickMode,
    anchor: Option<u64>,
    last_sample: Option<u64>,
    elapsed: f64,
}

impl Span {
    fn new(target: f64, mode: TickMode, now: Option<u64>) -> Self {
        Self {
            target,
            mode,
            anchor: now,
            last_sample: now,
            elapsed: 0.0,
        }
    }

    /// Update elapsed from a sample; false if the sample goes backwards
    fn sample(&mut self, now: u64) -> bool {
        if matches!(self.last_sample, Some(last) if now < last) {
            tracing::debug!("Ignoring non-monotonic clock sample {}", now);
            return false;
        }
        self.last_sample = Some(now);
        let anchor = *self.anchor.get_or_insert(now);
        let raw = (now - anchor) as f64 / 1000.0;
        let elapsed = match self.mode {
            TickMode::WholeSeconds => raw.floor(),
            TickMode::Smooth => raw,
        };
        self.elapsed = self.elapsed.max(elapsed);
        true
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.target
    }

    fn clamped(&self) -> f64 {
        self.elapsed.min(self.target)
    }

    /// Wall-clock instant the span reaches its target, once anchored
    fn end(&self) -> Option<u64> {
        self.anchor
            .map(|anchor| anchor + (self.target * 1000.0).round() as u64)
    }
}

#[derive(Clone, Debug)]
enum Phase {
    Idle,
    Countdown {
        span: Span,
        run: TimedRun,
    },
    Running {
        span: Span,
        interval: Option<u32>,
        last_cued: Option<u64>,
    },
    Resting {
        span: Span,
    },
    Completed {
        target: f64,
        hold: Option<Span>,
        /// Where the completed span ended on the clock
        ended_at: Option<u64>,
    },
}

/// Timer for exactly one interval (countdown + run, or one rest)
#[derive(Debug)]
pub struct ExerciseTimer {
    intervals: TickIntervals,
    ticker: Ticker,
    phase: Phase,
}

impl ExerciseTimer {
    pub fn new(intervals: TickIntervals) -> Self {
        Self {
            intervals,
            ticker: Ticker::new(),
            phase: Phase::Idle,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> TimerPhase {
        match self.phase {
            Phase::Idle => TimerPhase::Idle,
            Phase::Countdown { .. } => TimerPhase::Countdown,
            Phase::Running { .. } => TimerPhase::Running,
            Phase::Resting { .. } => TimerPhase::Resting,
            Phase::Completed { .. } => TimerPhase::Completed,
        }
    }

    /// Elapsed seconds in the current phase, never beyond its target
    pub fn elapsed(&self) -> f64 {
        match &self.phase {
            Phase::Idle => 0.0,
            Phase::Countdown { span, .. } => span.clamped(),
            Phase::Running { span, .. } | Phase::Resting { span } => span.clamped(),
            Phase::Completed { target, .. } => *target,
        }
    }

    pub fn target(&self) -> f64 {
        match &self.phase {
            Phase::Idle => 0.0,
            Phase::Countdown { span, .. } => span.target,
            Phase::Running { span, .. } | Phase::Resting { span } => span.target,
            Phase::Completed { target, .. } => *target,
        }
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        match &self.phase {
            Phase::Countdown { span, .. } => Some((span.target - span.clamped()).max(0.0) as u32),
            _ => None,
        }
    }

    /// Clock instant the last run or rest reached its target
    ///
    /// The next phase should be anchored here rather than at the sample
    /// that noticed the completion, so late ticks don't push the schedule
    /// back. `None` if the phase was finished early or never anchored.
    pub fn boundary(&self) -> Option<u64> {
        match &self.phase {
            Phase::Completed { ended_at, .. } => *ended_at,
            _ => None,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.phase, Phase::Completed { hold: Some(_), .. })
    }

    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        self.ticker.current()
    }

    pub fn owns(&self, handle: TickHandle) -> bool {
        self.ticker.is_live(handle)
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            phase: self.phase(),
            elapsed_seconds: self.elapsed(),
            target_seconds: self.target(),
            countdown_remaining: self.countdown_remaining(),
            reps: None,
            exercise_id: None,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a run, replacing whatever the timer was doing
    ///
    /// `now` is the anchor of the run. It may be `None` if the clock could
    /// not be sampled; the first successful tick then becomes the anchor.
    pub fn start(&mut self, run: TimedRun, now: Option<u64>) -> Result<TickHandle> {
        if !(run.target_seconds.is_finite() && run.target_seconds > 0.0) {
            return Err(Error::InvalidRunConfig(format!(
                "timer target must be positive, got {}",
                run.target_seconds
            )));
        }

        self.phase = if run.pre_countdown_seconds > 0 {
            tracing::debug!(
                "Timer countdown {}s before {}s run",
                run.pre_countdown_seconds,
                run.target_seconds
            );
            Phase::Countdown {
                span: Span::new(
                    f64::from(run.pre_countdown_seconds),
                    TickMode::WholeSeconds,
                    now,
                ),
                run,
            }
        } else {
            tracing::debug!("Timer running for {}s", run.target_seconds);
            Phase::Running {
                span: Span::new(run.target_seconds, run.mode, now),
                interval: run.interval_seconds,
                last_cued: None,
            }
        };

        Ok(self.ticker.every(self.intervals.for_mode(run.mode)))
    }

    /// Start a rest interval of whole seconds
    pub fn rest(&mut self, seconds: u32, now: Option<u64>) -> Result<TickHandle> {
        if seconds == 0 {
            return Err(Error::InvalidRunConfig(
                "rest must be at least one second".into(),
            ));
        }
        tracing::debug!("Timer resting for {}s", seconds);
        self.phase = Phase::Resting {
            span: Span::new(f64::from(seconds), TickMode::WholeSeconds, now),
        };
        Ok(self.ticker.every(self.intervals.whole_second))
    }

    /// Keep showing `Completed` for `seconds`, then report `HoldElapsed`
    pub fn hold(&mut self, seconds: f64, now: Option<u64>) -> TickHandle {
        let (target, ended_at) = match &self.phase {
            Phase::Completed {
                target, ended_at, ..
            } => (*target, *ended_at),
            _ => (self.target(), None),
        };
        self.phase = Phase::Completed {
            target,
            hold: Some(Span::new(seconds, TickMode::Smooth, now)),
            ended_at,
        };
        self.ticker.every(self.intervals.smooth)
    }

    /// Jump to `Completed` without waiting for the target
    pub fn finish(&mut self) {
        let target = match &self.phase {
            Phase::Countdown { run, .. } => run.target_seconds,
            _ => self.target(),
        };
        self.ticker.cancel();
        self.phase = Phase::Completed {
            target,
            hold: None,
            ended_at: None,
        };
    }

    /// Stop ticking and return to `Idle`; false if already idle
    pub fn cancel(&mut self) -> bool {
        let had_tick = self.ticker.cancel();
        let was_active = !matches!(self.phase, Phase::Idle);
        self.phase = Phase::Idle;
        had_tick || was_active
    }

    /// Advance from a clock sample
    pub fn tick(
        &mut self,
        handle: TickHandle,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> TickOutcome {
        if !self.ticker.is_live(handle) {
            tracing::trace!("Ignoring stale tick {}", handle.id());
            return TickOutcome::Noop;
        }
        let Some(now) = now else {
            tracing::trace!("Clock unavailable, timer stalled");
            return TickOutcome::Noop;
        };

        match &mut self.phase {
            Phase::Idle => TickOutcome::Noop,
            Phase::Countdown { span, run } => {
                if !span.sample(now) {
                    return TickOutcome::Noop;
                }
                if !span.is_done() {
                    return TickOutcome::Progress;
                }
                let run = *run;
                let start = span.end().unwrap_or(now);
                tracing::debug!("Countdown finished, running for {}s", run.target_seconds);
                self.phase = Phase::Running {
                    span: Span::new(run.target_seconds, run.mode, Some(start)),
                    interval: run.interval_seconds,
                    last_cued: None,
                };
                TickOutcome::Started
            }
            Phase::Running {
                span,
                interval,
                last_cued,
            } => {
                if !span.sample(now) {
                    return TickOutcome::Noop;
                }
                if span.is_done() {
                    let (target, ended_at) = (span.target, span.end());
                    self.ticker.cancel();
                    self.phase = Phase::Completed {
                        target,
                        hold: None,
                        ended_at,
                    };
                    return TickOutcome::Finished;
                }
                let whole = span.elapsed.floor() as u64;
                if let Some(every) = interval.filter(|every| *every > 0) {
                    if whole > 0 && whole % u64::from(every) == 0 && *last_cued != Some(whole) {
                        *last_cued = Some(whole);
                        effects.push(Effect::Cue(Cue::Interval { second: whole }));
                    }
                }
                TickOutcome::Progress
            }
            Phase::Resting { span } => {
                if !span.sample(now) {
                    return TickOutcome::Noop;
                }
                if span.is_done() {
                    let (target, ended_at) = (span.target, span.end());
                    self.ticker.cancel();
                    self.phase = Phase::Completed {
                        target,
                        hold: None,
                        ended_at,
                    };
                    return TickOutcome::Finished;
                }
                TickOutcome::Progress
            }
            Phase::Completed { hold, .. } => {
                let Some(span) = hold.as_mut() else {
                    return TickOutcome::Noop;
                };
                if !span.sample(now) {
                    return TickOutcome::Noop;
                }
                if span.is_done() {
                    *hold = None;
                    self.ticker.cancel();
                    return TickOutcome::HoldElapsed;
                }
                TickOutcome::Progress
            }
        }
    }
}
