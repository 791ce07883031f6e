//! Wall-clock sampling and tick ownership.
//!
//! Timers never count ticks; they sample a monotonic clock on every tick and
//! derive elapsed time from an anchor. A `Ticker` owns the single live
//! `TickHandle` of a controller. Handles are unique across the process, so a
//! tick carrying a handle from an earlier phase is recognised as stale.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond clock
pub trait Clock {
    fn now_ms(&self) -> Result<u64>;
}

/// Clock backed by `std::time::Instant`, measured from construction
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Result<u64> {
        u64::try_from(self.origin.elapsed().as_millis()).map_err(|_| Error::ClockUnavailable)
    }
}

/// Manually advanced clock for tests and simulations
///
/// Clones share the same time source.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time (may go backwards to simulate a bad clock)
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Result<u64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ClockUnavailable);
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of one periodic tick stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

impl TickHandle {
    fn next() -> Self {
        TickHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Owner of at most one live tick stream
#[derive(Debug, Default)]
pub struct Ticker {
    live: Option<(TickHandle, Duration)>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new periodic stream, invalidating any previous one
    pub fn every(&mut self, interval: Duration) -> TickHandle {
        if let Some((old, _)) = self.live.take() {
            tracing::trace!("Replacing tick handle {}", old.id());
        }
        let handle = TickHandle::next();
        self.live = Some((handle, interval));
        handle
    }

    /// Invalidate the live stream; returns false if nothing was live
    pub fn cancel(&mut self) -> bool {
        self.live.take().is_some()
    }

    pub fn is_live(&self, handle: TickHandle) -> bool {
        matches!(self.live, Some((live, _)) if live == handle)
    }

    pub fn current(&self) -> Option<(TickHandle, Duration)> {
        self.live
    }
}
