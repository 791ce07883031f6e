//! Effect requests and the capabilities that execute them.
//!
//! State transitions never call collaborators directly. They push `Effect`
//! values; the `EffectDispatcher` executes them in order once the new state
//! has been committed. Collaborator failures are logged and swallowed: the
//! state machine does not depend on whether a cue played or a log was
//! written.

use crate::{ActivityEntry, Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What a cue announces next
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Announcement {
    /// Upcoming set of a rep-based exercise (`set` is 1-based)
    Set { set: u32, total_sets: u32, reps: u32 },
    /// Upcoming exercise of a workout
    Exercise { exercise_id: String, name: String },
}

/// Audio/haptic cue request
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    Start {
        exercise_id: String,
        announcement: Option<Announcement>,
    },
    Interval {
        second: u64,
    },
    RestStart {
        seconds: u32,
        upcoming: Announcement,
    },
    RestEnd {
        upcoming: Announcement,
    },
    Completion {
        subject_id: String,
    },
}

/// A side effect requested by a state transition
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Cue(Cue),
    Record(ActivityEntry),
    AcquireWakeLock,
    ReleaseWakeLock,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Plays cues; fire-and-forget
pub trait CueDispatcher {
    fn play(&mut self, cue: &Cue) -> Result<()>;
}

/// Persists a completed unit
pub trait ActivityRecorder {
    fn record(&mut self, entry: &ActivityEntry) -> Result<()>;
}

/// Consent predicate evaluated at dispatch time
pub trait ConsentGate {
    fn has_consent(&self) -> bool;
}

impl ConsentGate for bool {
    fn has_consent(&self) -> bool {
        *self
    }
}

/// Shared flag a host can flip while a session is running
impl ConsentGate for Arc<AtomicBool> {
    fn has_consent(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// A held wake lock
pub trait Lock {
    fn release(self: Box<Self>) -> Result<()>;
}

/// Source of wake locks
pub trait WakeLock {
    fn acquire(&mut self) -> Result<Box<dyn Lock>>;
}

/// Cue dispatcher that only logs
#[derive(Debug, Default)]
pub struct LogCues;

impl CueDispatcher for LogCues {
    fn play(&mut self, cue: &Cue) -> Result<()> {
        tracing::info!("Cue: {:?}", cue);
        Ok(())
    }
}

/// Wake lock provider for hosts without one
#[derive(Debug, Default)]
pub struct NoWakeLock;

struct NoLock;

impl Lock for NoLock {
    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl WakeLock for NoWakeLock {
    fn acquire(&mut self) -> Result<Box<dyn Lock>> {
        Ok(Box::new(NoLock))
    }
}

/// In-memory recorder; clones share the same entries
#[derive(Clone, Debug, Default)]
pub struct MemoryRecorder {
    entries: Arc<Mutex<Vec<ActivityEntry>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl ActivityRecorder for MemoryRecorder {
    fn record(&mut self, entry: &ActivityEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| Error::RecorderWrite(e.to_string()))?
            .push(entry.clone());
        Ok(())
    }
}

/// In-memory cue log; clones share the same cues
#[derive(Clone, Debug, Default)]
pub struct CueLog {
    cues: Arc<Mutex<Vec<Cue>>>,
}

impl CueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().map(|cues| cues.clone()).unwrap_or_default()
    }
}

impl CueDispatcher for CueLog {
    fn play(&mut self, cue: &Cue) -> Result<()> {
        self.cues
            .lock()
            .map_err(|e| Error::Cue(e.to_string()))?
            .push(cue.clone());
        Ok(())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Single-owner wake lock holder
///
/// Acquiring while held and releasing while not held are no-ops.
pub struct WakeLockGuard {
    provider: Box<dyn WakeLock>,
    held: Option<Box<dyn Lock>>,
}

impl WakeLockGuard {
    pub fn new(provider: Box<dyn WakeLock>) -> Self {
        Self {
            provider,
            held: None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    pub fn acquire(&mut self) {
        if self.held.is_some() {
            tracing::trace!("Wake lock already held");
            return;
        }
        match self.provider.acquire() {
            Ok(lock) => {
                tracing::debug!("Wake lock acquired");
                self.held = Some(lock);
            }
            Err(e) => tracing::warn!("Continuing without wake lock: {}", e),
        }
    }

    pub fn release(&mut self) {
        if let Some(lock) = self.held.take() {
            match lock.release() {
                Ok(()) => tracing::debug!("Wake lock released"),
                Err(e) => tracing::warn!("Failed to release wake lock: {}", e),
            }
        }
    }
}

/// Executes effects against the external collaborators
pub struct EffectDispatcher {
    cues: Box<dyn CueDispatcher>,
    recorder: Box<dyn ActivityRecorder>,
    consent: Box<dyn ConsentGate>,
    wake_lock: WakeLockGuard,
}

impl EffectDispatcher {
    pub fn new(
        cues: Box<dyn CueDispatcher>,
        recorder: Box<dyn ActivityRecorder>,
        consent: Box<dyn ConsentGate>,
        wake_lock: Box<dyn WakeLock>,
    ) -> Self {
        Self {
            cues,
            recorder,
            consent,
            wake_lock: WakeLockGuard::new(wake_lock),
        }
    }

    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock.is_held()
    }

    /// Execute effects in order; never fails
    pub fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Cue(cue) => {
                    if let Err(e) = self.cues.play(&cue) {
                        tracing::warn!("Cue {:?} failed: {}", cue, e);
                    }
                }
                Effect::Record(entry) => self.record(&entry),
                Effect::AcquireWakeLock => self.wake_lock.acquire(),
                Effect::ReleaseWakeLock => self.wake_lock.release(),
            }
        }
    }

    fn record(&mut self, entry: &ActivityEntry) {
        if !self.consent.has_consent() {
            tracing::debug!(
                "No consent for activity logging, dropping entry for {}",
                entry.subject_id
            );
            return;
        }
        match self.recorder.record(entry) {
            Ok(()) => tracing::info!(
                "Recorded {:?} {} ({}s, {:?})",
                entry.kind,
                entry.subject_id,
                entry.duration_seconds,
                entry.outcome
            ),
            Err(e) => tracing::warn!("Activity log write failed for {}: {}", entry.subject_id, e),
        }
    }
}
