//! Host-side driver: samples the clock, forwards commands to the `Session`
//! and executes the effects each transition returns.

use crate::clock::{Clock, TickHandle};
use crate::effects::{Effect, EffectDispatcher};
use crate::session::Session;
use crate::workout::WorkoutRun;
use crate::{Result, TimerState, Workout};
use std::time::Duration;

/// Couples a `Session` with a clock and an effect dispatcher
pub struct Runner {
    session: Session,
    clock: Box<dyn Clock>,
    dispatcher: EffectDispatcher,
}

impl Runner {
    pub fn new(session: Session, clock: Box<dyn Clock>, dispatcher: EffectDispatcher) -> Self {
        Self {
            session,
            clock,
            dispatcher,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn dispatcher(&self) -> &EffectDispatcher {
        &self.dispatcher
    }

    pub fn timer_state(&self) -> TimerState {
        self.session.timer_state()
    }

    pub fn workout_run(&self) -> Option<&WorkoutRun> {
        self.session.workout_run()
    }

    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        self.session.tick_schedule()
    }

    pub fn start(&mut self, exercise_id: &str, override_duration: Option<u32>) -> Result<()> {
        let now = self.now();
        let effects = self.session.start(exercise_id, override_duration, now)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn start_workout(&mut self, workout: impl Into<Workout>) -> Result<()> {
        let now = self.now();
        let effects = self.session.start_workout(workout, now)?;
        self.dispatch(effects);
        Ok(())
    }

    pub fn stop(&mut self, is_completion: bool) {
        let now = self.now();
        let effects = self.session.stop(is_completion, now);
        self.dispatch(effects);
    }

    pub fn reset(&mut self) {
        let effects = self.session.reset();
        self.dispatch(effects);
    }

    pub fn tick(&mut self, handle: TickHandle) {
        let now = self.now();
        let effects = self.session.tick(handle, now);
        self.dispatch(effects);
    }

    /// Tick until the session is idle, calling `sleep` between ticks
    pub fn run_until_idle(&mut self, mut sleep: impl FnMut(Duration)) {
        while let Some((handle, interval)) = self.tick_schedule() {
            sleep(interval);
            self.tick(handle);
        }
    }

    fn now(&self) -> Option<u64> {
        match self.clock.now_ms() {
            Ok(now) => Some(now),
            Err(e) => {
                tracing::debug!("Clock sample failed: {}", e);
                None
            }
        }
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        if !effects.is_empty() {
            self.dispatcher.dispatch(effects);
        }
    }
}
