//! Drives the gesture-presentation state machine: prompt, hold, rest,
//! next. The scheduler owns trial state and nothing else; everything it
//! learns is pushed outward as stamped [`TrialEvent`]s so both stream
//! recorders can interleave the transitions with their samples as
//! alignment markers.
//!
//! Phase timing is measured as elapsed time since the phase was entered,
//! never against absolute deadlines, so scheduling jitter shifts a
//! boundary by at most the jitter itself and never accumulates into
//! drift.

use crate::gesture_set::Gesture;
use crate::timestamp_authority::{MonotonicTime, TimestampAuthority};

use log::{debug, info};
use rand::seq::SliceRandom;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often a phase wait wakes up to look for an abort. Bounds the grace
/// period between an abort request and the scheduler noticing it.
const ABORT_POLL_SLICE: Duration = Duration::from_millis(10);

/// The states of one trial's presentation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    /// Waiting for the session to start.
    Idle,
    /// The gesture prompt is being put on screen.
    Prompting,
    /// The subject is holding the gesture, for exactly the configured
    /// gesture duration.
    Holding,
    /// The subject is relaxing, for exactly the configured rest duration.
    Resting,
    /// The schedule is exhausted.
    Done,
}

impl Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrialPhase::Idle => "idle",
            TrialPhase::Prompting => "prompting",
            TrialPhase::Holding => "holding",
            TrialPhase::Resting => "resting",
            TrialPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// One stamped state transition, consumed by both recorders.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialEvent {
    pub trial_id: usize,
    pub gesture: String,
    pub phase: TrialPhase,
    pub timestamp: MonotonicTime,
}

/// The realized timing of one trial, filled in as it executes.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial_id: usize,
    pub gesture: String,
    /// When the hold began.
    pub hold_start: MonotonicTime,
    /// When the hold gave way to rest; `None` if interrupted first.
    pub hold_end: Option<MonotonicTime>,
    /// When the rest ran out; `None` if interrupted first.
    pub rest_end: Option<MonotonicTime>,
    /// Whether the trial ran its full hold and rest.
    pub completed: bool,
}

/// Whatever is presenting prompts to the subject. The terminal
/// implementation lives in [`crate::gui`]; tests run headless on
/// [`NullPrompt`].
pub trait PromptDisplay {
    /// A new gesture prompt; stays visible through the hold phase.
    fn show_gesture(&mut self, gesture: &Gesture, trial: usize, total: usize);
    /// The rest screen between trials.
    fn show_rest(&mut self, upcoming: Option<&str>, trial: usize, total: usize);
    /// The trial sequence is complete.
    fn show_done(&mut self);
    /// Called on every wait slice with the time left in the phase.
    fn tick(&mut self, _phase: TrialPhase, _remaining: Duration) {}
    /// Give the display a chance to report an operator abort request.
    fn poll_abort(&mut self) -> bool {
        false
    }
}

/// A prompt display that shows nothing and never aborts.
pub struct NullPrompt;

impl PromptDisplay for NullPrompt {
    fn show_gesture(&mut self, _gesture: &Gesture, _trial: usize, _total: usize) {}
    fn show_rest(&mut self, _upcoming: Option<&str>, _trial: usize, _total: usize) {}
    fn show_done(&mut self) {}
}

/// Expand a gesture set into the full trial list for one Position, each
/// gesture appearing `num_repetition` times in shuffled order.
pub fn build_schedule(gestures: &[Gesture], num_repetition: u32) -> Vec<Gesture> {
    let mut schedule: Vec<Gesture> = gestures
        .iter()
        .flat_map(|g| std::iter::repeat(g.clone()).take(num_repetition as usize))
        .collect();
    schedule.shuffle(&mut rand::thread_rng());
    schedule
}

/// Everything a finished (or aborted) schedule run produced.
#[derive(Debug, Clone)]
pub struct ScheduleRun {
    pub events: Vec<TrialEvent>,
    pub outcomes: Vec<TrialOutcome>,
    pub aborted: bool,
}

/// The gesture-presentation state machine for one Position.
pub struct TrialScheduler {
    schedule: Vec<Gesture>,
    gesture_duration: Duration,
    rest_duration: Duration,
}

impl TrialScheduler {
    pub fn new(
        schedule: Vec<Gesture>,
        gesture_duration: Duration,
        rest_duration: Duration,
    ) -> Self {
        Self {
            schedule,
            gesture_duration,
            rest_duration,
        }
    }

    /// Run the whole trial sequence, stamping every transition with
    /// `clock` and handing each event to `on_event` as it happens.
    ///
    /// Returns early (with `aborted` set) as soon as `abort` is observed,
    /// whether it was raised by the operator through the display or from
    /// outside; the partial outcome of the interrupted trial is kept.
    pub fn run(
        &self,
        clock: &TimestampAuthority,
        display: &mut dyn PromptDisplay,
        abort: &AtomicBool,
        mut on_event: impl FnMut(&TrialEvent),
    ) -> ScheduleRun {
        let mut events = Vec::new();
        let mut outcomes = Vec::new();
        let mut aborted = false;

        let total = self.schedule.len();
        let mut emit = |trial_id: usize, gesture: &str, phase: TrialPhase| -> MonotonicTime {
            let event = TrialEvent {
                trial_id,
                gesture: gesture.to_string(),
                phase,
                timestamp: clock.now(),
            };
            debug!("trial {} {} -> {}", trial_id, gesture, phase);
            let timestamp = event.timestamp;
            on_event(&event);
            events.push(event);
            timestamp
        };

        for (trial_id, gesture) in self.schedule.iter().enumerate() {
            emit(trial_id, &gesture.name, TrialPhase::Prompting);
            display.show_gesture(gesture, trial_id, total);

            // The prompt persists through the hold; Prompting is over the
            // moment it is on screen.
            let hold_start = emit(trial_id, &gesture.name, TrialPhase::Holding);
            let mut outcome = TrialOutcome {
                trial_id,
                gesture: gesture.name.clone(),
                hold_start,
                hold_end: None,
                rest_end: None,
                completed: false,
            };

            if !self.wait_phase(TrialPhase::Holding, self.gesture_duration, display, abort) {
                outcomes.push(outcome);
                aborted = true;
                break;
            }

            let hold_end = emit(trial_id, &gesture.name, TrialPhase::Resting);
            outcome.hold_end = Some(hold_end);
            let upcoming = self.schedule.get(trial_id + 1).map(|g| g.name.as_str());
            display.show_rest(upcoming, trial_id, total);

            if !self.wait_phase(TrialPhase::Resting, self.rest_duration, display, abort) {
                outcomes.push(outcome);
                aborted = true;
                break;
            }

            outcome.rest_end = Some(clock.now());
            outcome.completed = true;
            outcomes.push(outcome);
        }

        if !aborted {
            let (last_id, last_gesture) = match self.schedule.last() {
                Some(gesture) => (self.schedule.len() - 1, gesture.name.as_str()),
                None => (0, ""),
            };
            emit(last_id, last_gesture, TrialPhase::Done);
            display.show_done();
            info!("trial schedule complete: {} trials", outcomes.len());
        } else {
            info!(
                "trial schedule aborted after {} of {} trials",
                outcomes.len(),
                total
            );
        }

        ScheduleRun {
            events,
            outcomes,
            aborted,
        }
    }

    /// Sleep out one phase in short slices, watching for aborts. Returns
    /// false if the wait was cut short.
    fn wait_phase(
        &self,
        phase: TrialPhase,
        duration: Duration,
        display: &mut dyn PromptDisplay,
        abort: &AtomicBool,
    ) -> bool {
        let entered = Instant::now();
        let sleeper = spin_sleep::SpinSleeper::default();
        loop {
            if abort.load(Ordering::Relaxed) || display.poll_abort() {
                abort.store(true, Ordering::Relaxed);
                return false;
            }
            let remaining = duration.saturating_sub(entered.elapsed());
            if remaining.is_zero() {
                return true;
            }
            display.tick(phase, remaining);
            sleeper.sleep(remaining.min(ABORT_POLL_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn gesture(name: &str) -> Gesture {
        Gesture {
            name: name.to_string(),
            image: PathBuf::from(format!("{}.png", name)),
        }
    }

    /// Generous upper bound on per-phase scheduling slop for busy CI
    /// machines.
    const JITTER: Duration = Duration::from_millis(50);

    #[test]
    fn schedule_repeats_every_gesture() {
        let gestures = vec![gesture("fist"), gesture("spread")];
        let schedule = build_schedule(&gestures, 3);

        assert_eq!(schedule.len(), 6);
        let fists = schedule.iter().filter(|g| g.name == "fist").count();
        let spreads = schedule.iter().filter(|g| g.name == "spread").count();
        assert_eq!(fists, 3);
        assert_eq!(spreads, 3);
    }

    #[test]
    fn runs_three_repetitions_with_realized_durations() {
        let hold = Duration::from_millis(40);
        let rest = Duration::from_millis(20);
        let scheduler = TrialScheduler::new(build_schedule(&[gesture("fist")], 3), hold, rest);

        let clock = TimestampAuthority::new();
        let abort = AtomicBool::new(false);
        let mut tapped = 0usize;
        let run = scheduler.run(&clock, &mut NullPrompt, &abort, |_event| tapped += 1);

        assert!(!run.aborted);
        assert_eq!(run.outcomes.len(), 3);
        assert!(run.outcomes.iter().all(|o| o.completed));

        // Prompting, Holding, Resting per trial, one terminal Done.
        assert_eq!(run.events.len(), 3 * 3 + 1);
        assert_eq!(tapped, run.events.len());
        assert_eq!(run.events.last().unwrap().phase, TrialPhase::Done);

        // Stamps are non-decreasing in emission order.
        assert!(run
            .events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));

        for outcome in &run.outcomes {
            let held_micros = outcome.hold_end.unwrap().as_micros() - outcome.hold_start.as_micros();
            let held = Duration::from_micros(held_micros);
            assert!(held >= hold, "held {:?} for hold {:?}", held, hold);
            assert!(held <= hold + JITTER, "held {:?} for hold {:?}", held, hold);

            let rested_micros =
                outcome.rest_end.unwrap().as_micros() - outcome.hold_end.unwrap().as_micros();
            let rested = Duration::from_micros(rested_micros);
            assert!(rested >= rest);
            assert!(rested <= rest + JITTER);
        }
    }

    #[test]
    fn abort_mid_hold_keeps_partial_outcome() {
        let scheduler = TrialScheduler::new(
            build_schedule(&[gesture("pinch")], 2),
            Duration::from_millis(500),
            Duration::from_millis(100),
        );

        let clock = TimestampAuthority::new();
        let abort = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&abort);
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        let run = scheduler.run(&clock, &mut NullPrompt, &abort, |_event| {});
        killer.join().unwrap();

        assert!(run.aborted);
        // Cut short well inside the first 500ms hold.
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(run.outcomes.len(), 1);
        let interrupted = &run.outcomes[0];
        assert!(!interrupted.completed);
        assert!(interrupted.hold_end.is_none());
        // No Done event on an aborted run.
        assert!(run.events.iter().all(|e| e.phase != TrialPhase::Done));
    }

    #[test]
    fn display_abort_is_honored() {
        struct QuitAfter(usize);
        impl PromptDisplay for QuitAfter {
            fn show_gesture(&mut self, _g: &Gesture, _t: usize, _n: usize) {}
            fn show_rest(&mut self, _u: Option<&str>, _t: usize, _n: usize) {}
            fn show_done(&mut self) {}
            fn poll_abort(&mut self) -> bool {
                self.0 = self.0.saturating_sub(1);
                self.0 == 0
            }
        }

        let scheduler = TrialScheduler::new(
            build_schedule(&[gesture("point")], 1),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        let clock = TimestampAuthority::new();
        let abort = AtomicBool::new(false);
        let run = scheduler.run(&clock, &mut QuitAfter(3), &abort, |_event| {});

        assert!(run.aborted);
        assert!(abort.load(Ordering::Relaxed));
    }
}
