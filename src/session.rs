//! Composes the clock, the two stream recorders, and the trial scheduler
//! into one recording session, and owns the Sitting/Position lifecycle on
//! disk. A session is one subject and one sitting; each call to
//! [`Session::run_position`] records one physical hand placement into its
//! own `<subject>/S<sitting>/P<position>/` directory holding the
//! biosignal store, the motion store, and a plain-text log.

use crate::gesture_set::Gesture;
use crate::sensor_source::{BiosignalSource, ConnectionError, MotionSource};
use crate::stream_recorder::{
    FlushResult, RecorderError, StreamRecorder, DEFAULT_BUFFER_CAPACITY,
};
use crate::timestamp_authority::TimestampAuthority;
use crate::trial_scheduler::{
    build_schedule, PromptDisplay, ScheduleRun, TrialEvent, TrialScheduler,
};

use log::{info, warn};
use std::error::Error;
use std::fmt::{self, Display};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Everything fixed for the whole session, straight from the operator.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub subject: String,
    pub sitting: u32,
    pub num_repetition: u32,
    pub gesture_duration: Duration,
    pub rest_duration: Duration,
    pub gestures: Vec<Gesture>,
    pub out_dir: PathBuf,
}

#[derive(Debug)]
pub enum SessionError {
    /// The gesture set is empty; there is nothing to prompt.
    NoGestures,
    /// An adapter could not be opened or started. Fatal to this
    /// Position's attempt only; the operator may fix the hardware and
    /// retry.
    Connection(&'static str, ConnectionError),
    /// A recorder failed to stop or flush.
    Recorder(&'static str, RecorderError),
    /// Directory or log-file io failed.
    Io(std::io::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoGestures => write!(f, "gesture set is empty"),
            SessionError::Connection(stream, error) => {
                write!(f, "{} adapter connection failed: {}", stream, error)
            }
            SessionError::Recorder(stream, error) => {
                write!(f, "{} recorder failed: {}", stream, error)
            }
            SessionError::Io(error) => write!(f, "session io failed: {}", error),
        }
    }
}

impl Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// What one Position run left behind.
#[derive(Debug)]
pub struct PositionSummary {
    pub position: u32,
    pub completed: bool,
    pub biosignal: FlushResult,
    pub motion: FlushResult,
    pub run: ScheduleRun,
    pub log_path: PathBuf,
}

/// One subject, one sitting, one clock.
pub struct Session {
    config: SessionConfig,
    clock: Arc<TimestampAuthority>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        if config.gestures.is_empty() {
            return Err(SessionError::NoGestures);
        }
        Ok(Self {
            config,
            clock: Arc::new(TimestampAuthority::new()),
        })
    }

    /// The directory a given Position records into.
    pub fn position_dir(&self, position: u32) -> PathBuf {
        self.config
            .out_dir
            .join(&self.config.subject)
            .join(format!("S{}", self.config.sitting))
            .join(format!("P{}", position))
    }

    fn artifact_name(&self, position: u32, stream: &str) -> String {
        format!(
            "{}_S{}_P{}_{}.trace",
            self.config.subject, self.config.sitting, position, stream
        )
    }

    /// Record one Position: open both adapters, run both capture loops
    /// through the full trial schedule, then stop, flush, and log.
    ///
    /// `abort` may be flipped from any thread at any point; the schedule
    /// is cut short, both buffers are still drained to their stores, and
    /// the log marks the Position incomplete.
    pub fn run_position<B, M>(
        &self,
        position: u32,
        biosignal_config: B::Config,
        motion_config: M::Config,
        display: &mut dyn PromptDisplay,
        abort: &AtomicBool,
    ) -> Result<PositionSummary, SessionError>
    where
        B: BiosignalSource + Send + 'static,
        M: MotionSource + Send + 'static,
    {
        let dir = self.position_dir(position);
        fs::create_dir_all(&dir)?;
        info!(
            "position {} for subject {} recording into {}",
            position,
            self.config.subject,
            dir.display()
        );

        let biosignal = B::open(biosignal_config)
            .map_err(|e| SessionError::Connection("biosignal", e))?;
        let motion = match M::open(motion_config) {
            Ok(motion) => motion,
            Err(e) => {
                // The biosignal adapter was claimed but nothing captured
                // yet; let it drop and report the failed attempt.
                return Err(SessionError::Connection("motion", e));
            }
        };

        let biosignal_store = dir.join(self.artifact_name(position, "emg"));
        let motion_store = dir.join(self.artifact_name(position, "pose"));

        let biosignal_rec = StreamRecorder::start_capture(
            "biosignal",
            biosignal,
            Arc::clone(&self.clock),
            DEFAULT_BUFFER_CAPACITY,
        )
        .map_err(|e| SessionError::Connection("biosignal", e))?;

        let motion_rec = match StreamRecorder::start_capture(
            "motion",
            motion,
            Arc::clone(&self.clock),
            DEFAULT_BUFFER_CAPACITY,
        ) {
            Ok(rec) => rec,
            Err(e) => {
                // Wind the sibling back down before reporting; whatever it
                // already captured is kept.
                if let Err(stop_err) = biosignal_rec.stop_capture(&biosignal_store) {
                    warn!("biosignal recorder teardown failed: {}", stop_err);
                }
                return Err(SessionError::Connection("motion", e));
            }
        };

        let scheduler = TrialScheduler::new(
            build_schedule(&self.config.gestures, self.config.num_repetition),
            self.config.gesture_duration,
            self.config.rest_duration,
        );
        let run = scheduler.run(&self.clock, display, abort, |event: &TrialEvent| {
            biosignal_rec.record_event(event.clone());
            motion_rec.record_event(event.clone());
        });

        // Stop both recorders unconditionally (capture stops before the
        // adapters close, inside stop_capture) so an error on one side
        // never strands the other mid-flush.
        let biosignal_res = biosignal_rec.stop_capture(&biosignal_store);
        let motion_res = motion_rec.stop_capture(&motion_store);
        let biosignal = biosignal_res.map_err(|e| SessionError::Recorder("biosignal", e))?;
        let motion = motion_res.map_err(|e| SessionError::Recorder("motion", e))?;

        let completed = !run.aborted && !biosignal.disconnected && !motion.disconnected;
        let log_path = dir.join("log.txt");
        self.write_position_log(&log_path, position, &run, &biosignal, &motion)?;

        info!(
            "position {} {}: {} biosignal samples, {} motion frames",
            position,
            if completed { "complete" } else { "incomplete" },
            biosignal.samples_written,
            motion.samples_written,
        );

        Ok(PositionSummary {
            position,
            completed,
            biosignal,
            motion,
            run,
            log_path,
        })
    }

    fn write_position_log(
        &self,
        path: &Path,
        position: u32,
        run: &ScheduleRun,
        biosignal: &FlushResult,
        motion: &FlushResult,
    ) -> Result<(), SessionError> {
        let mut log = fs::File::create(path)?;
        let config = &self.config;

        let status = if run.aborted {
            "aborted"
        } else if biosignal.disconnected || motion.disconnected {
            "partial"
        } else {
            "complete"
        };

        writeln!(log, "subject: {}", config.subject)?;
        writeln!(log, "sitting: S{}", config.sitting)?;
        writeln!(log, "position: P{}", position)?;
        let names: Vec<&str> = config.gestures.iter().map(|g| g.name.as_str()).collect();
        writeln!(log, "gestures: {}", names.join(", "))?;
        writeln!(log, "num_repetition: {}", config.num_repetition)?;
        writeln!(
            log,
            "gesture_duration_s: {:.3}",
            config.gesture_duration.as_secs_f64()
        )?;
        writeln!(
            log,
            "rest_duration_s: {:.3}",
            config.rest_duration.as_secs_f64()
        )?;
        writeln!(log, "status: {}", status)?;

        writeln!(log, "\n[trials]")?;
        for outcome in &run.outcomes {
            let hold_end = outcome
                .hold_end
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            let rest_end = outcome
                .rest_end
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                log,
                "trial {} {} hold {} .. {} rest_end {} {}",
                outcome.trial_id,
                outcome.gesture,
                outcome.hold_start,
                hold_end,
                rest_end,
                if outcome.completed {
                    "completed"
                } else {
                    "interrupted"
                },
            )?;
        }

        for (section, flush) in [("biosignal", biosignal), ("motion", motion)] {
            writeln!(log, "\n[{}]", section)?;
            writeln!(log, "samples: {}", flush.samples_written)?;
            writeln!(log, "dropped: {}", flush.dropped)?;
            writeln!(
                log,
                "disconnected: {}",
                if flush.disconnected { "yes" } else { "no" }
            )?;
            if let Some(name) = flush.store_path.file_name() {
                writeln!(log, "store: {}", name.to_string_lossy())?;
            }
            writeln!(log, "markers:")?;
            for event in &flush.events {
                writeln!(
                    log,
                    "{} trial {} {} {}",
                    event.timestamp, event.trial_id, event.gesture, event.phase
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy_sources::{
        DummyEmg, DummyEmgConfig, DummyTracker, DummyTrackerConfig,
    };
    use crate::sensor_source::{EmgSample, Reading, SensorSource};
    use crate::signal_data_format::TraceFile;
    use crate::trial_scheduler::NullPrompt;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn test_config(out_dir: PathBuf) -> SessionConfig {
        SessionConfig {
            subject: "007".to_string(),
            sitting: 1,
            num_repetition: 2,
            gesture_duration: Duration::from_millis(30),
            rest_duration: Duration::from_millis(15),
            gestures: vec![
                Gesture {
                    name: "fist".to_string(),
                    image: PathBuf::from("fist.png"),
                },
                Gesture {
                    name: "spread".to_string(),
                    image: PathBuf::from("spread.png"),
                },
            ],
            out_dir,
        }
    }

    fn fast_sources() -> (DummyEmgConfig, DummyTrackerConfig) {
        (
            DummyEmgConfig {
                sample_rate_hz: 1000,
                ..Default::default()
            },
            DummyTrackerConfig {
                frame_rate_hz: 250,
                ..Default::default()
            },
        )
    }

    #[test]
    fn records_a_full_position() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(test_config(dir.path().to_path_buf())).unwrap();
        let (emg_cfg, tracker_cfg) = fast_sources();

        let abort = AtomicBool::new(false);
        let summary = session
            .run_position::<DummyEmg, DummyTracker>(
                2,
                emg_cfg,
                tracker_cfg,
                &mut NullPrompt,
                &abort,
            )
            .unwrap();

        assert!(summary.completed);
        assert_eq!(summary.run.outcomes.len(), 4);
        assert!(summary.biosignal.samples_written > 0);
        assert!(summary.motion.samples_written > 0);

        // The directory layout embeds subject, sitting, and position.
        let position_dir = dir.path().join("007").join("S1").join("P2");
        assert!(position_dir.join("007_S1_P2_emg.trace").exists());
        assert!(position_dir.join("007_S1_P2_pose.trace").exists());
        assert!(position_dir.join("log.txt").exists());

        // Stores round-trip to the counts the recorders reported.
        let emg = TraceFile::from_path(position_dir.join("007_S1_P2_emg.trace")).unwrap();
        assert_eq!(emg.rows(), summary.biosignal.samples_written);
        let pose = TraceFile::from_path(position_dir.join("007_S1_P2_pose.trace")).unwrap();
        assert_eq!(pose.rows(), summary.motion.samples_written);

        // Both recorders saw every scheduler transition.
        assert_eq!(summary.biosignal.events.len(), summary.run.events.len());
        assert_eq!(summary.motion.events.len(), summary.run.events.len());

        let log = fs::read_to_string(summary.log_path).unwrap();
        assert!(log.contains("status: complete"));
        assert!(log.contains("trial 3"));
        assert!(log.contains("[biosignal]"));
        assert!(log.contains("[motion]"));
    }

    #[test]
    fn abort_still_flushes_and_marks_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().to_path_buf());
        config.gesture_duration = Duration::from_millis(500);
        let session = Session::new(config).unwrap();
        let (emg_cfg, tracker_cfg) = fast_sources();

        let abort = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&abort);
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            trigger.store(true, Ordering::Relaxed);
        });

        let summary = session
            .run_position::<DummyEmg, DummyTracker>(
                1,
                emg_cfg,
                tracker_cfg,
                &mut NullPrompt,
                &abort,
            )
            .unwrap();
        killer.join().unwrap();

        assert!(!summary.completed);
        assert!(summary.run.aborted);
        // Everything polled before the abort instant made it to disk.
        assert!(summary.biosignal.samples_written > 0);
        let store = TraceFile::from_path(&summary.biosignal.store_path).unwrap();
        assert_eq!(store.rows(), summary.biosignal.samples_written);

        let log = fs::read_to_string(summary.log_path).unwrap();
        assert!(log.contains("status: aborted"));
        assert!(log.contains("interrupted"));
    }

    struct UnreachableEmg;

    impl SensorSource for UnreachableEmg {
        type Config = ();
        type Payload = EmgSample;

        fn open(_config: ()) -> Result<Self, ConnectionError> {
            Err(ConnectionError::Unreachable("dongle".to_string()))
        }

        fn start(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn poll(&mut self) -> Reading<EmgSample> {
            Reading::Empty
        }

        fn stop(&mut self) {}

        fn close(&mut self) {}
    }

    impl BiosignalSource for UnreachableEmg {}

    #[test]
    fn connection_failure_is_fatal_to_the_position_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(test_config(dir.path().to_path_buf())).unwrap();

        let abort = AtomicBool::new(false);
        let result = session.run_position::<UnreachableEmg, DummyTracker>(
            1,
            (),
            DummyTrackerConfig::default(),
            &mut NullPrompt,
            &abort,
        );

        match result {
            Err(SessionError::Connection(stream, ConnectionError::Unreachable(_))) => {
                assert_eq!(stream, "biosignal");
            }
            other => panic!("expected a connection error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_gesture_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().to_path_buf());
        config.gestures.clear();

        assert!(matches!(
            Session::new(config),
            Err(SessionError::NoGestures)
        ));
    }
}
