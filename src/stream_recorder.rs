//! One [`StreamRecorder`] per sensor. Each one owns a capture thread that
//! pulls samples off its adapter, stamps them with the shared
//! [`TimestampAuthority`] at the moment of receipt, and appends them to a
//! buffer only that thread touches. Trial events arrive over the same
//! control channel as the stop signal, so the scheduler never waits on a
//! recorder and the two recorders never wait on each other.
//!
//! Failure isolation is per stream: an adapter disconnect stops polling
//! on that recorder, keeps it draining events, raises a status flag the
//! orchestrator can read, and leaves the sibling recorder alone.

use crate::sensor_source::{ConnectionError, Reading, SensorSource, Stamped};
use crate::signal_data_format::{TraceEncode, TraceFile, TraceFileError};
use crate::timestamp_authority::TimestampAuthority;
use crate::trial_scheduler::TrialEvent;

use log::{info, warn};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Upper bound on buffered samples before the drop-oldest policy kicks
/// in. Roomy enough for the longest plausible Position at the sEMG unit's
/// native rate.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

/// Pause after an empty poll, so an idle device does not spin a core.
const EMPTY_POLL_BACKOFF: Duration = Duration::from_micros(500);

/// Pause between control-channel checks once the adapter is gone.
const ISOLATED_BACKOFF: Duration = Duration::from_millis(5);

enum RecorderSignal {
    Event(TrialEvent),
    Stop,
}

/// Everything the capture thread hands back when it exits.
struct CaptureYield<S: SensorSource> {
    source: S,
    samples: VecDeque<Stamped<S::Payload>>,
    events: Vec<TrialEvent>,
    dropped: u64,
}

/// Accounting for one stopped-and-flushed stream.
#[derive(Debug)]
pub struct FlushResult {
    /// Samples drained from the buffer into the store.
    pub samples_written: usize,
    /// The alignment markers this recorder received, in receipt order.
    pub events: Vec<TrialEvent>,
    /// Samples lost to the drop-oldest overflow policy.
    pub dropped: u64,
    /// Whether the adapter was lost mid-capture.
    pub disconnected: bool,
    /// Where the drained samples were written.
    pub store_path: PathBuf,
}

#[derive(Debug)]
pub enum RecorderError {
    /// The capture thread died instead of yielding its buffer.
    CaptureThreadPanicked,
    /// The drained buffer could not be written to the store.
    Store(TraceFileError),
}

impl Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::CaptureThreadPanicked => write!(f, "capture thread panicked"),
            RecorderError::Store(error) => write!(f, "store write failed: {}", error),
        }
    }
}

impl Error for RecorderError {}

/// Handle to a running capture loop.
pub struct StreamRecorder<S: SensorSource> {
    label: String,
    handle: Option<thread::JoinHandle<CaptureYield<S>>>,
    tx: mpsc::Sender<RecorderSignal>,
    disconnected: Arc<AtomicBool>,
}

impl<S> StreamRecorder<S>
where
    S: SensorSource + Send + 'static,
    S::Payload: Send + 'static,
{
    /// Start the adapter and spawn its capture loop. The recorder owns
    /// the source from here until [`stop_capture`](Self::stop_capture)
    /// hands its data back.
    pub fn start_capture(
        label: &str,
        mut source: S,
        clock: Arc<TimestampAuthority>,
        capacity: usize,
    ) -> Result<Self, ConnectionError> {
        source.start()?;

        let (tx, rx) = mpsc::channel::<RecorderSignal>();
        let disconnected = Arc::new(AtomicBool::new(false));
        let capacity = capacity.max(1);

        let th_label = label.to_string();
        let th_disconnected = Arc::clone(&disconnected);
        let handle = thread::spawn(move || {
            let mut samples: VecDeque<Stamped<S::Payload>> = VecDeque::new();
            let mut events: Vec<TrialEvent> = Vec::new();
            let mut dropped = 0u64;
            let mut overflow_warned = false;
            let mut live = true;

            'capture: loop {
                // Control first: a busy device must never starve the stop
                // signal or delay an alignment marker.
                while let Ok(signal) = rx.try_recv() {
                    match signal {
                        RecorderSignal::Event(event) => events.push(event),
                        RecorderSignal::Stop => break 'capture,
                    }
                }

                if !live {
                    thread::sleep(ISOLATED_BACKOFF);
                    continue;
                }

                match source.poll() {
                    Reading::Sample(payload) => {
                        let timestamp = clock.now();
                        if samples.len() == capacity {
                            samples.pop_front();
                            dropped += 1;
                            if !overflow_warned {
                                warn!("{}: buffer full, dropping oldest samples", th_label);
                                overflow_warned = true;
                            }
                        }
                        samples.push_back(Stamped { timestamp, payload });
                    }
                    Reading::Empty => thread::sleep(EMPTY_POLL_BACKOFF),
                    Reading::Disconnected => {
                        warn!("{}: adapter disconnected, stream isolated", th_label);
                        th_disconnected.store(true, Ordering::Release);
                        live = false;
                    }
                }
            }

            source.stop();
            CaptureYield {
                source,
                samples,
                events,
                dropped,
            }
        });

        Ok(StreamRecorder {
            label: label.to_string(),
            handle: Some(handle),
            tx,
            disconnected,
        })
    }

    /// Append a scheduler transition to this recorder's event stream.
    /// Never blocks; a dead capture thread is reported at stop time.
    pub fn record_event(&self, event: TrialEvent) {
        if self.tx.send(RecorderSignal::Event(event)).is_err() {
            warn!("{}: capture loop is gone, event not recorded", self.label);
        }
    }

    /// Whether this stream lost its adapter mid-capture.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Stop polling, close the adapter, and write every buffered sample
    /// to `store_path`. Nothing polled before the stop is lost; the
    /// buffer is drained, not discarded.
    pub fn stop_capture(mut self, store_path: &Path) -> Result<FlushResult, RecorderError>
    where
        S::Payload: TraceEncode,
    {
        let _ = self.tx.send(RecorderSignal::Stop);
        let yielded = self
            .handle
            .take()
            .ok_or(RecorderError::CaptureThreadPanicked)?
            .join()
            .map_err(|_| RecorderError::CaptureThreadPanicked)?;

        let mut source = yielded.source;
        source.close();

        let samples = Vec::from(yielded.samples);
        TraceFile::from_stamped(&samples)
            .to_path(store_path)
            .map_err(RecorderError::Store)?;

        info!(
            "{}: flushed {} samples ({} dropped) to {}",
            self.label,
            samples.len(),
            yielded.dropped,
            store_path.display()
        );

        Ok(FlushResult {
            samples_written: samples.len(),
            events: yielded.events,
            dropped: yielded.dropped,
            disconnected: self.disconnected.load(Ordering::Acquire),
            store_path: store_path.to_path_buf(),
        })
    }
}
