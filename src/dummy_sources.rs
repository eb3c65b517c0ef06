//! Synthetic stand-ins for the two physical sensors. Each one runs a
//! little generator on a background thread, controlled over an mpsc
//! channel, and hands samples out through the same [`SensorSource`]
//! surface the real adapters implement. Used by `--dummy` runs, the
//! `monitor` binary, and most of the test suite, so nothing here needs
//! hardware plugged in.

use crate::sensor_source::{
    BiosignalSource, ConnectionError, EmgSample, MotionSource, PoseFrame, Reading, SensorSource,
    EMG_CHANNELS, FINGERS,
};

use rand::prelude::*;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

enum Signal {
    Run,
    Pause,
    Stop,
}

/// How fast and how dirty the synthetic sEMG stream should be.
#[derive(Debug, Clone, Copy)]
pub struct DummyEmgConfig {
    pub sample_rate_hz: u32,
    pub amplitude: f32,
    pub noise: f32,
}

impl Default for DummyEmgConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 500,
            amplitude: 100.0,
            noise: 5.0,
        }
    }
}

/// A [`BiosignalSource`] that synthesizes a 16-channel sine burst with a
/// bit of noise on each electrode.
pub struct DummyEmg {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    msgs: Arc<Mutex<VecDeque<EmgSample>>>,
    disconnected: bool,
}

impl SensorSource for DummyEmg {
    type Config = DummyEmgConfig;
    type Payload = EmgSample;

    fn open(config: DummyEmgConfig) -> Result<Self, ConnectionError> {
        let (tx, rx) = mpsc::channel::<Signal>();
        let msgs = Arc::new(Mutex::new(VecDeque::new()));
        let th_msgs = Arc::clone(&msgs);

        let period = Duration::from_secs_f64(1.0 / config.sample_rate_hz.max(1) as f64);
        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let mut running = false;
            let mut seq = 0u32;
            loop {
                if let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::Run => running = true,
                        Signal::Pause => running = false,
                        Signal::Stop => break,
                    }
                }
                if running {
                    let phase = seq as f32 / config.sample_rate_hz.max(1) as f32;
                    let mut channels = [0.0; EMG_CHANNELS];
                    for (c, value) in channels.iter_mut().enumerate() {
                        let carrier = (2.0 * PI * (8.0 + c as f32) * phase).sin();
                        *value = carrier * config.amplitude
                            + rng.gen_range(-config.noise..=config.noise);
                    }
                    th_msgs.lock().unwrap().push_back(EmgSample { seq, channels });
                    seq = seq.wrapping_add(1);
                }
                thread::sleep(period);
            }
        });

        Ok(DummyEmg {
            handle: Some(handle),
            tx,
            msgs,
            disconnected: false,
        })
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        // Re-sending Run to a running generator changes nothing.
        let _ = self.tx.send(Signal::Run);
        Ok(())
    }

    fn poll(&mut self) -> Reading<EmgSample> {
        if self.disconnected {
            return Reading::Disconnected;
        }
        match self.msgs.lock().unwrap().pop_front() {
            Some(sample) => Reading::Sample(sample),
            None => Reading::Empty,
        }
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Signal::Pause);
    }

    fn close(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            thread.join().unwrap();
        }
    }
}

impl BiosignalSource for DummyEmg {}

impl DummyEmg {
    /// Make subsequent polls report the device as gone, as if the BLE
    /// link dropped mid-capture.
    pub fn inject_disconnect(&mut self) {
        self.disconnected = true;
        let _ = self.tx.send(Signal::Pause);
    }
}

/// Frame rate and sweep radius of the synthetic hand trajectory.
#[derive(Debug, Clone, Copy)]
pub struct DummyTrackerConfig {
    pub frame_rate_hz: u32,
    pub sweep_radius: f32,
}

impl Default for DummyTrackerConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 110,
            sweep_radius: 80.0,
        }
    }
}

/// A [`MotionSource`] that moves a synthetic hand in a slow circle above
/// the sensor, fingers splayed at fixed offsets from the palm.
pub struct DummyTracker {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    msgs: Arc<Mutex<VecDeque<PoseFrame>>>,
    disconnected: bool,
}

fn synthesize_pose(frame_id: u32, config: &DummyTrackerConfig, jitter: f32) -> PoseFrame {
    let angle = frame_id as f32 / config.frame_rate_hz.max(1) as f32;
    let palm = [
        angle.cos() * config.sweep_radius + jitter,
        200.0,
        angle.sin() * config.sweep_radius,
    ];
    let orientation = [0.1 * angle.sin(), angle, 0.0];

    let mut fingertips = [[0.0; 3]; FINGERS];
    for (finger, tip) in fingertips.iter_mut().enumerate() {
        let spread = (finger as f32 - 2.0) * 15.0;
        *tip = [palm[0] + spread, palm[1] + 10.0, palm[2] + 60.0];
    }

    PoseFrame {
        frame_id,
        palm,
        orientation,
        fingertips,
    }
}

impl SensorSource for DummyTracker {
    type Config = DummyTrackerConfig;
    type Payload = PoseFrame;

    fn open(config: DummyTrackerConfig) -> Result<Self, ConnectionError> {
        let (tx, rx) = mpsc::channel::<Signal>();
        let msgs = Arc::new(Mutex::new(VecDeque::new()));
        let th_msgs = Arc::clone(&msgs);

        let period = Duration::from_secs_f64(1.0 / config.frame_rate_hz.max(1) as f64);
        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let mut running = false;
            let mut frame_id = 0u32;
            loop {
                if let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::Run => running = true,
                        Signal::Pause => running = false,
                        Signal::Stop => break,
                    }
                }
                if running {
                    let jitter = rng.gen_range(-0.5..=0.5);
                    th_msgs
                        .lock()
                        .unwrap()
                        .push_back(synthesize_pose(frame_id, &config, jitter));
                    frame_id = frame_id.wrapping_add(1);
                }
                thread::sleep(period);
            }
        });

        Ok(DummyTracker {
            handle: Some(handle),
            tx,
            msgs,
            disconnected: false,
        })
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        let _ = self.tx.send(Signal::Run);
        Ok(())
    }

    fn poll(&mut self) -> Reading<PoseFrame> {
        if self.disconnected {
            return Reading::Disconnected;
        }
        match self.msgs.lock().unwrap().pop_front() {
            Some(frame) => Reading::Sample(frame),
            None => Reading::Empty,
        }
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Signal::Pause);
    }

    fn close(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            thread.join().unwrap();
        }
    }
}

impl MotionSource for DummyTracker {}

impl DummyTracker {
    /// Make subsequent polls report the camera service as gone.
    pub fn inject_disconnect(&mut self) {
        self.disconnected = true;
        let _ = self.tx.send(Signal::Pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<S: SensorSource>(source: &mut S, window: Duration) -> Vec<S::Payload> {
        let deadline = std::time::Instant::now() + window;
        let mut out = Vec::new();
        while std::time::Instant::now() < deadline {
            match source.poll() {
                Reading::Sample(payload) => out.push(payload),
                Reading::Empty => thread::sleep(Duration::from_millis(1)),
                Reading::Disconnected => break,
            }
        }
        out
    }

    #[test]
    fn emg_streams_after_start() {
        let mut emg = DummyEmg::open(DummyEmgConfig {
            sample_rate_hz: 1000,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(emg.poll(), Reading::Empty);

        emg.start().unwrap();
        let samples = drain(&mut emg, Duration::from_millis(60));
        assert!(!samples.is_empty());
        // Device sequence numbers count up without gaps.
        assert!(samples.windows(2).all(|w| w[1].seq == w[0].seq + 1));

        emg.close();
    }

    #[test]
    fn tracker_streams_after_start() {
        let mut tracker = DummyTracker::open(DummyTrackerConfig::default()).unwrap();
        tracker.start().unwrap();

        let frames = drain(&mut tracker, Duration::from_millis(60));
        assert!(!frames.is_empty());

        tracker.close();
    }

    #[test]
    fn stop_and_close_are_idempotent() {
        let mut emg = DummyEmg::open(DummyEmgConfig::default()).unwrap();
        emg.stop();
        emg.stop();
        emg.close();
        emg.close();

        // Never started at all; teardown still has to hold.
        let mut tracker = DummyTracker::open(DummyTrackerConfig::default()).unwrap();
        tracker.close();
        tracker.stop();
        tracker.close();
    }

    #[test]
    fn injected_disconnect_surfaces_in_poll() {
        let mut emg = DummyEmg::open(DummyEmgConfig::default()).unwrap();
        emg.start().unwrap();
        emg.inject_disconnect();
        assert_eq!(emg.poll(), Reading::Disconnected);
        emg.close();
    }
}
