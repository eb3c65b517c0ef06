//! The capability traits that stand between the acquisition engine and the
//! vendor hardware. A [`SensorSource`] is anything that can be opened,
//! started, polled for samples, and torn down again; the engine never talks
//! to a device except through this surface, which is what lets the test
//! suite swap in the synthetic sources from [`crate::dummy_sources`].

use std::error::Error;
use std::fmt::{self, Display};

use crate::timestamp_authority::MonotonicTime;

/// Channel count of the sEMG acquisition unit. Fixed by the hardware.
pub const EMG_CHANNELS: usize = 16;

/// Number of tracked fingers in a [`PoseFrame`].
pub const FINGERS: usize = 5;

/// One reading from the sEMG unit: the device's own sequence counter and
/// one scalar per electrode. The sequence number is carried along for
/// diagnostics only; alignment always uses the receipt timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EmgSample {
    pub seq: u32,
    pub channels: [f32; EMG_CHANNELS],
}

/// One frame from the hand-tracking camera: palm position, palm
/// orientation as pitch/yaw/roll, and the position of each fingertip.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub frame_id: u32,
    pub palm: [f32; 3],
    pub orientation: [f32; 3],
    pub fingertips: [[f32; 3]; FINGERS],
}

/// A payload annotated with the session time at which it was pulled from
/// its adapter. Samples are append-only and never mutated after they are
/// stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub timestamp: MonotonicTime,
    pub payload: T,
}

/// Outcome of a single [`SensorSource::poll`] call. `Empty` is the normal
/// "nothing ready yet" case and is not an error; `Disconnected` means the
/// device is gone and no further samples will arrive on this handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    /// A sample was ready.
    Sample(T),
    /// Nothing ready yet; try again shortly.
    Empty,
    /// The device is gone for good.
    Disconnected,
}

/// Raised when a device cannot be opened or started.
#[derive(Debug)]
pub enum ConnectionError {
    /// The device did not respond at the configured address.
    Unreachable(String),
    /// Another process already holds the single physical device claim.
    AlreadyClaimed(String),
    /// The underlying transport failed while establishing the connection.
    Io(std::io::Error),
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Unreachable(what) => write!(f, "device unreachable: {}", what),
            ConnectionError::AlreadyClaimed(what) => write!(f, "device already claimed: {}", what),
            ConnectionError::Io(error) => write!(f, "io error while connecting: {}", error),
        }
    }
}

impl Error for ConnectionError {}

impl From<std::io::Error> for ConnectionError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// A pollable sensor device. All state lives in the handle; the only
/// global effect an implementation may have is the claim on its physical
/// device.
///
/// `stop` and `close` must be safe to call in any order, any number of
/// times, including when `start` never succeeded.
pub trait SensorSource {
    /// Whatever the concrete device needs to find its hardware.
    type Config;
    /// The sample type this device produces.
    type Payload;

    /// Establish the hardware connection.
    fn open(config: Self::Config) -> Result<Self, ConnectionError>
    where
        Self: Sized;

    /// Begin streaming. Calling `start` on a source that is already
    /// streaming is a no-op.
    fn start(&mut self) -> Result<(), ConnectionError>;

    /// Non-blocking (or very short-blocking) read of the next sample.
    fn poll(&mut self) -> Reading<Self::Payload>;

    /// Stop streaming without releasing the device.
    fn stop(&mut self);

    /// Release the device claim.
    fn close(&mut self);
}

/// A [`SensorSource`] producing 16-channel sEMG samples.
pub trait BiosignalSource: SensorSource<Payload = EmgSample> {}

/// A [`SensorSource`] producing hand-pose frames.
pub trait MotionSource: SensorSource<Payload = PoseFrame> {}
