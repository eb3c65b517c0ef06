//! Adapter for the wireless sEMG acquisition unit. Its BLE transceiver
//! enumerates as a serial dongle; samples arrive as newline-delimited
//! `+EMG:` frames at the device's native rate, with the occasional
//! `+BAT:` status line mixed in.

use crate::frame_decoder::{LineAssembler, TransceiverFrame};
use crate::sensor_source::{
    BiosignalSource, ConnectionError, EmgSample, Reading, SensorSource,
};

use log::{debug, warn};
use serial2::SerialPort;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

/// Baud rate the transceiver firmware ships with.
pub const DEFAULT_BAUD: u32 = 115200;

/// How long a single poll may wait on the port before reporting Empty.
const READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Where to find the dongle.
#[derive(Debug, Clone)]
pub struct SerialEmgConfig {
    pub port: PathBuf,
    pub baud: u32,
}

impl SerialEmgConfig {
    pub fn new(port: PathBuf) -> Self {
        Self {
            port,
            baud: DEFAULT_BAUD,
        }
    }
}

/// A [`BiosignalSource`] backed by the transceiver's serial port.
pub struct SerialEmg {
    port: Option<SerialPort>,
    assembler: LineAssembler<TransceiverFrame>,
    frames: VecDeque<TransceiverFrame>,
    started: bool,
    disconnected: bool,
}

impl SerialEmg {
    /// Take the next parsed sample off the frame queue, logging past any
    /// interleaved status frames.
    fn next_sample(&mut self) -> Option<EmgSample> {
        while let Some(frame) = self.frames.pop_front() {
            match frame {
                TransceiverFrame::Sample(sample) => return Some(sample),
                TransceiverFrame::Battery(percent) => {
                    debug!("transceiver battery at {}%", percent);
                }
            }
        }
        None
    }
}

impl SensorSource for SerialEmg {
    type Config = SerialEmgConfig;
    type Payload = EmgSample;

    fn open(config: SerialEmgConfig) -> Result<Self, ConnectionError> {
        let port_name = config.port.display().to_string();
        let mut port = SerialPort::open(&config.port, config.baud).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConnectionError::Unreachable(port_name.clone()),
            ErrorKind::PermissionDenied => ConnectionError::AlreadyClaimed(port_name.clone()),
            _ => ConnectionError::Io(e),
        })?;
        port.set_read_timeout(READ_TIMEOUT)?;

        Ok(SerialEmg {
            port: Some(port),
            assembler: LineAssembler::new(),
            frames: VecDeque::new(),
            started: false,
            disconnected: false,
        })
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        if self.started {
            return Ok(());
        }
        // Whatever accumulated on the port before the session belongs to
        // nobody; capture starts from a clean line buffer.
        if let Some(port) = &self.port {
            port.discard_buffers()?;
        }
        self.frames.clear();
        self.started = true;
        Ok(())
    }

    fn poll(&mut self) -> Reading<EmgSample> {
        if self.disconnected {
            return Reading::Disconnected;
        }
        if !self.started {
            return Reading::Empty;
        }
        if let Some(sample) = self.next_sample() {
            return Reading::Sample(sample);
        }

        let port = match &self.port {
            Some(port) => port,
            None => return Reading::Disconnected,
        };

        let mut buffer = [0u8; 256];
        match port.read(&mut buffer) {
            Ok(0) => {
                warn!("transceiver port returned end-of-stream");
                self.disconnected = true;
                return Reading::Disconnected;
            }
            Ok(read_len) => {
                self.assembler.extend(&buffer[..read_len], &mut self.frames);
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Reading::Empty;
            }
            Err(e) => {
                warn!("transceiver port read failed: {}", e);
                self.disconnected = true;
                return Reading::Disconnected;
            }
        }

        match self.next_sample() {
            Some(sample) => Reading::Sample(sample),
            None => Reading::Empty,
        }
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn close(&mut self) {
        self.started = false;
        self.port = None;
    }
}

impl BiosignalSource for SerialEmg {}
