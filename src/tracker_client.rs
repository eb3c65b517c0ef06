//! Adapter for the optical hand-tracking camera. The vendor's background
//! service owns the camera itself and republishes skeleton frames as
//! newline-delimited `+POSE:` lines on a localhost TCP socket, so this
//! side is just a socket client with the same line-reassembly poll as the
//! serial adapter.

use crate::frame_decoder::LineAssembler;
use crate::sensor_source::{
    ConnectionError, MotionSource, PoseFrame, Reading, SensorSource,
};

use log::warn;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Where the tracking service listens.
#[derive(Debug, Clone)]
pub struct TrackerClientConfig {
    pub host: String,
    pub port: u16,
    /// How long to wait for the service to accept the connection.
    pub connect_timeout: Duration,
}

impl Default for TrackerClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20001,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// A [`MotionSource`] fed by the tracking service's frame socket.
pub struct TrackerClient {
    stream: Option<TcpStream>,
    assembler: LineAssembler<PoseFrame>,
    frames: VecDeque<PoseFrame>,
    started: bool,
    disconnected: bool,
}

impl SensorSource for TrackerClient {
    type Config = TrackerClientConfig;
    type Payload = PoseFrame;

    fn open(config: TrackerClientConfig) -> Result<Self, ConnectionError> {
        let endpoint = format!("{}:{}", config.host, config.port);
        let addr = endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ConnectionError::Unreachable(endpoint.clone()))?;

        let stream =
            TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(|e| {
                match e.kind() {
                    ErrorKind::ConnectionRefused | ErrorKind::TimedOut => {
                        ConnectionError::Unreachable(endpoint.clone())
                    }
                    _ => ConnectionError::Io(e),
                }
            })?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;

        Ok(TrackerClient {
            stream: Some(stream),
            assembler: LineAssembler::new(),
            frames: VecDeque::new(),
            started: false,
            disconnected: false,
        })
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        // The service streams continuously; starting just means we begin
        // keeping frames instead of ignoring the backlog.
        self.frames.clear();
        self.started = true;
        Ok(())
    }

    fn poll(&mut self) -> Reading<PoseFrame> {
        if self.disconnected {
            return Reading::Disconnected;
        }
        if !self.started {
            return Reading::Empty;
        }
        if let Some(frame) = self.frames.pop_front() {
            return Reading::Sample(frame);
        }

        let stream = match &mut self.stream {
            Some(stream) => stream,
            None => return Reading::Disconnected,
        };

        let mut buffer = [0u8; 1024];
        match stream.read(&mut buffer) {
            Ok(0) => {
                warn!("tracking service closed its frame socket");
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
                warn!("tracking service read failed: {}", e);
                self.disconnected = true;
                return Reading::Disconnected;
            }
        }

        match self.frames.pop_front() {
            Some(frame) => Reading::Sample(frame),
            None => Reading::Empty,
        }
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn close(&mut self) {
        self.started = false;
        self.stream = None;
    }
}

impl MotionSource for TrackerClient {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Serve a canned set of pose lines from an ephemeral local port.
    fn pose_fixture_service(lines: &'static str) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut socket, _addr) = listener.accept().unwrap();
            socket.write_all(lines.as_bytes()).unwrap();
            // Closing the socket ends the stream; clients should see a
            // disconnect, not an error.
        });
        (port, handle)
    }

    #[test]
    fn reads_frames_then_observes_disconnect() {
        let (port, service) = pose_fixture_service(
            "+POSE:0,1,2,3,0,0,0,1,1,1,2,2,2,3,3,3,4,4,4,5,5,5\n\
             +POSE:1,4,5,6,0,0,0,1,1,1,2,2,2,3,3,3,4,4,4,5,5,5\n",
        );

        let mut client = TrackerClient::open(TrackerClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_secs(5),
        })
        .unwrap();
        client.start().unwrap();

        let mut frames = Vec::new();
        while frames.len() < 2 {
            match client.poll() {
                Reading::Sample(frame) => frames.push(frame),
                Reading::Empty => thread::sleep(Duration::from_millis(1)),
                Reading::Disconnected => panic!("disconnected before both frames arrived"),
            }
        }
        assert_eq!(frames[0].frame_id, 0);
        assert_eq!(frames[0].palm, [1.0, 2.0, 3.0]);
        assert_eq!(frames[1].frame_id, 1);

        service.join().unwrap();
        // Service hung up; once the buffer drains the client must say so.
        loop {
            match client.poll() {
                Reading::Sample(_) => {}
                Reading::Empty => thread::sleep(Duration::from_millis(1)),
                Reading::Disconnected => break,
            }
        }

        client.close();
        client.close();
    }

    #[test]
    fn open_fails_when_nobody_listens() {
        // Bind-then-drop guarantees the port is dead.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TrackerClient::open(TrackerClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_millis(500),
        });
        assert!(matches!(result, Err(ConnectionError::Unreachable(_))));
    }
}
