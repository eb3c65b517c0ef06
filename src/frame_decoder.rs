//! Parsers for the newline-delimited ASCII frames that the two devices
//! emit: the BLE sEMG transceiver dongle writes `+EMG:`/`+BAT:` lines on
//! its serial port, and the tracking camera's vendor service streams
//! `+POSE:` lines over its local TCP socket.

use nom::{
    bytes::complete::tag,
    character::complete::{char, u32},
    combinator::map,
    error::Error,
    multi::count,
    number::complete::float,
    sequence::{preceded, tuple},
    Finish, IResult,
};

use log::warn;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::sensor_source::{EmgSample, PoseFrame, EMG_CHANNELS, FINGERS};

/// One line from the sEMG transceiver. Battery reports are interleaved
/// with sample frames on the same serial stream; they are logged and
/// otherwise ignored by the capture path.
#[derive(Debug, Clone, PartialEq)]
pub enum TransceiverFrame {
    /// A 16-channel sample frame.
    Sample(EmgSample),
    /// A battery level report, in percent.
    Battery(u32),
}

fn parse_float_fields(n: usize) -> impl FnMut(&str) -> IResult<&str, Vec<f32>> {
    move |s| count(preceded(char(','), float), n)(s)
}

fn parse_emg_frame(s: &str) -> IResult<&str, EmgSample> {
    map(
        tuple((
            preceded(tag("+EMG:"), u32),
            parse_float_fields(EMG_CHANNELS),
        )),
        |(seq, values)| {
            let mut channels = [0.0; EMG_CHANNELS];
            channels.copy_from_slice(&values);
            EmgSample { seq, channels }
        },
    )(s)
}

fn parse_battery_frame(s: &str) -> IResult<&str, u32> {
    preceded(tag("+BAT:"), u32)(s)
}

fn parse_transceiver_frame(s: &str) -> IResult<&str, TransceiverFrame> {
    nom::branch::alt((
        map(parse_emg_frame, TransceiverFrame::Sample),
        map(parse_battery_frame, TransceiverFrame::Battery),
    ))(s)
}

/// Pose lines carry the frame counter, the palm position, the palm
/// orientation as pitch/yaw/roll, and then one xyz triplet per fingertip,
/// thumb first.
fn parse_pose_frame(s: &str) -> IResult<&str, PoseFrame> {
    map(
        tuple((
            preceded(tag("+POSE:"), u32),
            parse_float_fields(3),
            parse_float_fields(3),
            parse_float_fields(3 * FINGERS),
        )),
        |(frame_id, palm, orientation, tips)| {
            let mut frame = PoseFrame {
                frame_id,
                palm: [0.0; 3],
                orientation: [0.0; 3],
                fingertips: [[0.0; 3]; FINGERS],
            };
            frame.palm.copy_from_slice(&palm);
            frame.orientation.copy_from_slice(&orientation);
            for (finger, triplet) in tips.chunks(3).enumerate() {
                frame.fingertips[finger].copy_from_slice(triplet);
            }
            frame
        },
    )(s)
}

impl FromStr for TransceiverFrame {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_transceiver_frame(s).finish() {
            Ok((_remaining, frame)) => Ok(frame),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

impl FromStr for PoseFrame {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_pose_frame(s).finish() {
            Ok((_remaining, frame)) => Ok(frame),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

/// Reassembles newline-delimited frames from the arbitrary byte chunks a
/// transport hands us, parsing each completed line as an `F`. Garbage
/// lines are warned about and skipped rather than treated as fatal; at the
/// start of a transmission there is often still junk in the device buffer.
#[derive(Debug, Default)]
pub struct LineAssembler<F> {
    partial: Vec<u8>,
    _frame: PhantomData<F>,
}

impl<F> LineAssembler<F>
where
    F: FromStr<Err = Error<String>>,
{
    /// An assembler with an empty partial-line buffer.
    pub fn new() -> Self {
        Self {
            partial: Vec::new(),
            _frame: PhantomData,
        }
    }

    /// Feed a chunk of raw bytes, appending every frame completed by it
    /// to `out`.
    pub fn extend(&mut self, bytes: &[u8], out: &mut VecDeque<F>) {
        for &c in bytes {
            if c != b'\n' {
                self.partial.push(c);
                continue;
            }
            match std::str::from_utf8(&self.partial) {
                Ok(line) => match F::from_str(line.trim_end_matches('\r')) {
                    Ok(frame) => out.push_back(frame),
                    Err(e) => warn!("was unable to parse device frame: {:?}", e),
                },
                Err(e) => warn!("failed to decode utf-8: {:?}", e),
            }
            self.partial.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_emg_frame() {
        let s = "+EMG:41,0.5,-1.25,3,4,5,6,7,8,9,10,11,12,13,14,15,1.5e2";

        let (leftover, frame) = parse_emg_frame(s).unwrap();

        assert_eq!(leftover, "");
        assert_eq!(frame.seq, 41);
        assert_eq!(frame.channels[0], 0.5);
        assert_eq!(frame.channels[1], -1.25);
        assert_eq!(frame.channels[15], 150.0);
    }

    #[test]
    fn parses_battery_frame() {
        let frame = TransceiverFrame::from_str("+BAT:87").unwrap();
        assert_eq!(frame, TransceiverFrame::Battery(87));
    }

    #[test]
    fn parses_pose_frame() {
        let s = "+POSE:9,0.1,0.2,0.3,-0.5,0.25,1.0,\
                 1,1,1,2,2,2,3,3,3,4,4,4,5,5,5";

        let frame = PoseFrame::from_str(s).unwrap();

        assert_eq!(frame.frame_id, 9);
        assert_eq!(frame.palm, [0.1, 0.2, 0.3]);
        assert_eq!(frame.orientation, [-0.5, 0.25, 1.0]);
        assert_eq!(frame.fingertips[0], [1.0, 1.0, 1.0]);
        assert_eq!(frame.fingertips[4], [5.0, 5.0, 5.0]);
    }

    #[test]
    fn tolerates_trailing_carriage_return() {
        let frame =
            TransceiverFrame::from_str("+EMG:1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0\r").unwrap();
        assert!(matches!(frame, TransceiverFrame::Sample(_)));
    }

    #[test]
    fn rejects_short_emg_frame() {
        // only 8 of the 16 channels present
        assert!(TransceiverFrame::from_str("+EMG:1,0,1,2,3,4,5,6,7").is_err());
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(TransceiverFrame::from_str("+UNK:1,2,3").is_err());
        assert!(PoseFrame::from_str("garbage").is_err());
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut assembler = LineAssembler::<TransceiverFrame>::new();
        let mut out = VecDeque::new();

        assembler.extend(b"+BAT:50\n+EMG:7,0,1,2,3,4,5,6,", &mut out);
        assert_eq!(out.len(), 1);

        assembler.extend(b"7,8,9,10,11,12,13,14,15\n", &mut out);
        assert_eq!(out.len(), 2);

        assert_eq!(out[0], TransceiverFrame::Battery(50));
        match &out[1] {
            TransceiverFrame::Sample(sample) => assert_eq!(sample.seq, 7),
            other => panic!("expected a sample frame, got {:?}", other),
        }
    }

    #[test]
    fn skips_garbage_lines() {
        let mut assembler = LineAssembler::<TransceiverFrame>::new();
        let mut out = VecDeque::new();

        assembler.extend(b"\x80\x81 startup junk\n+BAT:99\n", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], TransceiverFrame::Battery(99));
    }
}
