//! This module provides an API to read and write [TraceFile]s, the
//! container both Position stores use for timestamped sensor streams. The
//! files have the following structure:
//!
//! - First there is a header that contains some metadata:
//!   - The number of data streams
//!   - An array of tags naming each stream; the first stream is always
//!     [`TraceTag::Seconds`], the receipt timestamps that make the two
//!     stores of a Position comparable.
//! - Then there is a separator, which is a byte of all 1s; `0xFF`.
//! - Finally, the samples, which are `f32`s, interleaved one value from
//!   each stream in order.
//!
//! More concretely, the header is encoded using [serde] and [ron]. In the
//! file, it appears as follows:
//!
//! ```text
//! (n_streams:A,tags:[B, C,...])
//! ```
//!
//! Streams are irregularly sampled (a value's time is whatever the
//! `Seconds` stream says on its row), so there is no sample-rate field;
//! rows simply follow receipt order.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use crate::sensor_source::{EmgSample, PoseFrame, Stamped, EMG_CHANNELS, FINGERS};

/// This struct contains the header and samples associated with a TraceFile.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFile {
    header: TraceFileHeader,
    samples: Vec<f32>,
}

/// This struct contains the header data for a [TraceFile].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
struct TraceFileHeader {
    n_streams: u64,
    tags: Vec<TraceTag>,
}

/// The [TraceTag] identifies what a particular stream contains.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum TraceTag {
    /// Receipt timestamp, in seconds since the session origin.
    Seconds,
    /// One sEMG electrode channel, indexed 0..16.
    Emg(u8),
    /// Palm position, cartesian.
    PalmX,
    /// Palm position, cartesian.
    PalmY,
    /// Palm position, cartesian.
    PalmZ,
    /// Palm orientation, angular.
    Pitch,
    /// Palm orientation, angular.
    Yaw,
    /// Palm orientation, angular.
    Roll,
    /// Fingertip position for the indexed finger, thumb first.
    TipX(u8),
    /// Fingertip position for the indexed finger, thumb first.
    TipY(u8),
    /// Fingertip position for the indexed finger, thumb first.
    TipZ(u8),
}

/// A nice little error that we can return if things go wrong throughout
/// the process of reading, building, or writing a [TraceFile].
#[derive(Debug)]
pub enum TraceFileError {
    /// Returned when trying to build a [TraceFile] using
    /// [TraceFileBuilder::build()] and the streams are of unequal lengths.
    UnequalStreamLengths,

    /// Returned when trying to read a [TraceFile], but are not able to
    /// find the delimiter between the header and sample binary.
    NoDelimiter,

    /// Returned when somehow we fail to turn four bytes into a f32 when
    /// reading.
    TryInto,

    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),

    /// Returned when serialization of the header fails.
    RonError(ron::Error),

    /// Returned when deserialization of the header fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for TraceFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TraceFileError as TFE;
        let msg = match self {
            TFE::UnequalStreamLengths => Cow::from("unequal stream lengths"),
            TFE::NoDelimiter => Cow::from("no delimiter in TraceFile"),
            TFE::TryInto => Cow::from("something went wrong while parsing f32s"),
            TFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            TFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            TFE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for TraceFileError {}

/// Maps a sensor payload onto its store streams. The `Seconds` stream is
/// prepended by [`TraceFile::from_stamped`]; implementations only describe
/// the payload's own values.
pub trait TraceEncode {
    /// The tag of each stream this payload contributes, in row order.
    fn tags() -> Vec<TraceTag>;
    /// One value per tag, same order as [`tags`](Self::tags).
    fn row(&self) -> Vec<f32>;
}

impl TraceEncode for EmgSample {
    fn tags() -> Vec<TraceTag> {
        (0..EMG_CHANNELS as u8).map(TraceTag::Emg).collect()
    }

    fn row(&self) -> Vec<f32> {
        self.channels.to_vec()
    }
}

impl TraceEncode for PoseFrame {
    fn tags() -> Vec<TraceTag> {
        let mut tags = vec![
            TraceTag::PalmX,
            TraceTag::PalmY,
            TraceTag::PalmZ,
            TraceTag::Pitch,
            TraceTag::Yaw,
            TraceTag::Roll,
        ];
        for finger in 0..FINGERS as u8 {
            tags.push(TraceTag::TipX(finger));
            tags.push(TraceTag::TipY(finger));
            tags.push(TraceTag::TipZ(finger));
        }
        tags
    }

    fn row(&self) -> Vec<f32> {
        let mut row = Vec::with_capacity(6 + 3 * FINGERS);
        row.extend_from_slice(&self.palm);
        row.extend_from_slice(&self.orientation);
        for tip in &self.fingertips {
            row.extend_from_slice(tip);
        }
        row
    }
}

impl TraceFile {
    /// Make a [TraceFileBuilder], which can be used to add tagged streams
    /// before building the [TraceFile].
    pub fn builder() -> TraceFileBuilder {
        TraceFileBuilder::new()
    }

    /// Build a [TraceFile] directly from a drained capture buffer: one
    /// `Seconds` stream of receipt stamps plus the payload's own streams.
    pub fn from_stamped<T: TraceEncode>(samples: &[Stamped<T>]) -> Self {
        let mut tags = vec![TraceTag::Seconds];
        tags.extend(T::tags());
        let n_streams = tags.len();

        let mut interleaved = Vec::with_capacity(n_streams * samples.len());
        for stamped in samples {
            interleaved.push(stamped.timestamp.as_secs_f32());
            interleaved.extend(stamped.payload.row());
        }

        TraceFile {
            header: TraceFileHeader {
                n_streams: n_streams as u64,
                tags,
            },
            samples: interleaved,
        }
    }

    /// Number of rows (samples per stream) in the file.
    pub fn rows(&self) -> usize {
        if self.header.n_streams == 0 {
            0
        } else {
            self.samples.len() / self.header.n_streams as usize
        }
    }

    /// Write out a [TraceFile] to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TraceFileError> {
        let mut handle = File::create(path).map_err(TraceFileError::IoError)?;
        self.to_file(&mut handle)
    }

    /// Write out a [TraceFile] to the [Write]able object provided.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), TraceFileError> {
        let h_str = ron::ser::to_string(&self.header).map_err(TraceFileError::RonError)?;
        let h_buf = h_str.as_bytes();

        file.write_all(h_buf).map_err(TraceFileError::IoError)?;

        file.write_all(&[0xFF]).map_err(TraceFileError::IoError)?;

        let s_buf: Vec<u8> = self.samples.iter().flat_map(|f| f.to_be_bytes()).collect();

        file.write_all(&s_buf).map_err(TraceFileError::IoError)
    }

    /// Read a [TraceFile] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceFileError> {
        let mut handle = File::open(path).map_err(TraceFileError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Read a [TraceFile] from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, TraceFileError> {
        let mut raw_text = Vec::new();
        file.read_to_end(&mut raw_text)
            .map_err(TraceFileError::IoError)?;

        let delim_idx = raw_text
            .iter()
            .position(|e| *e == 0xFF)
            .ok_or(TraceFileError::NoDelimiter)?;

        let (header_buf, samples_buf) = raw_text.split_at(delim_idx);
        let samples_buf = &samples_buf[1..];

        let header = ron::de::from_bytes::<TraceFileHeader>(header_buf)
            .map_err(TraceFileError::RonSpannedError)?;

        let samples: Vec<f32> = samples_buf
            .chunks(4)
            .map(|bs| {
                let four_bytes: [u8; 4] =
                    bs[0..4].try_into().map_err(|_| TraceFileError::TryInto)?;
                Ok(f32::from_be_bytes(four_bytes))
            })
            .collect::<Result<Vec<f32>, TraceFileError>>()?;

        Ok(TraceFile { header, samples })
    }

    /// Extract the tagged streams from a [TraceFile].
    pub fn streams(&self) -> Vec<(TraceTag, Vec<f32>)> {
        let n_streams = self.header.n_streams as usize;
        let sample_vecs: Vec<Vec<f32>> = (0..n_streams)
            .map(|i| {
                self.samples
                    .iter()
                    .skip(i)
                    .step_by(n_streams)
                    .cloned()
                    .collect()
            })
            .collect();

        self.header.tags.iter().cloned().zip(sample_vecs).collect()
    }
}

/// Collects tagged streams until they are assembled into a [TraceFile].
#[derive(Debug, Clone, Default)]
pub struct TraceFileBuilder {
    streams: Vec<(TraceTag, Vec<f32>)>,
}

impl TraceFileBuilder {
    fn new() -> Self {
        TraceFileBuilder {
            streams: Vec::new(),
        }
    }

    /// Adds a tagged stream to the builder.
    pub fn add_stream(mut self, stream: &[f32], tag: TraceTag) -> Self {
        self.streams.push((tag, stream.to_vec()));
        self
    }

    /// Builds a [TraceFile] from the builder, returning the [TraceFile] if
    /// all streams are of the same length, and
    /// [TraceFileError::UnequalStreamLengths] otherwise.
    pub fn build(self) -> Result<TraceFile, TraceFileError> {
        let lens: Vec<usize> = self.streams.iter().map(|(_tag, v)| v.len()).collect();
        if !lens.windows(2).all(|w| w[0] == w[1]) {
            return Err(TraceFileError::UnequalStreamLengths);
        }

        let tags: Vec<TraceTag> = self.streams.iter().map(|(tag, _vec)| *tag).collect();
        let rows = lens.first().copied().unwrap_or(0);

        let mut samples = Vec::with_capacity(rows * self.streams.len());
        for row_idx in 0..rows {
            for (_tag, stream) in &self.streams {
                samples.push(stream[row_idx]);
            }
        }

        Ok(TraceFile {
            header: TraceFileHeader {
                n_streams: self.streams.len() as u64,
                tags,
            },
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp_authority::MonotonicTime;
    use std::io::Cursor;

    const A_FLOAT: f32 = 12.078_431;

    fn stamped_emg(n: usize) -> Vec<Stamped<EmgSample>> {
        (0..n)
            .map(|i| Stamped {
                timestamp: MonotonicTime::from_micros(i as u64 * 1_000),
                payload: EmgSample {
                    seq: i as u32,
                    channels: [i as f32; EMG_CHANNELS],
                },
            })
            .collect()
    }

    #[test]
    fn write_and_read_path() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let path = tempfile.path();
        let data = TraceFile::builder()
            .add_stream(&[A_FLOAT; 4], TraceTag::Seconds)
            .add_stream(&[A_FLOAT; 4], TraceTag::Emg(0))
            .build()
            .unwrap();

        data.to_path(path).unwrap();
        let read_data = TraceFile::from_path(path).unwrap();
        assert_eq!(data, read_data);
    }

    #[test]
    fn write_and_read_cursor() {
        let mut buf = Cursor::new(Vec::new());
        let data = TraceFile::builder()
            .add_stream(&[A_FLOAT; 4], TraceTag::Seconds)
            .add_stream(&[A_FLOAT; 4], TraceTag::PalmX)
            .build()
            .unwrap();

        data.to_file(&mut buf).unwrap();
        buf.set_position(0);
        let read_data = TraceFile::from_file(&mut buf).unwrap();
        assert_eq!(data, read_data);
    }

    #[test]
    fn unequal_streams_do_not_build() {
        let result = TraceFile::builder()
            .add_stream(&[1.0, 2.0], TraceTag::Seconds)
            .add_stream(&[1.0], TraceTag::Emg(0))
            .build();

        assert!(matches!(result, Err(TraceFileError::UnequalStreamLengths)));
    }

    #[test]
    fn read_from_empty() {
        let data = TraceFile::builder().build().unwrap();

        assert_eq!(data.rows(), 0);
        assert!(data.streams().is_empty());
    }

    #[test]
    fn emg_buffer_round_trip() {
        let samples = stamped_emg(8);
        let data = TraceFile::from_stamped(&samples);

        assert_eq!(data.rows(), 8);

        let mut buf = Cursor::new(Vec::new());
        data.to_file(&mut buf).unwrap();
        buf.set_position(0);
        let read_data = TraceFile::from_file(&mut buf).unwrap();

        let streams = read_data.streams();
        // Seconds stream first, then the sixteen electrode channels.
        assert_eq!(streams.len(), 1 + EMG_CHANNELS);
        assert_eq!(streams[0].0, TraceTag::Seconds);
        assert_eq!(streams[0].1[3], 0.003);
        assert_eq!(streams[1].0, TraceTag::Emg(0));
        assert_eq!(streams[16].1[7], 7.0);
    }

    #[test]
    fn timestamps_survive_in_append_order() {
        let samples = stamped_emg(32);
        let data = TraceFile::from_stamped(&samples);

        let streams = data.streams();
        let seconds = &streams[0].1;
        assert!(seconds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn pose_buffer_round_trip() {
        let frame = PoseFrame {
            frame_id: 1,
            palm: [0.1, 0.2, 0.3],
            orientation: [-0.5, 0.0, 0.5],
            fingertips: [[1.0; 3], [2.0; 3], [3.0; 3], [4.0; 3], [5.0; 3]],
        };
        let samples = vec![Stamped {
            timestamp: MonotonicTime::from_micros(500),
            payload: frame,
        }];

        let data = TraceFile::from_stamped(&samples);
        let mut buf = Cursor::new(Vec::new());
        data.to_file(&mut buf).unwrap();
        buf.set_position(0);
        let read_data = TraceFile::from_file(&mut buf).unwrap();

        let streams = read_data.streams();
        assert_eq!(streams.len(), 1 + 6 + 3 * FINGERS);
        assert_eq!(streams[0].1, vec![0.0005]);
        assert_eq!(streams[1].0, TraceTag::PalmX);
        assert_eq!(streams[1].1, vec![0.1]);
        assert_eq!(streams.last().unwrap().0, TraceTag::TipZ(4));
        assert_eq!(streams.last().unwrap().1, vec![5.0]);
    }
}
