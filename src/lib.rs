//! MyoGrasp records time-aligned surface-electromyography and hand-pose
//! streams for gesture-recognition datasets. A wireless 16-channel sEMG
//! unit and an optical hand tracker are captured concurrently while the
//! subject follows gesture prompts on a fixed hold/rest schedule; every
//! sample from both devices is stamped by one shared monotonic clock at
//! the moment of receipt, so the two streams can be aligned afterwards
//! by timestamp alone.
//!
//! The engine is three concurrent tasks per recorded Position: one
//! capture loop per sensor (see [`stream_recorder`]) and the prompt
//! scheduler (see [`trial_scheduler`]), coordinated only through stamped
//! events. The `myograsp` binary runs a recording session; the `monitor`
//! binary shows live channel activity while electrodes are being fitted.

#![warn(missing_docs)]
pub mod args;
pub mod dummy_sources;
pub mod frame_decoder;
pub mod gesture_set;
pub mod gui;
pub mod sensor_source;
pub mod serial_emg;
pub mod session;
pub mod signal_data_format;
pub mod stream_recorder;
pub mod timestamp_authority;
pub mod tracker_client;
pub mod trial_scheduler;
