// Commandline argument parser using clap for MyoGrasp

use clap::Parser;
use std::path::PathBuf;

/// Everything the session runner needs from the operator.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GraspArgs {
    /// Subject serial, embedded in the dataset directory and file names
    #[arg(short = 's', long = "subject")]
    pub subject: String,

    /// Sitting index within this subject's recording session
    #[arg(long = "sitting", default_value_t = 1)]
    pub sitting: u32,

    /// Position index to record in this run
    #[arg(short = 'p', long = "position", default_value_t = 1)]
    pub position: u32,

    /// Trials to record per gesture
    #[arg(short = 'n', long = "reps", default_value_t = 5)]
    pub num_repetition: u32,

    /// Seconds the subject holds each gesture
    #[arg(long = "hold", default_value_t = 5.0)]
    pub gesture_duration: f32,

    /// Seconds of rest between gestures
    #[arg(long = "rest", default_value_t = 5.0)]
    pub rest_duration: f32,

    /// Directory of gesture prompt images (png/jpg), one per gesture
    #[arg(short = 'g', long = "gestures")]
    pub gesture_dir: PathBuf,

    /// Root directory the dataset is written under
    #[arg(short = 'o', long = "out", default_value = "dataset")]
    pub out_dir: PathBuf,

    /// Record from synthetic sources instead of real hardware
    #[arg(long)]
    pub dummy: bool,

    /// Serial port of the sEMG transceiver dongle; selected interactively
    /// when not given
    #[arg(long = "port")]
    pub emg_port: Option<PathBuf>,

    /// Host of the hand-tracking camera service
    #[arg(long = "tracker-host", default_value = "127.0.0.1")]
    pub tracker_host: String,

    /// TCP port of the hand-tracking camera service
    #[arg(long = "tracker-port", default_value_t = 20001)]
    pub tracker_port: u16,

    /// Seconds to wait for the tracking service to accept the connection
    #[arg(long = "tracker-timeout", default_value_t = 20)]
    pub tracker_timeout: u64,
}
