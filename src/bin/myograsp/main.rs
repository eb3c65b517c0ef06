//! Records one Position of a MyoGrasp session: prompts the subject
//! through the trial schedule while both sensor streams are captured and
//! written under the dataset directory.

use clap::Parser;
use myograsp::{
    args::GraspArgs,
    dummy_sources::{DummyEmg, DummyEmgConfig, DummyTracker, DummyTrackerConfig},
    gesture_set::scan_gesture_dir,
    gui::{pick_from_list, TerminalPrompt},
    serial_emg::{SerialEmg, SerialEmgConfig},
    session::{PositionSummary, Session, SessionConfig},
    tracker_client::{TrackerClient, TrackerClientConfig},
};

use log::info;
use serial2::SerialPort;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

// Example:
// cargo run --bin myograsp --
//                          --subject  007
//                          --sitting  1
//                          --position 2
//                          --reps     5
//                          --hold     5 --rest 5
//                          --gestures images/
//                          --dummy

fn main() {
    env_logger::init();
    let args = GraspArgs::parse();

    if let Err(error) = run(args) {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}

fn run(args: GraspArgs) -> Result<(), Box<dyn Error>> {
    let gestures = scan_gesture_dir(&args.gesture_dir)?;
    info!(
        "loaded {} gestures from {}",
        gestures.len(),
        args.gesture_dir.display()
    );

    let session = Session::new(SessionConfig {
        subject: args.subject.clone(),
        sitting: args.sitting,
        num_repetition: args.num_repetition,
        gesture_duration: Duration::from_secs_f32(args.gesture_duration),
        rest_duration: Duration::from_secs_f32(args.rest_duration),
        gestures,
        out_dir: args.out_dir.clone(),
    })?;

    let abort = AtomicBool::new(false);

    let summary = if args.dummy {
        let mut prompt = TerminalPrompt::new(&args.subject, args.position)?;
        if !prompt.wait_for_ready()? {
            return Ok(());
        }
        session.run_position::<DummyEmg, DummyTracker>(
            args.position,
            DummyEmgConfig::default(),
            DummyTrackerConfig::default(),
            &mut prompt,
            &abort,
        )?
    } else {
        let port = match args.emg_port.clone() {
            Some(port) => port,
            None => select_transceiver_port()?,
        };
        let tracker_config = TrackerClientConfig {
            host: args.tracker_host.clone(),
            port: args.tracker_port,
            connect_timeout: Duration::from_secs(args.tracker_timeout),
        };

        let mut prompt = TerminalPrompt::new(&args.subject, args.position)?;
        if !prompt.wait_for_ready()? {
            return Ok(());
        }
        session.run_position::<SerialEmg, TrackerClient>(
            args.position,
            SerialEmgConfig::new(port),
            tracker_config,
            &mut prompt,
            &abort,
        )?
    };

    report(&summary);
    Ok(())
}

fn select_transceiver_port() -> Result<PathBuf, Box<dyn Error>> {
    let mut available = SerialPort::available_ports()?;
    let names: Vec<String> = available
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();

    match pick_from_list("Transceiver Selector", &names)? {
        Some(index) => Ok(available.swap_remove(index)),
        None => Err("no transceiver port selected".into()),
    }
}

fn report(summary: &PositionSummary) {
    println!(
        "position P{} {}",
        summary.position,
        if summary.completed {
            "complete"
        } else {
            "incomplete"
        }
    );
    println!("  trials recorded: {}", summary.run.outcomes.len());
    println!(
        "  biosignal: {} samples, {} dropped -> {}",
        summary.biosignal.samples_written,
        summary.biosignal.dropped,
        summary.biosignal.store_path.display()
    );
    println!(
        "  motion: {} frames, {} dropped -> {}",
        summary.motion.samples_written,
        summary.motion.dropped,
        summary.motion.store_path.display()
    );
    if summary.biosignal.disconnected {
        println!("  warning: biosignal stream disconnected mid-capture");
    }
    if summary.motion.disconnected {
        println!("  warning: motion stream disconnected mid-capture");
    }
    println!("  log: {}", summary.log_path.display());
}
