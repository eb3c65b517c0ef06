//! Live per-channel view of the sEMG stream, for checking electrode
//! contact before a session. Runs on the synthetic source so it can be
//! used anywhere.

mod gui;

use std::sync::{Arc, Mutex};

use gui::engage_gui;
use myograsp::dummy_sources::{DummyEmg, DummyEmgConfig};
use myograsp::sensor_source::{Reading, SensorSource};

fn main() {
    env_logger::init();

    let mut emg = DummyEmg::open(DummyEmgConfig::default()).expect("synthetic source opens");
    emg.start().expect("synthetic source starts");

    let emg_mtx = Arc::new(Mutex::new(emg));
    let poll_handle = Arc::clone(&emg_mtx);

    let _ = engage_gui(Box::new(move || {
        let mut source = poll_handle.lock().unwrap();
        let mut latest = None;
        while let Reading::Sample(sample) = source.poll() {
            latest = Some(sample);
        }
        latest
            .map(|sample| {
                sample
                    .channels
                    .iter()
                    .enumerate()
                    .map(|(channel, &value)| (channel as f64, value as f64))
                    .collect()
            })
            .unwrap_or_default()
    }));

    emg_mtx.lock().unwrap().close();
}
