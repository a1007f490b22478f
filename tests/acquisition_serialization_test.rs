//! Concurrency test: logical acquisitions must never interleave their
//! per-call hardware commands.

use spectro_daq::acquisition::AcquisitionCoordinator;
use spectro_daq::device::mock::{command_log, MockCamera, MockSpectrograph};
use spectro_daq::session::{CameraSession, SpectrographSession};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Camera command sequence issued by one software-triggered acquisition.
const ACQUISITION_SEQUENCE: [&str; 5] = [
    "camera.set_trigger_mode",
    "camera.start_acquisition",
    "camera.send_software_trigger",
    "camera.wait_for_frame",
    "camera.read_newest_frame",
];

#[test]
fn test_concurrent_acquisitions_do_not_interleave() {
    let log = command_log();
    let camera = Arc::new(CameraSession::new(
        Box::new(MockCamera::new().with_log(log.clone())),
        Duration::from_secs(5),
    ));
    let spectrograph = Arc::new(SpectrographSession::new(Box::new(MockSpectrograph::new())));
    camera.connect().unwrap();
    spectrograph.connect().unwrap();
    spectrograph.configure_from_camera(1024).unwrap();

    let coordinator = Arc::new(AcquisitionCoordinator::new(camera, spectrograph));
    let marker = log.lock().unwrap().len();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                coordinator
                    .acquire_spectrum_software_triggered(532.0, Duration::from_secs(2))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        let spectrum = handle.join().unwrap();
        assert_eq!(spectrum.intensity.len(), 1024);
    }

    // Filter down to camera commands issued after setup; the two
    // acquisitions must appear as two whole back-to-back sequences.
    let entries = log.lock().unwrap();
    let camera_commands: Vec<&str> = entries[marker..]
        .iter()
        .map(String::as_str)
        .filter(|entry| entry.starts_with("camera."))
        .collect();
    assert_eq!(camera_commands.len(), 2 * ACQUISITION_SEQUENCE.len());
    for chunk in camera_commands.chunks(ACQUISITION_SEQUENCE.len()) {
        assert_eq!(chunk, ACQUISITION_SEQUENCE);
    }
}

#[test]
fn test_concurrent_blocking_acquisitions_serialize() {
    let log = command_log();
    let camera = Arc::new(CameraSession::new(
        Box::new(MockCamera::new().with_log(log.clone())),
        Duration::from_secs(5),
    ));
    let spectrograph = Arc::new(SpectrographSession::new(Box::new(MockSpectrograph::new())));
    camera.connect().unwrap();
    spectrograph.connect().unwrap();
    spectrograph.configure_from_camera(1024).unwrap();
    let coordinator = Arc::new(AcquisitionCoordinator::new(camera, spectrograph));
    let marker = log.lock().unwrap().len();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = coordinator.clone();
            thread::spawn(move || coordinator.acquire_spectrum(532.0).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = log.lock().unwrap();
    let snaps = entries[marker..]
        .iter()
        .filter(|entry| entry.as_str() == "camera.snap")
        .count();
    assert_eq!(snaps, 4);
}
