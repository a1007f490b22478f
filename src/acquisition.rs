//! Acquisition coordinator: the single entry point for taking a measurement.
//!
//! Composes the camera and spectrograph sessions into a calibrated spectrum.
//! Both sessions are individually thread-safe, but a logical acquisition
//! spans several hardware commands across both devices; the coordinator
//! holds its own lock around the trigger + read + reduce sequence so two
//! logical acquisitions never interleave.

use crate::error::{AppResult, SpectroError};
use crate::session::{CameraSession, SpectrographSession};
use crate::spectrum::{mean_over_rows, raman_shift_cm1, SpectrumResult};
use crate::device::RawFrame;
use chrono::Utc;
use log::warn;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Composes the two device sessions into spectrum acquisitions.
pub struct AcquisitionCoordinator {
    camera: Arc<CameraSession>,
    spectrograph: Arc<SpectrographSession>,
    guard: Mutex<()>,
}

impl AcquisitionCoordinator {
    /// Builds a coordinator over the two sessions.
    pub fn new(camera: Arc<CameraSession>, spectrograph: Arc<SpectrographSession>) -> Self {
        Self {
            camera,
            spectrograph,
            guard: Mutex::new(()),
        }
    }

    /// The underlying camera session.
    pub fn camera(&self) -> &Arc<CameraSession> {
        &self.camera
    }

    /// The underlying spectrograph session.
    pub fn spectrograph(&self) -> &Arc<SpectrographSession> {
        &self.spectrograph
    }

    fn validate_laser(laser_nm: f64) -> AppResult<()> {
        if !laser_nm.is_finite() || laser_nm <= 0.0 {
            return Err(SpectroError::InvalidArgument(format!(
                "laser wavelength must be positive, got {laser_nm}"
            )));
        }
        Ok(())
    }

    fn reduce(&self, frame: RawFrame, laser_nm: f64) -> AppResult<SpectrumResult> {
        let acquired_at = Utc::now();
        let intensity = mean_over_rows(&frame);
        let wavelength_nm = self.spectrograph.calibration_nm()?;
        if wavelength_nm.len() != intensity.len() {
            // The axis reflects whatever calibration was cached at call time;
            // a mismatch means configuration changed without re-running
            // configure_from_camera.
            warn!(
                "Wavelength table has {} entries but the frame has {} columns",
                wavelength_nm.len(),
                intensity.len()
            );
        }
        let raman_shift = raman_shift_cm1(&wavelength_nm, laser_nm);
        Ok(SpectrumResult {
            acquired_at,
            laser_wavelength_nm: laser_nm,
            intensity,
            wavelength_nm,
            raman_shift_cm1: raman_shift,
        })
    }

    /// Blocking acquisition of one calibrated spectrum.
    pub fn acquire_spectrum(&self, laser_nm: f64) -> AppResult<SpectrumResult> {
        Self::validate_laser(laser_nm)?;
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let frame = self.camera.acquire_single()?;
        self.reduce(frame, laser_nm)
    }

    /// Same reduction and axis derivation, but the frame comes from a
    /// software-triggered acquisition with the given bounded wait.
    pub fn acquire_spectrum_software_triggered(
        &self,
        laser_nm: f64,
        timeout: Duration,
    ) -> AppResult<SpectrumResult> {
        Self::validate_laser(laser_nm)?;
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let frame = self.camera.acquire_software_triggered(timeout)?;
        self.reduce(frame, laser_nm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockCamera, MockSpectrograph};

    fn coordinator() -> AcquisitionCoordinator {
        let camera = Arc::new(CameraSession::new(
            Box::new(MockCamera::new()),
            Duration::from_secs(5),
        ));
        let spectrograph = Arc::new(SpectrographSession::new(Box::new(MockSpectrograph::new())));
        camera.connect().unwrap();
        spectrograph.connect().unwrap();
        spectrograph.configure_from_camera(1024).unwrap();
        AcquisitionCoordinator::new(camera, spectrograph)
    }

    #[test]
    fn test_acquire_spectrum_axes_are_consistent() {
        let coordinator = coordinator();
        let result = coordinator.acquire_spectrum(532.0).unwrap();
        assert_eq!(result.intensity.len(), 1024);
        assert_eq!(result.wavelength_nm.len(), 1024);
        assert_eq!(result.raman_shift_cm1.len(), 1024);
        assert_eq!(result.laser_wavelength_nm, 532.0);
    }

    #[test]
    fn test_acquire_spectrum_rejects_bad_laser() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.acquire_spectrum(0.0),
            Err(SpectroError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_software_triggered_variant_produces_spectrum() {
        let coordinator = coordinator();
        let result = coordinator
            .acquire_spectrum_software_triggered(532.0, Duration::from_secs(1))
            .unwrap();
        assert_eq!(result.intensity.len(), 1024);
    }

    #[test]
    fn test_calibration_failure_propagates() {
        let camera = Arc::new(CameraSession::new(
            Box::new(MockCamera::new()),
            Duration::from_secs(5),
        ));
        let mut device = MockSpectrograph::new();
        device.calibration_fails = true;
        let spectrograph = Arc::new(SpectrographSession::new(Box::new(device)));
        camera.connect().unwrap();
        spectrograph.connect().unwrap();
        let coordinator = AcquisitionCoordinator::new(camera, spectrograph);
        assert!(matches!(
            coordinator.acquire_spectrum(532.0),
            Err(SpectroError::CalibrationUnavailable(_))
        ));
    }
}
