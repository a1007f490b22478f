//! Camera session: sole owner of the detector handle.
//!
//! Every hardware command passes through one mutex because the vendor SDK is
//! not safe for concurrent register access. The session keeps a local mirror
//! of the applied configuration so reads do not round-trip to hardware;
//! mirror fields are updated only after the corresponding device call
//! succeeds.
//!
//! State machine: Disconnected → `connect` → Idle → `acquire_*` → Acquiring
//! (the lock is held for the full exposure and readout) → Idle. `disconnect`
//! is reachable from any state, is best-effort, and never returns an error:
//! teardown must always complete, and by policy cooling is left ON across
//! shutdown so the sensor is not thermally cycled.

use crate::device::{
    AcquisitionMode, CameraDevice, FanMode, RawFrame, RoiBounds, TriggerMode,
};
use crate::error::{AppResult, SpectroError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Locally mirrored camera configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Exposure time in seconds.
    pub exposure_s: f64,
    /// Horizontal binning factor.
    pub hbin: usize,
    /// Vertical binning factor.
    pub vbin: usize,
    /// ROI bounds in unbinned pixels.
    pub roi: RoiBounds,
    /// Trigger source.
    pub trigger_mode: TriggerMode,
    /// Acquisition mode.
    pub acquisition_mode: AcquisitionMode,
    /// Whether the thermoelectric cooler is enabled.
    pub cooler_enabled: bool,
    /// Cooling setpoint in Celsius; `None` whenever cooling is disabled.
    pub temperature_setpoint_c: Option<f64>,
    /// Fan speed.
    pub fan_mode: FanMode,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            exposure_s: 0.1,
            hbin: 1,
            vbin: 1,
            roi: RoiBounds::default(),
            trigger_mode: TriggerMode::Internal,
            acquisition_mode: AcquisitionMode::Single,
            cooler_enabled: false,
            temperature_setpoint_c: None,
            fan_mode: FanMode::Low,
        }
    }
}

/// Snapshot of the session state: cached configuration plus one live
/// temperature read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraStatus {
    /// Whether the hardware handle is open.
    pub connected: bool,
    /// Live sensor temperature, when connected and readable.
    pub temperature_c: Option<f64>,
    /// Cached configuration mirror.
    #[serde(flatten)]
    pub config: CameraConfig,
}

struct Inner {
    device: Box<dyn CameraDevice>,
    connected: bool,
    config: CameraConfig,
}

/// Serialized access to the physical camera.
pub struct CameraSession {
    inner: Mutex<Inner>,
    frame_timeout: Duration,
}

impl CameraSession {
    /// Wraps a device handle. `frame_timeout` bounds the wait for a frame in
    /// blocking acquisition.
    pub fn new(device: Box<dyn CameraDevice>, frame_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device,
                connected: false,
                config: CameraConfig::default(),
            }),
            frame_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the cache consistent with the
        // last applied command, so poison recovery is safe.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens the camera. No-op when already connected.
    pub fn connect(&self) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.connected {
            return Ok(());
        }
        inner.device.open()?;
        inner.connected = true;
        let fan = inner.config.fan_mode;
        if let Err(err) = inner.device.set_fan_mode(fan) {
            warn!("Could not apply fan mode on connect: {err}");
        }
        debug!("Camera connected");
        Ok(())
    }

    /// Releases the camera handle. Best-effort: failures are logged and
    /// swallowed, and the cooler state is deliberately left untouched.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        if !inner.connected {
            return;
        }
        if let Err(err) = inner.device.close() {
            warn!("Camera close failed during disconnect: {err}");
        }
        inner.connected = false;
        debug!("Camera disconnected");
    }

    /// Whether the hardware handle is open.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn ensure_connected(inner: &Inner) -> AppResult<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(SpectroError::NotConnected)
        }
    }

    /// Sets the exposure time in seconds.
    pub fn set_exposure(&self, seconds: f64) -> AppResult<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(SpectroError::InvalidArgument(format!(
                "exposure must be positive, got {seconds}"
            )));
        }
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_exposure(seconds)?;
        inner.config.exposure_s = seconds;
        Ok(())
    }

    /// Cached exposure time in seconds.
    pub fn exposure(&self) -> f64 {
        self.lock().config.exposure_s
    }

    /// Applies ROI bounds and binning in one hardware command.
    ///
    /// Binning factors must be positive and evenly divide the spanned sensor
    /// extent; bounds must be well-ordered. Validation happens before any
    /// device call.
    pub fn set_roi(&self, bounds: RoiBounds, hbin: usize, vbin: usize) -> AppResult<()> {
        if hbin == 0 || vbin == 0 {
            return Err(SpectroError::InvalidArgument(format!(
                "binning must be positive, got {hbin}x{vbin}"
            )));
        }
        if let Some(hend) = bounds.hend {
            if hend <= bounds.hstart {
                return Err(SpectroError::InvalidArgument(format!(
                    "hstart {} must be below hend {hend}",
                    bounds.hstart
                )));
            }
        }
        if let Some(vend) = bounds.vend {
            if vend <= bounds.vstart {
                return Err(SpectroError::InvalidArgument(format!(
                    "vstart {} must be below vend {vend}",
                    bounds.vstart
                )));
            }
        }
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        let (sensor_w, sensor_h) = inner.device.sensor_extent();
        let hspan = bounds.hend.unwrap_or(sensor_w).saturating_sub(bounds.hstart);
        let vspan = bounds.vend.unwrap_or(sensor_h).saturating_sub(bounds.vstart);
        if hspan == 0 || hspan % hbin != 0 {
            return Err(SpectroError::InvalidArgument(format!(
                "horizontal binning {hbin} does not divide the {hspan}-pixel span"
            )));
        }
        if vspan == 0 || vspan % vbin != 0 {
            return Err(SpectroError::InvalidArgument(format!(
                "vertical binning {vbin} does not divide the {vspan}-pixel span"
            )));
        }
        inner.device.set_roi(bounds, hbin, vbin)?;
        inner.config.roi = bounds;
        inner.config.hbin = hbin;
        inner.config.vbin = vbin;
        Ok(())
    }

    /// Sets binning, keeping the current ROI bounds.
    pub fn set_binning(&self, hbin: usize, vbin: usize) -> AppResult<()> {
        let bounds = self.lock().config.roi;
        self.set_roi(bounds, hbin, vbin)
    }

    /// Effective pixel count along the dispersion axis after ROI and binning.
    pub fn dispersion_pixels(&self) -> AppResult<usize> {
        let inner = self.lock();
        Self::ensure_connected(&inner)?;
        let (sensor_w, _) = inner.device.sensor_extent();
        let span = inner
            .config
            .roi
            .hend
            .unwrap_or(sensor_w)
            .saturating_sub(inner.config.roi.hstart);
        Ok(span / inner.config.hbin)
    }

    /// Selects the trigger source.
    pub fn set_trigger_mode(&self, mode: TriggerMode) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_trigger_mode(mode)?;
        inner.config.trigger_mode = mode;
        Ok(())
    }

    /// Selects the trigger source by name, rejecting unknown names before any
    /// hardware call.
    pub fn set_trigger_mode_named(&self, name: &str) -> AppResult<()> {
        let mode: TriggerMode = name.parse()?;
        self.set_trigger_mode(mode)
    }

    /// Selects the acquisition mode.
    pub fn set_acquisition_mode(&self, mode: AcquisitionMode) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_acquisition_mode(mode)?;
        inner.config.acquisition_mode = mode;
        Ok(())
    }

    /// Applies the cooling setpoint and cooler-enable together.
    ///
    /// With `enable` false the cooler is switched off and the cached setpoint
    /// cleared, so future reads report cooling disabled regardless of any
    /// previously stored number.
    pub fn set_cooler_setpoint(&self, celsius: f64, enable: bool) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        if enable {
            inner.device.set_cooler(true)?;
            inner.device.set_temperature_setpoint(celsius)?;
            inner.config.cooler_enabled = true;
            inner.config.temperature_setpoint_c = Some(celsius);
        } else {
            inner.device.set_cooler(false)?;
            inner.config.cooler_enabled = false;
            inner.config.temperature_setpoint_c = None;
        }
        Ok(())
    }

    /// Re-asserts cooler-on and the setpoint.
    ///
    /// The hardware can silently drop cooling state, so a periodic caller
    /// re-applies it. No-op unless cooling was explicitly enabled.
    pub fn maintain_cooling(&self) -> AppResult<()> {
        let mut inner = self.lock();
        if !inner.connected || !inner.config.cooler_enabled {
            return Ok(());
        }
        inner.device.set_cooler(true)?;
        if let Some(setpoint) = inner.config.temperature_setpoint_c {
            inner.device.set_temperature_setpoint(setpoint)?;
        }
        Ok(())
    }

    /// Switches the fan to full speed near the setpoint and low speed far
    /// from it. No-op unless cooling is enabled.
    pub fn auto_fan(&self, threshold_c: f64) -> AppResult<()> {
        let mut inner = self.lock();
        if !inner.connected || !inner.config.cooler_enabled {
            return Ok(());
        }
        let Some(setpoint) = inner.config.temperature_setpoint_c else {
            return Ok(());
        };
        let temperature = inner.device.read_temperature()?;
        let mode = if (temperature - setpoint).abs() < threshold_c {
            FanMode::Full
        } else {
            FanMode::Low
        };
        if mode != inner.config.fan_mode {
            inner.device.set_fan_mode(mode)?;
            inner.config.fan_mode = mode;
        }
        Ok(())
    }

    /// Selects the fan speed.
    pub fn set_fan_mode(&self, mode: FanMode) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_fan_mode(mode)?;
        inner.config.fan_mode = mode;
        Ok(())
    }

    /// Blocking single acquisition.
    ///
    /// The lock is held for the full exposure and readout: the exposure
    /// cannot be parallelized with other camera commands.
    pub fn acquire_single(&self) -> AppResult<RawFrame> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.snap(self.frame_timeout)
    }

    /// Software-triggered acquisition with a bounded frame wait.
    ///
    /// Switches to software trigger, arms the acquisition, sends the pulse
    /// and waits for frame-ready. On timeout the acquisition is aborted and
    /// [`SpectroError::AcquisitionTimeout`] is returned; the trigger mode is
    /// deliberately left as software rather than auto-reverted.
    pub fn acquire_software_triggered(&self, timeout: Duration) -> AppResult<RawFrame> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_trigger_mode(TriggerMode::Software)?;
        inner.config.trigger_mode = TriggerMode::Software;
        inner.device.start_acquisition()?;
        inner.device.send_software_trigger()?;
        let ready = inner.device.wait_for_frame(timeout)?;
        if !ready {
            if let Err(err) = inner.device.abort_acquisition() {
                warn!("Abort after frame timeout failed: {err}");
            }
            return Err(SpectroError::AcquisitionTimeout(timeout.as_secs_f64()));
        }
        inner.device.read_newest_frame()
    }

    /// Cached configuration snapshot plus one live temperature read.
    pub fn status(&self) -> CameraStatus {
        let mut inner = self.lock();
        let temperature_c = if inner.connected {
            inner.device.read_temperature().ok()
        } else {
            None
        };
        CameraStatus {
            connected: inner.connected,
            temperature_c,
            config: inner.config.clone(),
        }
    }

    /// Cached configuration snapshot without touching hardware.
    pub fn config_snapshot(&self) -> CameraConfig {
        self.lock().config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{command_log, CommandLog, MockCamera};
    use std::time::Instant;

    fn connected_session() -> (CameraSession, CommandLog) {
        let log = command_log();
        let session = CameraSession::new(
            Box::new(MockCamera::new().with_log(log.clone())),
            Duration::from_secs(5),
        );
        session.connect().unwrap();
        (session, log)
    }

    fn log_len(log: &CommandLog) -> usize {
        log.lock().unwrap().len()
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (session, log) = connected_session();
        session.connect().unwrap();
        let opens = log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.as_str() == "camera.open")
            .count();
        assert_eq!(opens, 1);
        assert!(session.is_connected());
    }

    #[test]
    fn test_exposure_round_trip() {
        let (session, _log) = connected_session();
        session.set_exposure(0.25).unwrap();
        assert_eq!(session.exposure(), 0.25);
    }

    #[test]
    fn test_invalid_exposure_rejected_before_device() {
        let (session, log) = connected_session();
        let before = log_len(&log);
        let err = session.set_exposure(0.0).unwrap_err();
        assert!(matches!(err, SpectroError::InvalidArgument(_)));
        assert_eq!(log_len(&log), before);
        assert_eq!(session.exposure(), 0.1);
    }

    #[test]
    fn test_binning_round_trip() {
        let (session, _log) = connected_session();
        session.set_roi(RoiBounds::default(), 2, 4).unwrap();
        let config = session.config_snapshot();
        assert_eq!((config.hbin, config.vbin), (2, 4));
    }

    #[test]
    fn test_zero_binning_rejected_before_device() {
        let (session, log) = connected_session();
        let before = log_len(&log);
        let err = session.set_roi(RoiBounds::default(), 0, 1).unwrap_err();
        assert!(matches!(err, SpectroError::InvalidArgument(_)));
        assert_eq!(log_len(&log), before);
    }

    #[test]
    fn test_unordered_roi_rejected() {
        let (session, _log) = connected_session();
        let bounds = RoiBounds {
            hstart: 100,
            hend: Some(50),
            ..RoiBounds::default()
        };
        assert!(matches!(
            session.set_roi(bounds, 1, 1),
            Err(SpectroError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_binning_must_divide_span() {
        let (session, _log) = connected_session();
        // Sensor is 1024 wide; 3 does not divide it.
        assert!(matches!(
            session.set_roi(RoiBounds::default(), 3, 1),
            Err(SpectroError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_trigger_mode_name_rejected_without_device_call() {
        let (session, log) = connected_session();
        let before = log_len(&log);
        let err = session.set_trigger_mode_named("bogus").unwrap_err();
        assert!(matches!(err, SpectroError::InvalidArgument(_)));
        assert_eq!(log_len(&log), before);
        assert_eq!(session.config_snapshot().trigger_mode, TriggerMode::Internal);
    }

    #[test]
    fn test_cooler_disable_clears_setpoint() {
        let (session, _log) = connected_session();
        session.set_cooler_setpoint(-70.0, true).unwrap();
        let config = session.config_snapshot();
        assert!(config.cooler_enabled);
        assert_eq!(config.temperature_setpoint_c, Some(-70.0));

        session.set_cooler_setpoint(-70.0, false).unwrap();
        let config = session.config_snapshot();
        assert!(!config.cooler_enabled);
        assert!(config.temperature_setpoint_c.is_none());
    }

    #[test]
    fn test_maintain_cooling_noop_when_disabled() {
        let (session, log) = connected_session();
        let before = log_len(&log);
        session.maintain_cooling().unwrap();
        assert_eq!(log_len(&log), before);
    }

    #[test]
    fn test_maintain_cooling_reasserts_setpoint() {
        let (session, log) = connected_session();
        session.set_cooler_setpoint(-60.0, true).unwrap();
        session.maintain_cooling().unwrap();
        let entries = log.lock().unwrap();
        let tail: Vec<_> = entries.iter().rev().take(2).rev().cloned().collect();
        assert_eq!(
            tail,
            ["camera.set_cooler", "camera.set_temperature_setpoint"]
        );
    }

    #[test]
    fn test_software_trigger_timeout_is_bounded() {
        let log = command_log();
        let mut camera = MockCamera::new().with_log(log.clone());
        camera.frame_never_ready = true;
        let session = CameraSession::new(Box::new(camera), Duration::from_secs(5));
        session.connect().unwrap();

        let start = Instant::now();
        let err = session
            .acquire_software_triggered(Duration::from_secs(1))
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(matches!(err, SpectroError::AcquisitionTimeout(_)));
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(2));
        // Trigger mode stays software, and the acquisition was aborted.
        assert_eq!(session.config_snapshot().trigger_mode, TriggerMode::Software);
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|entry| entry == "camera.abort_acquisition"));
    }

    #[test]
    fn test_acquire_single_returns_frame() {
        let (session, _log) = connected_session();
        let frame = session.acquire_single().unwrap();
        assert_eq!(frame.width, 1024);
        assert_eq!(frame.height, 256);
    }

    #[test]
    fn test_commands_require_connection() {
        let session = CameraSession::new(Box::new(MockCamera::new()), Duration::from_secs(5));
        assert!(matches!(
            session.set_exposure(0.1),
            Err(SpectroError::NotConnected)
        ));
        assert!(matches!(
            session.acquire_single(),
            Err(SpectroError::NotConnected)
        ));
    }

    #[test]
    fn test_status_reports_live_temperature() {
        let (session, _log) = connected_session();
        let status = session.status();
        assert!(status.connected);
        assert!(status.temperature_c.is_some());
    }
}
