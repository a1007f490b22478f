//! Mock hardware for tests and simulated operation.
//!
//! The mock camera renders a synthetic emission line with shot noise so the
//! full pipeline (frame, reduction, calibration, Raman axis, persistence) can
//! run without a detector attached. Both mocks optionally record every
//! hardware call into a shared [`CommandLog`], which the concurrency tests
//! use to prove that logical acquisitions never interleave.

use super::{
    AcquisitionMode, CameraDevice, FanMode, GratingCatalog, RawFrame, RoiBounds, SlitSide,
    SpectrographDevice, TriggerMode,
};
use crate::error::SpectroError;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered record of hardware calls.
pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty command log.
pub fn command_log() -> CommandLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Option<CommandLog>, entry: &str) {
    if let Some(log) = log {
        let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(entry.to_string());
    }
}

/// Simulated CCD detector.
///
/// Defaults to a 1024x256 spectroscopy sensor. Ambient temperature is 20 °C;
/// each temperature read slews 20 % of the way toward the setpoint while the
/// cooler is on, so cooling behavior is observable across repeated polls.
pub struct MockCamera {
    open: bool,
    sensor: (usize, usize),
    bounds: RoiBounds,
    hbin: usize,
    vbin: usize,
    exposure_s: f64,
    trigger_mode: TriggerMode,
    acquisition_mode: AcquisitionMode,
    cooler_on: bool,
    setpoint_c: Option<f64>,
    temperature_c: f64,
    fan_mode: FanMode,
    acquiring: bool,
    /// When set, `wait_for_frame` sleeps out its timeout and reports no frame.
    pub frame_never_ready: bool,
    log: Option<CommandLog>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCamera {
    /// Creates a mock with the default 1024x256 sensor.
    pub fn new() -> Self {
        Self {
            open: false,
            sensor: (1024, 256),
            bounds: RoiBounds::default(),
            hbin: 1,
            vbin: 1,
            exposure_s: 0.1,
            trigger_mode: TriggerMode::Internal,
            acquisition_mode: AcquisitionMode::Single,
            cooler_on: false,
            setpoint_c: None,
            temperature_c: 20.0,
            fan_mode: FanMode::Low,
            acquiring: false,
            frame_never_ready: false,
            log: None,
        }
    }

    /// Attaches a shared command log.
    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = Some(log);
        self
    }

    fn ensure_open(&self) -> Result<(), SpectroError> {
        if self.open {
            Ok(())
        } else {
            Err(SpectroError::Hardware("mock camera is not open".into()))
        }
    }

    fn frame_dimensions(&self) -> (usize, usize) {
        let (sw, sh) = self.sensor;
        let hspan = self.bounds.hend.unwrap_or(sw) - self.bounds.hstart;
        let vspan = self.bounds.vend.unwrap_or(sh) - self.bounds.vstart;
        (hspan / self.hbin, vspan / self.vbin)
    }

    fn generate_frame(&self) -> RawFrame {
        let (width, height) = self.frame_dimensions();
        let mut rng = rand::thread_rng();
        let peak = width as f64 / 2.0;
        let sigma = (width as f64 / 40.0).max(1.0);
        let mut pixels = Vec::with_capacity(width * height);
        for _y in 0..height {
            for x in 0..width {
                let dx = x as f64 - peak;
                let line = 30_000.0 * (-dx * dx / (2.0 * sigma * sigma)).exp();
                let baseline = 500.0;
                let noise: f64 = rng.gen_range(0.0..50.0);
                pixels.push((baseline + line + noise) as u16);
            }
        }
        RawFrame {
            width,
            height,
            pixels,
        }
    }
}

impl CameraDevice for MockCamera {
    fn open(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "camera.open");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "camera.close");
        self.open = false;
        Ok(())
    }

    fn sensor_extent(&self) -> (usize, usize) {
        self.sensor
    }

    fn set_exposure(&mut self, seconds: f64) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_exposure");
        self.ensure_open()?;
        self.exposure_s = seconds;
        Ok(())
    }

    fn set_roi(&mut self, bounds: RoiBounds, hbin: usize, vbin: usize) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_roi");
        self.ensure_open()?;
        self.bounds = bounds;
        self.hbin = hbin;
        self.vbin = vbin;
        Ok(())
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_trigger_mode");
        self.ensure_open()?;
        self.trigger_mode = mode;
        Ok(())
    }

    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_acquisition_mode");
        self.ensure_open()?;
        self.acquisition_mode = mode;
        Ok(())
    }

    fn set_cooler(&mut self, on: bool) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_cooler");
        self.ensure_open()?;
        self.cooler_on = on;
        Ok(())
    }

    fn set_temperature_setpoint(&mut self, celsius: f64) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_temperature_setpoint");
        self.ensure_open()?;
        self.setpoint_c = Some(celsius);
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f64, SpectroError> {
        record(&self.log, "camera.read_temperature");
        self.ensure_open()?;
        let target = if self.cooler_on {
            self.setpoint_c.unwrap_or(20.0)
        } else {
            20.0
        };
        self.temperature_c += (target - self.temperature_c) * 0.2;
        Ok(self.temperature_c)
    }

    fn set_fan_mode(&mut self, mode: FanMode) -> Result<(), SpectroError> {
        record(&self.log, "camera.set_fan_mode");
        self.ensure_open()?;
        self.fan_mode = mode;
        Ok(())
    }

    fn snap(&mut self, _timeout: Duration) -> Result<RawFrame, SpectroError> {
        record(&self.log, "camera.snap");
        self.ensure_open()?;
        Ok(self.generate_frame())
    }

    fn start_acquisition(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "camera.start_acquisition");
        self.ensure_open()?;
        self.acquiring = true;
        Ok(())
    }

    fn send_software_trigger(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "camera.send_software_trigger");
        self.ensure_open()?;
        if !self.acquiring {
            return Err(SpectroError::Hardware(
                "software trigger sent while not acquiring".into(),
            ));
        }
        Ok(())
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<bool, SpectroError> {
        record(&self.log, "camera.wait_for_frame");
        self.ensure_open()?;
        if self.frame_never_ready {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        Ok(true)
    }

    fn read_newest_frame(&mut self) -> Result<RawFrame, SpectroError> {
        record(&self.log, "camera.read_newest_frame");
        self.ensure_open()?;
        Ok(self.generate_frame())
    }

    fn abort_acquisition(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "camera.abort_acquisition");
        self.ensure_open()?;
        self.acquiring = false;
        Ok(())
    }
}

/// Simulated spectrograph with three gratings.
///
/// The calibration is a linear dispersion around the center wavelength whose
/// step shrinks with grating index (denser gratings disperse more). Setting
/// `reversed` flips the dispersion direction, which exercises the
/// no-first-less-than-last contract on the wavelength span.
pub struct MockSpectrograph {
    open: bool,
    gratings: Vec<String>,
    grating: usize,
    grating_offsets: Vec<i32>,
    wavelength_m: f64,
    limits_m: (f64, f64),
    pixel_count: usize,
    pixel_width_m: f64,
    slit_widths_m: [f64; 2],
    mirror_position: usize,
    mirror_max: usize,
    /// Whether grating-name enumeration is reported as supported.
    pub names_supported: bool,
    /// Flips the dispersion direction of the reported calibration.
    pub reversed: bool,
    /// When set, calibration queries fail (simulates a device without a
    /// loaded calibration).
    pub calibration_fails: bool,
    log: Option<CommandLog>,
}

impl Default for MockSpectrograph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpectrograph {
    /// Creates a mock with three gratings and a 200-1100 nm range.
    pub fn new() -> Self {
        Self {
            open: false,
            gratings: vec![
                "300 l/mm".to_string(),
                "1200 l/mm".to_string(),
                "1800 l/mm".to_string(),
            ],
            grating: 0,
            grating_offsets: vec![0; 3],
            wavelength_m: 550e-9,
            limits_m: (200e-9, 1100e-9),
            pixel_count: 1024,
            pixel_width_m: 26e-6,
            slit_widths_m: [100e-6, 100e-6],
            mirror_position: 0,
            mirror_max: 500,
            names_supported: true,
            reversed: false,
            calibration_fails: false,
            log: None,
        }
    }

    /// Attaches a shared command log.
    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = Some(log);
        self
    }

    fn ensure_open(&self) -> Result<(), SpectroError> {
        if self.open {
            Ok(())
        } else {
            Err(SpectroError::Hardware("mock spectrograph is not open".into()))
        }
    }

    fn slit_index(side: SlitSide) -> usize {
        match side {
            SlitSide::Input => 0,
            SlitSide::Output => 1,
        }
    }
}

impl SpectrographDevice for MockSpectrograph {
    fn open(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.open");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.close");
        self.open = false;
        Ok(())
    }

    fn grating_count(&self) -> usize {
        self.gratings.len()
    }

    fn set_grating(&mut self, index: usize) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_grating");
        self.ensure_open()?;
        if index >= self.gratings.len() {
            return Err(SpectroError::Hardware(format!(
                "grating index {index} rejected by device"
            )));
        }
        self.grating = index;
        Ok(())
    }

    fn grating(&self) -> Result<usize, SpectroError> {
        self.ensure_open()?;
        Ok(self.grating)
    }

    fn grating_names(&self) -> GratingCatalog {
        if self.names_supported {
            GratingCatalog::Supported(self.gratings.clone())
        } else {
            GratingCatalog::Unsupported
        }
    }

    fn grating_offset(&self) -> Result<i32, SpectroError> {
        self.ensure_open()?;
        Ok(self.grating_offsets[self.grating])
    }

    fn set_grating_offset(&mut self, offset: i32) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_grating_offset");
        self.ensure_open()?;
        self.grating_offsets[self.grating] = offset;
        Ok(())
    }

    fn wavelength_limits_m(&self) -> (f64, f64) {
        self.limits_m
    }

    fn set_wavelength_m(&mut self, wavelength: f64) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_wavelength");
        self.ensure_open()?;
        self.wavelength_m = wavelength;
        Ok(())
    }

    fn wavelength_m(&self) -> Result<f64, SpectroError> {
        self.ensure_open()?;
        Ok(self.wavelength_m)
    }

    fn set_pixel_count(&mut self, count: usize) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_pixel_count");
        self.ensure_open()?;
        self.pixel_count = count;
        Ok(())
    }

    fn set_pixel_width_m(&mut self, width: f64) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_pixel_width");
        self.ensure_open()?;
        self.pixel_width_m = width;
        Ok(())
    }

    fn calibration_m(&mut self) -> Result<Vec<f64>, SpectroError> {
        record(&self.log, "spectrograph.calibration");
        self.ensure_open()?;
        if self.calibration_fails {
            return Err(SpectroError::Hardware(
                "device has no wavelength calibration loaded".into(),
            ));
        }
        // Linear dispersion: denser gratings spread fewer nm per pixel.
        let step = 0.4e-9 / (self.grating as f64 + 1.0);
        let step = if self.reversed { -step } else { step };
        let half = self.pixel_count as f64 / 2.0;
        Ok((0..self.pixel_count)
            .map(|i| self.wavelength_m + (i as f64 - half) * step)
            .collect())
    }

    fn set_slit_width_m(&mut self, side: SlitSide, width: f64) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_slit_width");
        self.ensure_open()?;
        self.slit_widths_m[Self::slit_index(side)] = width;
        Ok(())
    }

    fn slit_width_m(&self, side: SlitSide) -> Result<f64, SpectroError> {
        self.ensure_open()?;
        Ok(self.slit_widths_m[Self::slit_index(side)])
    }

    fn focus_mirror_present(&self) -> bool {
        true
    }

    fn focus_mirror_max(&self) -> usize {
        self.mirror_max
    }

    fn set_focus_mirror_position(&mut self, steps: usize) -> Result<(), SpectroError> {
        record(&self.log, "spectrograph.set_focus_mirror_position");
        self.ensure_open()?;
        if steps > self.mirror_max {
            return Err(SpectroError::Hardware(format!(
                "mirror position {steps} beyond device limit {}",
                self.mirror_max
            )));
        }
        self.mirror_position = steps;
        Ok(())
    }

    fn focus_mirror_position(&self) -> Result<usize, SpectroError> {
        self.ensure_open()?;
        Ok(self.mirror_position)
    }
}
