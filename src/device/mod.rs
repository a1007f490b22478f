//! Hardware device boundary.
//!
//! The vendor SDKs for the CCD detector and the spectrograph stage are
//! collaborators, not something this crate reimplements. The traits in this
//! module describe exactly the operation set the sessions need; the session
//! layer owns the sole handle to each device and serializes every call behind
//! a lock, because the underlying SDKs are not safe for concurrent access.
//!
//! All hardware-native units (meters for wavelength and slit width) are
//! converted at the session boundary; the traits here speak the device's own
//! units.

pub mod mock;

use crate::error::SpectroError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How an exposure is started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Exposure start driven by the device's internal timer.
    Internal,
    /// Exposure start driven by a software trigger pulse.
    Software,
}

impl TriggerMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Internal => "internal",
            TriggerMode::Software => "software",
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" | "int" => Ok(TriggerMode::Internal),
            "software" => Ok(TriggerMode::Software),
            other => Err(SpectroError::InvalidArgument(format!(
                "trigger mode must be 'internal' or 'software', got '{other}'"
            ))),
        }
    }
}

/// Detector acquisition mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// One exposure, one frame.
    Single,
    /// On-chip accumulation of several exposures into one frame.
    Accumulate,
    /// Kinetic series of frames.
    Kinetic,
    /// Free-running continuous readout.
    Continuous,
}

impl AcquisitionMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Single => "single",
            AcquisitionMode::Accumulate => "accumulate",
            AcquisitionMode::Kinetic => "kinetic",
            AcquisitionMode::Continuous => "continuous",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionMode {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(AcquisitionMode::Single),
            "accumulate" => Ok(AcquisitionMode::Accumulate),
            "kinetic" => Ok(AcquisitionMode::Kinetic),
            "continuous" | "cont" => Ok(AcquisitionMode::Continuous),
            other => Err(SpectroError::InvalidArgument(format!(
                "acquisition mode must be one of single/accumulate/kinetic/continuous, got '{other}'"
            ))),
        }
    }
}

/// Sensor fan speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    /// Full speed.
    Full,
    /// Reduced speed (less vibration).
    Low,
    /// Fan off.
    Off,
}

impl FanMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FanMode::Full => "full",
            FanMode::Low => "low",
            FanMode::Off => "off",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(FanMode::Full),
            "low" => Ok(FanMode::Low),
            "off" => Ok(FanMode::Off),
            other => Err(SpectroError::InvalidArgument(format!(
                "fan mode must be 'full', 'low' or 'off', got '{other}'"
            ))),
        }
    }
}

/// Which entrance slit a width command targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlitSide {
    /// Input-side slit.
    Input,
    /// Output-side slit.
    Output,
}

impl SlitSide {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlitSide::Input => "input",
            SlitSide::Output => "output",
        }
    }
}

impl FromStr for SlitSide {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(SlitSide::Input),
            "output" => Ok(SlitSide::Output),
            other => Err(SpectroError::InvalidArgument(format!(
                "slit side must be 'input' or 'output', got '{other}'"
            ))),
        }
    }
}

/// Region-of-interest bounds in unbinned sensor pixels.
///
/// `None` for an end bound means "to the sensor edge".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBounds {
    /// First column read out (inclusive).
    #[serde(default)]
    pub hstart: usize,
    /// One past the last column read out, or the sensor edge when absent.
    #[serde(default)]
    pub hend: Option<usize>,
    /// First row read out (inclusive).
    #[serde(default)]
    pub vstart: usize,
    /// One past the last row read out, or the sensor edge when absent.
    #[serde(default)]
    pub vend: Option<usize>,
}

/// A raw 2-D frame as delivered by the detector, row-major.
///
/// Owned transiently for the duration of one acquisition call; never mutated,
/// only reduced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Columns (dispersion axis).
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Pixel counts, row-major, `width * height` long.
    pub pixels: Vec<u16>,
}

impl RawFrame {
    /// Builds a frame, checking that the buffer matches the dimensions.
    pub fn new(width: usize, height: usize, pixels: Vec<u16>) -> Result<Self, SpectroError> {
        if pixels.len() != width * height {
            return Err(SpectroError::Hardware(format!(
                "frame buffer length {} does not match {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Returns row `y` as a slice.
    pub fn row(&self, y: usize) -> &[u16] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

/// Result of a capability query for grating-name enumeration.
///
/// Not every spectrograph firmware can report grating names; the caller picks
/// the fallback when the capability is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GratingCatalog {
    /// The device reports one name per installed grating.
    Supported(Vec<String>),
    /// The firmware does not support name enumeration.
    Unsupported,
}

/// Blocking interface to the CCD detector.
///
/// One implementor instance maps to one physical camera. All methods perform
/// brief device I/O except `snap` and `wait_for_frame`, which block for up to
/// an exposure plus the given timeout.
pub trait CameraDevice: Send {
    /// Opens the hardware handle.
    fn open(&mut self) -> Result<(), SpectroError>;
    /// Releases the hardware handle.
    fn close(&mut self) -> Result<(), SpectroError>;

    /// Usable sensor extent as (columns, rows) in unbinned pixels.
    fn sensor_extent(&self) -> (usize, usize);

    /// Sets the exposure time in seconds.
    fn set_exposure(&mut self, seconds: f64) -> Result<(), SpectroError>;
    /// Applies ROI bounds and binning in one command.
    fn set_roi(&mut self, bounds: RoiBounds, hbin: usize, vbin: usize) -> Result<(), SpectroError>;
    /// Selects the trigger source.
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), SpectroError>;
    /// Selects the acquisition mode.
    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), SpectroError>;
    /// Turns the thermoelectric cooler on or off.
    fn set_cooler(&mut self, on: bool) -> Result<(), SpectroError>;
    /// Programs the cooling setpoint in Celsius.
    fn set_temperature_setpoint(&mut self, celsius: f64) -> Result<(), SpectroError>;
    /// Reads the current sensor temperature in Celsius.
    fn read_temperature(&mut self) -> Result<f64, SpectroError>;
    /// Selects the fan speed.
    fn set_fan_mode(&mut self, mode: FanMode) -> Result<(), SpectroError>;

    /// Blocking single exposure and readout.
    fn snap(&mut self, timeout: Duration) -> Result<RawFrame, SpectroError>;
    /// Arms the configured acquisition.
    fn start_acquisition(&mut self) -> Result<(), SpectroError>;
    /// Sends one software trigger pulse.
    fn send_software_trigger(&mut self) -> Result<(), SpectroError>;
    /// Waits for a frame to become ready. Returns `false` on timeout.
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<bool, SpectroError>;
    /// Reads the newest completed frame.
    fn read_newest_frame(&mut self) -> Result<RawFrame, SpectroError>;
    /// Clears any armed or in-progress acquisition (between frames only).
    fn abort_acquisition(&mut self) -> Result<(), SpectroError>;
}

/// Blocking interface to the spectrograph (grating turret, slit, focus
/// mirror).
///
/// Wavelengths and slit widths are in meters, matching the vendor SDK.
pub trait SpectrographDevice: Send {
    /// Opens the hardware handle.
    fn open(&mut self) -> Result<(), SpectroError>;
    /// Releases the hardware handle.
    fn close(&mut self) -> Result<(), SpectroError>;

    /// Number of installed gratings.
    fn grating_count(&self) -> usize;
    /// Selects a grating by 0-based index.
    fn set_grating(&mut self, index: usize) -> Result<(), SpectroError>;
    /// Currently selected grating index.
    fn grating(&self) -> Result<usize, SpectroError>;
    /// Grating-name enumeration capability.
    fn grating_names(&self) -> GratingCatalog;
    /// Calibration offset of the selected grating, in motor steps.
    fn grating_offset(&self) -> Result<i32, SpectroError>;
    /// Sets the calibration offset of the selected grating, in motor steps.
    fn set_grating_offset(&mut self, offset: i32) -> Result<(), SpectroError>;

    /// Device-reported (min, max) center wavelength, in meters.
    fn wavelength_limits_m(&self) -> (f64, f64);
    /// Moves the turret to center on the given wavelength, in meters.
    fn set_wavelength_m(&mut self, wavelength: f64) -> Result<(), SpectroError>;
    /// Current center wavelength, in meters.
    fn wavelength_m(&self) -> Result<f64, SpectroError>;

    /// Informs the device of the attached detector's pixel count along the
    /// dispersion axis.
    fn set_pixel_count(&mut self, count: usize) -> Result<(), SpectroError>;
    /// Informs the device of the detector pixel pitch, in meters.
    fn set_pixel_width_m(&mut self, width: f64) -> Result<(), SpectroError>;
    /// Per-pixel wavelength calibration, in meters, one entry per pixel.
    fn calibration_m(&mut self) -> Result<Vec<f64>, SpectroError>;

    /// Sets a slit width, in meters.
    fn set_slit_width_m(&mut self, side: SlitSide, width: f64) -> Result<(), SpectroError>;
    /// Reads a slit width, in meters.
    fn slit_width_m(&self, side: SlitSide) -> Result<f64, SpectroError>;

    /// Whether a motorized focus mirror is installed.
    fn focus_mirror_present(&self) -> bool;
    /// Maximum focus mirror position in steps.
    fn focus_mirror_max(&self) -> usize;
    /// Moves the focus mirror.
    fn set_focus_mirror_position(&mut self, steps: usize) -> Result<(), SpectroError>;
    /// Current focus mirror position in steps.
    fn focus_mirror_position(&self) -> Result<usize, SpectroError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_mode_parse() {
        assert_eq!("internal".parse::<TriggerMode>().unwrap(), TriggerMode::Internal);
        assert_eq!("int".parse::<TriggerMode>().unwrap(), TriggerMode::Internal);
        assert_eq!("software".parse::<TriggerMode>().unwrap(), TriggerMode::Software);
        assert!(matches!(
            "bogus".parse::<TriggerMode>(),
            Err(SpectroError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_acquisition_mode_parse() {
        assert_eq!("cont".parse::<AcquisitionMode>().unwrap(), AcquisitionMode::Continuous);
        assert!("image".parse::<AcquisitionMode>().is_err());
    }

    #[test]
    fn test_raw_frame_dimension_check() {
        assert!(RawFrame::new(4, 2, vec![0; 8]).is_ok());
        assert!(RawFrame::new(4, 2, vec![0; 7]).is_err());
    }

    #[test]
    fn test_raw_frame_row_access() {
        let frame = RawFrame::new(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.row(0), &[1, 2, 3]);
        assert_eq!(frame.row(1), &[4, 5, 6]);
    }
}
