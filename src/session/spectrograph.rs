//! Spectrograph session: grating turret, slit and focus mirror control plus
//! the cached wavelength-per-pixel table.
//!
//! The wavelength table is the one derived value worth caching: the device
//! query is slow and the table only changes when the optical geometry does.
//! Every mutating call marks the cache [`Cached::Stale`]; nothing recomputes
//! it until the next read. Callers must therefore re-fetch the calibration
//! after any setter, never hold one across configuration changes.
//!
//! Unlike the camera, spectrograph commands historically went unserialized;
//! grating moves and wavelength queries are not safe to interleave, so this
//! session guards its device with the same mutex discipline.

use super::Cached;
use crate::device::{GratingCatalog, SlitSide, SpectrographDevice};
use crate::error::{AppResult, SpectroError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Snapshot of the spectrograph state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrographStatus {
    /// Whether the hardware handle is open.
    pub connected: bool,
    /// Selected grating index.
    pub grating: usize,
    /// Center wavelength in nanometers.
    pub center_wavelength_nm: f64,
    /// Detector pixel count along the dispersion axis.
    pub pixel_count: usize,
    /// (first, last) of the wavelength table in nanometers. First may exceed
    /// last depending on the grating dispersion direction.
    pub wavelength_span_nm: Option<(f64, f64)>,
}

struct Inner {
    device: Box<dyn SpectrographDevice>,
    connected: bool,
    grating: usize,
    center_wavelength_nm: f64,
    pixel_count: usize,
    calibration_nm: Cached<Vec<f64>>,
}

/// Serialized access to the physical spectrograph.
pub struct SpectrographSession {
    inner: Mutex<Inner>,
}

impl SpectrographSession {
    /// Wraps a device handle.
    pub fn new(device: Box<dyn SpectrographDevice>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device,
                connected: false,
                grating: 0,
                center_wavelength_nm: 0.0,
                pixel_count: 0,
                calibration_nm: Cached::Stale,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens the spectrograph and mirrors its current grating and wavelength.
    /// No-op when already connected.
    pub fn connect(&self) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.connected {
            return Ok(());
        }
        inner.device.open()?;
        inner.connected = true;
        inner.grating = inner.device.grating()?;
        inner.center_wavelength_nm = inner.device.wavelength_m()? * 1e9;
        debug!("Spectrograph connected, grating {}", inner.grating);
        Ok(())
    }

    /// Releases the handle. Best-effort, never returns an error.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        if !inner.connected {
            return;
        }
        if let Err(err) = inner.device.close() {
            warn!("Spectrograph close failed during disconnect: {err}");
        }
        inner.connected = false;
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

    /// Informs the spectrograph of the detector pixel geometry and
    /// invalidates the wavelength table.
    pub fn configure_from_camera(&self, pixel_count: usize) -> AppResult<()> {
        if pixel_count == 0 {
            return Err(SpectroError::InvalidArgument(
                "pixel count must be positive".into(),
            ));
        }
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_pixel_count(pixel_count)?;
        inner.pixel_count = pixel_count;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Sets the detector pixel pitch in micrometers and invalidates the
    /// wavelength table.
    pub fn set_pixel_pitch(&self, pitch_um: f64) -> AppResult<()> {
        if !pitch_um.is_finite() || pitch_um <= 0.0 {
            return Err(SpectroError::InvalidArgument(format!(
                "pixel pitch must be positive, got {pitch_um}"
            )));
        }
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_pixel_width_m(pitch_um * 1e-6)?;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Selects a grating by 0-based index and invalidates the wavelength
    /// table.
    pub fn set_grating(&self, index: usize) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        let count = inner.device.grating_count();
        if index >= count {
            return Err(SpectroError::InvalidArgument(format!(
                "grating index {index} out of range (device has {count})"
            )));
        }
        inner.device.set_grating(index)?;
        inner.grating = index;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Selected grating index.
    pub fn grating(&self) -> usize {
        self.lock().grating
    }

    /// Moves the turret to center on `wavelength_nm` and invalidates the
    /// wavelength table.
    pub fn set_center_wavelength(&self, wavelength_nm: f64) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        let (min_m, max_m) = inner.device.wavelength_limits_m();
        let (min_nm, max_nm) = (min_m * 1e9, max_m * 1e9);
        if !wavelength_nm.is_finite() || wavelength_nm < min_nm || wavelength_nm > max_nm {
            return Err(SpectroError::InvalidArgument(format!(
                "center wavelength {wavelength_nm} nm outside device range {min_nm:.0}-{max_nm:.0} nm"
            )));
        }
        inner.device.set_wavelength_m(wavelength_nm * 1e-9)?;
        inner.center_wavelength_nm = wavelength_nm;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Center wavelength in nanometers, mirrored from the last applied move.
    pub fn center_wavelength(&self) -> f64 {
        self.lock().center_wavelength_nm
    }

    /// Calibration offset of the selected grating, in motor steps.
    pub fn grating_offset(&self) -> AppResult<i32> {
        let inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.grating_offset()
    }

    /// Sets the calibration offset of the selected grating and invalidates
    /// the wavelength table. The offset shifts the whole dispersion solution,
    /// so a cached table would be wrong afterwards.
    pub fn set_grating_offset(&self, offset: i32) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_grating_offset(offset)?;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Sets a slit width in micrometers.
    pub fn set_slit_width(&self, width_um: f64, side: SlitSide) -> AppResult<()> {
        if !width_um.is_finite() || width_um <= 0.0 {
            return Err(SpectroError::InvalidArgument(format!(
                "slit width must be positive, got {width_um}"
            )));
        }
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.set_slit_width_m(side, width_um * 1e-6)?;
        Ok(())
    }

    /// Reads a slit width in micrometers.
    pub fn slit_width(&self, side: SlitSide) -> AppResult<f64> {
        let inner = self.lock();
        Self::ensure_connected(&inner)?;
        Ok(inner.device.slit_width_m(side)? * 1e6)
    }

    /// Moves the focus mirror and invalidates the wavelength table.
    pub fn set_mirror_position(&self, steps: usize) -> AppResult<()> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        if !inner.device.focus_mirror_present() {
            return Err(SpectroError::Hardware(
                "no focus mirror installed".into(),
            ));
        }
        let max = inner.device.focus_mirror_max();
        if steps > max {
            return Err(SpectroError::InvalidArgument(format!(
                "mirror position {steps} exceeds device maximum {max}"
            )));
        }
        inner.device.set_focus_mirror_position(steps)?;
        inner.calibration_nm.invalidate();
        Ok(())
    }

    /// Current focus mirror position in steps.
    pub fn mirror_position(&self) -> AppResult<usize> {
        let inner = self.lock();
        Self::ensure_connected(&inner)?;
        inner.device.focus_mirror_position()
    }

    /// Per-pixel wavelengths in nanometers.
    ///
    /// Returns the cached table when fresh; otherwise queries the device
    /// (which reports meters), converts, and caches. Any device failure or an
    /// empty table surfaces as [`SpectroError::CalibrationUnavailable`] — the
    /// axis is absent, never zero-filled.
    pub fn calibration_nm(&self) -> AppResult<Vec<f64>> {
        let mut inner = self.lock();
        Self::ensure_connected(&inner)?;
        if let Some(table) = inner.calibration_nm.get() {
            return Ok(table.clone());
        }
        let meters = inner
            .device
            .calibration_m()
            .map_err(|err| SpectroError::CalibrationUnavailable(err.to_string()))?;
        if meters.is_empty() {
            return Err(SpectroError::CalibrationUnavailable(
                "device reported an empty wavelength table".into(),
            ));
        }
        let table: Vec<f64> = meters.into_iter().map(|m| m * 1e9).collect();
        Ok(inner.calibration_nm.store(table).clone())
    }

    /// (first, last) of the wavelength table in nanometers.
    ///
    /// Callers must not assume first < last; the order depends on the grating
    /// dispersion direction.
    pub fn wavelength_span(&self) -> AppResult<(f64, f64)> {
        let table = self.calibration_nm()?;
        // calibration_nm rejects empty tables.
        let first = table[0];
        let last = table[table.len() - 1];
        Ok((first, last))
    }

    /// Grating-name capability query, untranslated.
    pub fn grating_catalog(&self) -> GratingCatalog {
        self.lock().device.grating_names()
    }

    /// Grating names, falling back to a fixed three-slot index list when the
    /// device cannot enumerate names. The fallback is a degraded-capability
    /// policy, not an error.
    pub fn list_gratings(&self) -> Vec<String> {
        match self.grating_catalog() {
            GratingCatalog::Supported(names) => names,
            GratingCatalog::Unsupported => {
                vec!["0".to_string(), "1".to_string(), "2".to_string()]
            }
        }
    }

    /// Snapshot of the session state. The wavelength span is taken from the
    /// cache only; a stale cache reports `None` rather than forcing a device
    /// query.
    pub fn status(&self) -> SpectrographStatus {
        let inner = self.lock();
        let span = inner.calibration_nm.get().and_then(|table| {
            let first = *table.first()?;
            let last = *table.last()?;
            Some((first, last))
        });
        SpectrographStatus {
            connected: inner.connected,
            grating: inner.grating,
            center_wavelength_nm: inner.center_wavelength_nm,
            pixel_count: inner.pixel_count,
            wavelength_span_nm: span,
        }
    }
}
