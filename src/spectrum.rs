//! Frame reduction and spectral axis derivation.
//!
//! A raw CCD frame is reduced to one dimension by averaging across the
//! non-dispersion axis (rows), then paired with the cached wavelength table
//! and a Raman-shift axis derived from the excitation laser line.

use crate::device::RawFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reduces a frame to one intensity sample per column by averaging over rows.
///
/// The dispersion axis runs along the frame width, so each column of the
/// sensor sees one wavelength.
pub fn mean_over_rows(frame: &RawFrame) -> Vec<f64> {
    if frame.height == 0 || frame.width == 0 {
        return Vec::new();
    }
    let mut sums = vec![0.0_f64; frame.width];
    for y in 0..frame.height {
        for (sum, &px) in sums.iter_mut().zip(frame.row(y)) {
            *sum += f64::from(px);
        }
    }
    let rows = frame.height as f64;
    for sum in &mut sums {
        *sum /= rows;
    }
    sums
}

/// Raman shift in cm⁻¹ for each wavelength sample.
///
/// `shift = (1/laser − 1/λ) × 1e7` with both wavelengths in nanometers:
/// positive for wavelengths above the laser line (Stokes side), negative
/// below it.
pub fn raman_shift_cm1(wavelength_nm: &[f64], laser_nm: f64) -> Vec<f64> {
    wavelength_nm
        .iter()
        .map(|&wl| (1.0 / laser_nm - 1.0 / wl) * 1e7)
        .collect()
}

/// One calibrated spectrum, immutable once returned.
///
/// The wavelength and Raman axes correspond to whatever calibration was
/// cached at acquisition time; they are not re-validated against the frame's
/// actual geometry. Callers must apply configuration changes before
/// acquiring, never concurrently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrumResult {
    /// When the frame was read out.
    pub acquired_at: DateTime<Utc>,
    /// Excitation laser line used for the Raman axis, in nanometers.
    pub laser_wavelength_nm: f64,
    /// Mean counts per dispersion pixel.
    pub intensity: Vec<f64>,
    /// Wavelength per pixel in nanometers.
    pub wavelength_nm: Vec<f64>,
    /// Raman shift per pixel in cm⁻¹.
    pub raman_shift_cm1: Vec<f64>,
}

impl SpectrumResult {
    /// Number of spectral samples.
    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    /// Whether the spectrum holds no samples.
    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_over_rows_small_frame() {
        let frame = RawFrame::new(3, 2, vec![1, 2, 3, 3, 4, 5]).unwrap();
        assert_eq!(mean_over_rows(&frame), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean_over_rows_single_row_is_identity() {
        let frame = RawFrame::new(4, 1, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(mean_over_rows(&frame), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_raman_shift_zero_at_laser_line() {
        let shifts = raman_shift_cm1(&[530.0, 532.0, 534.0], 532.0);
        assert!(shifts[1].abs() < 1e-9);
    }

    #[test]
    fn test_raman_shift_sign_convention() {
        let shifts = raman_shift_cm1(&[530.0, 532.0, 534.0], 532.0);
        // Below the laser line: anti-Stokes, negative shift.
        assert!(shifts[0] < 0.0);
        // Above the laser line: Stokes, positive shift.
        assert!(shifts[2] > 0.0);
    }

    #[test]
    fn test_raman_shift_magnitude() {
        // (1/532 - 1/533) * 1e7 ≈ 35.27 cm⁻¹
        let shifts = raman_shift_cm1(&[533.0], 532.0);
        assert!((shifts[0] - 35.27).abs() < 0.05);
    }
}
