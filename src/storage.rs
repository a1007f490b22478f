//! Acquisition persistence: FITS images and CSV spectra.
//!
//! Images go to a minimal single-HDU FITS file with the acquisition settings
//! embedded as header cards. Spectra go to a CSV table preceded by a
//! `# key: value` metadata preamble, one wavelength/intensity pair per row.
//! No crate in our stack covers FITS, so the (fixed-layout, 2880-byte block)
//! primary HDU is written directly.

use crate::device::RawFrame;
use crate::error::{AppResult, SpectroError};
use crate::session::{CameraConfig, SpectrographStatus};
use crate::spectrum::SpectrumResult;
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const FITS_BLOCK: usize = 2880;
const FITS_CARD: usize = 80;

/// Builds a `prefix_YYYYmmdd_HHMMSS.ext` file name from the current UTC time.
pub fn timestamped_filename(prefix: &str, extension: &str) -> String {
    format!(
        "{prefix}_{}.{extension}",
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

fn pad_card(card: String) -> AppResult<[u8; FITS_CARD]> {
    if card.len() > FITS_CARD {
        return Err(SpectroError::Storage(format!(
            "FITS header card exceeds 80 bytes: '{card}'"
        )));
    }
    let mut bytes = [b' '; FITS_CARD];
    bytes[..card.len()].copy_from_slice(card.as_bytes());
    Ok(bytes)
}

fn card_value(key: &str, value: &str) -> AppResult<[u8; FITS_CARD]> {
    pad_card(format!("{key:<8}= {value:>20}"))
}

fn card_string(key: &str, value: &str) -> AppResult<[u8; FITS_CARD]> {
    pad_card(format!("{key:<8}= '{value:<8}'"))
}

fn card_logical(key: &str, value: bool) -> AppResult<[u8; FITS_CARD]> {
    card_value(key, if value { "T" } else { "F" })
}

fn pad_to_block(buffer: &mut Vec<u8>, fill: u8) {
    let rem = buffer.len() % FITS_BLOCK;
    if rem != 0 {
        buffer.resize(buffer.len() + FITS_BLOCK - rem, fill);
    }
}

/// Serializes a frame plus its acquisition settings into FITS bytes.
///
/// 16-bit data is stored in the conventional signed form with
/// `BZERO = 32768`, so unsigned counts survive a round trip through any
/// standard FITS reader.
pub fn frame_to_fits(frame: &RawFrame, config: &CameraConfig) -> AppResult<Vec<u8>> {
    let mut cards: Vec<[u8; FITS_CARD]> = vec![
        card_logical("SIMPLE", true)?,
        card_value("BITPIX", "16")?,
        card_value("NAXIS", "2")?,
        card_value("NAXIS1", &frame.width.to_string())?,
        card_value("NAXIS2", &frame.height.to_string())?,
        card_value("BZERO", "32768")?,
        card_value("BSCALE", "1")?,
        card_value("EXPOSURE", &config.exposure_s.to_string())?,
        card_value("H_BIN", &config.hbin.to_string())?,
        card_value("V_BIN", &config.vbin.to_string())?,
    ];
    // The setpoint card is omitted entirely while cooling is disabled.
    if let Some(setpoint) = config.temperature_setpoint_c {
        cards.push(card_value("TEMP_SET", &setpoint.to_string())?);
    }
    cards.push(card_logical("COOLER", config.cooler_enabled)?);
    cards.push(card_string("ACQ_MODE", config.acquisition_mode.as_str())?);
    cards.push(card_string(
        "DATE",
        &Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    )?);
    cards.push(pad_card("END".to_string())?);

    let mut header: Vec<u8> = Vec::with_capacity(FITS_BLOCK);
    for card in cards {
        header.extend_from_slice(&card);
    }
    pad_to_block(&mut header, b' ');

    let mut data = Vec::with_capacity(frame.pixels.len() * 2);
    for &px in &frame.pixels {
        let signed = (i32::from(px) - 32768) as i16;
        data.extend_from_slice(&signed.to_be_bytes());
    }
    pad_to_block(&mut data, 0);

    let mut out = header;
    out.extend_from_slice(&data);
    Ok(out)
}

/// Writes a frame to `directory` as a FITS file and returns the full path.
///
/// A `None` filename yields a timestamped `image_*.fits` name. The directory
/// is created if missing.
pub fn save_frame_fits(
    directory: &Path,
    filename: Option<&str>,
    frame: &RawFrame,
    config: &CameraConfig,
) -> AppResult<PathBuf> {
    std::fs::create_dir_all(directory)?;
    let name = filename
        .map(str::to_string)
        .unwrap_or_else(|| timestamped_filename("image", "fits"));
    let path = directory.join(name);
    let bytes = frame_to_fits(frame, config)?;
    std::fs::write(&path, bytes)?;
    log::info!("Wrote image to {}", path.display());
    Ok(path)
}

/// Writes a spectrum to `directory` as CSV with a metadata preamble and
/// returns the full path.
pub fn save_spectrum_csv(
    directory: &Path,
    filename: Option<&str>,
    spectrum: &SpectrumResult,
    camera: &CameraConfig,
    spectrograph: &SpectrographStatus,
) -> AppResult<PathBuf> {
    std::fs::create_dir_all(directory)?;
    let name = filename
        .map(str::to_string)
        .unwrap_or_else(|| timestamped_filename("spectrum", "csv"));
    let path = directory.join(name);

    let mut file = File::create(&path)?;
    let preamble = [
        ("timestamp", spectrum.acquired_at.to_rfc3339()),
        ("exposure_s", camera.exposure_s.to_string()),
        ("acquisition_mode", camera.acquisition_mode.to_string()),
        ("trigger_mode", camera.trigger_mode.to_string()),
        ("grating", spectrograph.grating.to_string()),
        (
            "center_wavelength_nm",
            spectrograph.center_wavelength_nm.to_string(),
        ),
        ("laser_wavelength_nm", spectrum.laser_wavelength_nm.to_string()),
        ("num_pixels", spectrum.len().to_string()),
    ];
    for (key, value) in preamble {
        writeln!(file, "# {key}: {value}")?;
    }

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["wavelength_nm", "intensity"])
        .map_err(|err| SpectroError::Storage(err.to_string()))?;
    for (wl, intensity) in spectrum.wavelength_nm.iter().zip(&spectrum.intensity) {
        writer
            .write_record(&[wl.to_string(), intensity.to_string()])
            .map_err(|err| SpectroError::Storage(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| SpectroError::Storage(err.to_string()))?;
    log::info!("Wrote spectrum to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_frame() -> RawFrame {
        RawFrame::new(8, 4, (0..32).map(|i| i * 100).collect()).unwrap()
    }

    fn test_spectrum() -> SpectrumResult {
        SpectrumResult {
            acquired_at: Utc::now(),
            laser_wavelength_nm: 532.0,
            intensity: vec![100.0, 200.0, 300.0],
            wavelength_nm: vec![530.0, 532.0, 534.0],
            raman_shift_cm1: vec![-71.0, 0.0, 70.3],
        }
    }

    fn test_spectrograph_status() -> SpectrographStatus {
        SpectrographStatus {
            connected: true,
            grating: 1,
            center_wavelength_nm: 532.0,
            pixel_count: 3,
            wavelength_span_nm: Some((530.0, 534.0)),
        }
    }

    #[test]
    fn test_fits_block_alignment_and_magic() {
        let bytes = frame_to_fits(&test_frame(), &CameraConfig::default()).unwrap();
        assert_eq!(bytes.len() % 2880, 0);
        assert!(bytes.starts_with(b"SIMPLE"));
        // Header plus one data block for a 64-pixel image.
        assert_eq!(bytes.len(), 2 * 2880);
    }

    #[test]
    fn test_fits_header_carries_settings() {
        let mut config = CameraConfig::default();
        config.cooler_enabled = true;
        config.temperature_setpoint_c = Some(-70.0);
        config.hbin = 2;
        let bytes = frame_to_fits(&test_frame(), &config).unwrap();
        let header = String::from_utf8_lossy(&bytes[..2880]);
        assert!(header.contains("EXPOSURE"));
        assert!(header.contains("TEMP_SET"));
        assert!(header.contains("-70"));
        assert!(header.contains("ACQ_MODE"));
        assert!(header.contains("END"));
    }

    #[test]
    fn test_fits_omits_setpoint_when_cooling_off() {
        let bytes = frame_to_fits(&test_frame(), &CameraConfig::default()).unwrap();
        let header = String::from_utf8_lossy(&bytes[..2880]);
        assert!(!header.contains("TEMP_SET"));
    }

    #[test]
    fn test_save_frame_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_frame_fits(
            dir.path(),
            Some("frame.fits"),
            &test_frame(),
            &CameraConfig::default(),
        )
        .unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len() % 2880, 0);
    }

    #[test]
    fn test_spectrum_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_spectrum_csv(
            dir.path(),
            Some("spectrum.csv"),
            &test_spectrum(),
            &CameraConfig::default(),
            &test_spectrograph_status(),
        )
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].starts_with("# timestamp:"));
        assert!(contents.contains("# grating: 1"));
        assert!(contents.contains("# num_pixels: 3"));
        let header_idx = lines
            .iter()
            .position(|l| *l == "wavelength_nm,intensity")
            .unwrap();
        assert_eq!(lines.len() - header_idx - 1, 3);
        assert!(lines[header_idx + 1].starts_with("530,"));
    }

    #[test]
    fn test_default_filenames_are_timestamped() {
        let name = timestamped_filename("spectrum", "csv");
        assert!(name.starts_with("spectrum_"));
        assert!(name.ends_with(".csv"));
    }
}
