//! Application configuration loading.
//!
//! Configuration is layered from an optional TOML file and environment
//! variables prefixed with `SPECTRO_` (double underscore as the section
//! separator), then deserialized into the typed [`Settings`] struct:
//!
//! ```text
//! SPECTRO_SERVER__BIND_ADDR=0.0.0.0:8080
//! SPECTRO_CAMERA__EXPOSURE_S=0.25
//! SPECTRO_LASER__WAVELENGTH_NM=785.0
//! ```
//!
//! Every section has sensible defaults so the application starts without a
//! configuration file at all.

use crate::device::FanMode;
use crate::error::AppResult;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Camera defaults applied at startup.
    #[serde(default)]
    pub camera: CameraSettings,
    /// Spectrograph defaults applied at startup.
    #[serde(default)]
    pub spectrograph: SpectrographSettings,
    /// Data storage settings.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Excitation laser settings.
    #[serde(default)]
    pub laser: LaserSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address the HTTP API binds to.
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Camera defaults applied at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Initial exposure time in seconds.
    pub exposure_s: f64,
    /// Fan mode selected on connect.
    pub fan_mode: FanMode,
    /// Cooling setpoint in Celsius. Cooling stays off when absent.
    pub cooling_setpoint_c: Option<f64>,
    /// Bounded wait for a frame during blocking acquisition, in seconds.
    pub frame_timeout_s: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure_s: 0.1,
            fan_mode: FanMode::Low,
            cooling_setpoint_c: None,
            frame_timeout_s: 10.0,
        }
    }
}

/// Spectrograph defaults applied at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrographSettings {
    /// Detector pixel pitch along the dispersion axis, in micrometers.
    pub pixel_pitch_um: f64,
    /// Grating selected at startup.
    pub default_grating: usize,
}

impl Default for SpectrographSettings {
    fn default() -> Self {
        Self {
            pixel_pitch_um: 26.0,
            default_grating: 0,
        }
    }
}

/// Data storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory acquisitions are written to.
    pub default_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_path: "./data".to_string(),
        }
    }
}

/// Excitation laser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Laser line used for Raman-shift derivation, in nanometers.
    pub wavelength_nm: f64,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            wavelength_nm: 532.0,
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file plus `SPECTRO_` environment
    /// overrides.
    ///
    /// When `path` is `None`, a `spectro_daq.toml` next to the working
    /// directory is used if present; a missing file is not an error.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("spectro_daq").required(false)),
        };
        let cfg = builder
            .add_source(
                Environment::with_prefix("SPECTRO")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.bind_addr, "127.0.0.1:5000");
        assert_eq!(settings.camera.exposure_s, 0.1);
        assert_eq!(settings.camera.fan_mode, FanMode::Low);
        assert!(settings.camera.cooling_setpoint_c.is_none());
        assert_eq!(settings.laser.wavelength_nm, 532.0);
        assert_eq!(settings.spectrograph.pixel_pitch_um, 26.0);
    }

    #[test]
    #[serial]
    fn test_toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[camera]\nexposure_s = 0.5\n").unwrap();
        writeln!(file, "[laser]\nwavelength_nm = 785.0\n").unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.camera.exposure_s, 0.5);
        assert_eq!(settings.laser.wavelength_nm, 785.0);
        // Untouched sections keep their defaults.
        assert_eq!(settings.storage.default_path, "./data");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        std::env::set_var("SPECTRO_SERVER__BIND_ADDR", "0.0.0.0:9000");
        let settings = Settings::load(None).unwrap();
        std::env::remove_var("SPECTRO_SERVER__BIND_ADDR");
        assert_eq!(settings.server.bind_addr, "0.0.0.0:9000");
    }
}
