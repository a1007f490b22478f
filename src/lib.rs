//! Core library for the spectro_daq application.
//!
//! This library contains the device-boundary traits, the session layer that
//! serializes hardware access and mirrors device configuration, the
//! acquisition coordinator that turns raw CCD frames into calibrated spectra,
//! and the HTTP remote-control surface. It is used by the `spectro_daq`
//! binary and by the integration tests.

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod server;
pub mod session;
pub mod spectrum;
pub mod storage;
