//! HTTP control surface.
//!
//! All state is dependency-injected through [`AppState`]; handlers reach the
//! instruments only through the shared sessions, never through globals.
//! Session calls block on hardware, so handlers offload them with
//! `spawn_blocking` and keep the async executor free.

pub mod handlers;

use crate::acquisition::AcquisitionCoordinator;
use crate::error::SpectroError;
use crate::session::{CameraSession, SpectrographSession};
use crate::spectrum::SpectrumResult;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// What the most recent acquisition produced: a spectrum, or the typed error
/// it failed with. `Arc` because the error is handed both to the immediate
/// caller and to later polls of the last-spectrum endpoint.
pub type AcquisitionOutcome = Result<SpectrumResult, Arc<SpectroError>>;

/// Shared state injected into every handler.
pub struct AppState {
    pub camera: Arc<CameraSession>,
    pub spectrograph: Arc<SpectrographSession>,
    pub coordinator: Arc<AcquisitionCoordinator>,
    /// Single-slot store for the most recent acquisition outcome. Concurrent
    /// acquisitions overwrite; whichever finishes last wins.
    pub last_spectrum: Mutex<Option<AcquisitionOutcome>>,
    /// Default excitation line for requests that do not carry one.
    pub laser_wavelength_nm: f64,
    /// Frame wait bound for software-triggered acquisition.
    pub frame_timeout: Duration,
    /// Directory acquisitions are persisted to.
    pub storage_dir: PathBuf,
    /// Signalled by the shutdown endpoint; the binary awaits it.
    pub shutdown: Notify,
}

impl AppState {
    pub fn new(
        coordinator: Arc<AcquisitionCoordinator>,
        laser_wavelength_nm: f64,
        frame_timeout: Duration,
        storage_dir: PathBuf,
    ) -> Self {
        Self {
            camera: coordinator.camera().clone(),
            spectrograph: coordinator.spectrograph().clone(),
            coordinator,
            last_spectrum: Mutex::new(None),
            laser_wavelength_nm,
            frame_timeout,
            storage_dir,
            shutdown: Notify::new(),
        }
    }
}

/// Builds the API router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/camera/status", get(handlers::camera_status))
        .route(
            "/api/camera/exposure",
            get(handlers::get_exposure).post(handlers::set_exposure),
        )
        .route("/api/camera/cooler", post(handlers::set_cooler))
        .route("/api/camera/temperature", get(handlers::get_temperature))
        .route("/api/camera/roi", post(handlers::set_roi))
        .route("/api/camera/save_image", post(handlers::save_image))
        .route(
            "/api/spectrograph/status",
            get(handlers::spectrograph_status),
        )
        .route("/api/spectrograph/grating", post(handlers::set_grating))
        .route("/api/spectrograph/gratings", get(handlers::list_gratings))
        .route(
            "/api/spectrograph/central_wavelength",
            get(handlers::get_central_wavelength).post(handlers::set_central_wavelength),
        )
        .route(
            "/api/spectrograph/slit_width",
            get(handlers::get_slit_width).post(handlers::set_slit_width),
        )
        .route("/api/spectrum/acquire", post(handlers::acquire_spectrum))
        .route(
            "/api/spectrum/acquire_async",
            post(handlers::acquire_spectrum_async),
        )
        .route("/api/spectrum/last", get(handlers::last_spectrum))
        .route("/api/spectrum/save", post(handlers::save_spectrum))
        .route("/api/shutdown", post(handlers::shutdown))
        .with_state(state)
}
