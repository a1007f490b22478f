//! HTTP request handlers.

use super::AppState;
use crate::device::{RoiBounds, SlitSide};
use crate::error::{AppResult, SpectroError};
use crate::spectrum::SpectrumResult;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Error wrapper mapping the library taxonomy onto HTTP statuses.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(err: &SpectroError) -> Self {
        let status = match err {
            SpectroError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SpectroError::AcquisitionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SpectroError::CalibrationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }

    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }
}

impl From<SpectroError> for ApiError {
    fn from(err: SpectroError) -> Self {
        Self::new(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs a blocking session call off the async executor.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| {
            ApiError::from(SpectroError::Hardware(format!("worker task failed: {err}")))
        })?
        .map_err(ApiError::from)
}

pub async fn camera_status(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let camera = state.camera.clone();
    let status = blocking(move || Ok(camera.status())).await?;
    Ok(Json(status))
}

pub async fn get_exposure(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "exposure_s": state.camera.exposure() }))
}

#[derive(Deserialize)]
pub struct ExposureRequest {
    pub exposure_s: f64,
}

pub async fn set_exposure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExposureRequest>,
) -> ApiResult<impl IntoResponse> {
    let camera = state.camera.clone();
    blocking(move || camera.set_exposure(request.exposure_s)).await?;
    Ok(Json(json!({ "exposure_s": request.exposure_s })))
}

#[derive(Deserialize)]
pub struct CoolerRequest {
    pub enable: bool,
    pub setpoint_c: Option<f64>,
}

pub async fn set_cooler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CoolerRequest>,
) -> ApiResult<impl IntoResponse> {
    let setpoint = match (request.enable, request.setpoint_c) {
        (true, None) => {
            return Err(ApiError::from(SpectroError::InvalidArgument(
                "setpoint_c is required when enabling the cooler".into(),
            )))
        }
        (true, Some(c)) => c,
        (false, c) => c.unwrap_or(0.0),
    };
    let camera = state.camera.clone();
    blocking(move || camera.set_cooler_setpoint(setpoint, request.enable)).await?;
    Ok(Json(json!({ "cooler_enabled": request.enable })))
}

pub async fn get_temperature(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let camera = state.camera.clone();
    let status = blocking(move || Ok(camera.status())).await?;
    Ok(Json(json!({ "temperature_c": status.temperature_c })))
}

#[derive(Deserialize)]
pub struct RoiRequest {
    #[serde(flatten)]
    pub bounds: RoiBounds,
    #[serde(default = "one")]
    pub hbin: usize,
    #[serde(default = "one")]
    pub vbin: usize,
}

fn one() -> usize {
    1
}

pub async fn set_roi(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RoiRequest>,
) -> ApiResult<impl IntoResponse> {
    let camera = state.camera.clone();
    let spectrograph = state.spectrograph.clone();
    blocking(move || {
        camera.set_roi(request.bounds, request.hbin, request.vbin)?;
        // The dispersion geometry changed, so the spectrograph needs the new
        // effective pixel count before the next calibration query.
        spectrograph.configure_from_camera(camera.dispersion_pixels()?)
    })
    .await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn spectrograph_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let spectrograph = state.spectrograph.clone();
    let status = blocking(move || Ok(spectrograph.status())).await?;
    Ok(Json(status))
}

#[derive(Deserialize)]
pub struct GratingRequest {
    pub index: usize,
}

pub async fn set_grating(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GratingRequest>,
) -> ApiResult<impl IntoResponse> {
    let spectrograph = state.spectrograph.clone();
    blocking(move || spectrograph.set_grating(request.index)).await?;
    Ok(Json(json!({ "grating": request.index })))
}

pub async fn list_gratings(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let spectrograph = state.spectrograph.clone();
    let names = blocking(move || Ok(spectrograph.list_gratings())).await?;
    Ok(Json(json!({ "gratings": names })))
}

pub async fn get_central_wavelength(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "center_wavelength_nm": state.spectrograph.center_wavelength() }))
}

#[derive(Deserialize)]
pub struct WavelengthRequest {
    pub wavelength_nm: f64,
}

pub async fn set_central_wavelength(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WavelengthRequest>,
) -> ApiResult<impl IntoResponse> {
    let spectrograph = state.spectrograph.clone();
    blocking(move || spectrograph.set_center_wavelength(request.wavelength_nm)).await?;
    Ok(Json(json!({ "center_wavelength_nm": request.wavelength_nm })))
}

#[derive(Deserialize)]
pub struct SlitQuery {
    #[serde(default)]
    pub side: Option<SlitSide>,
}

pub async fn get_slit_width(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlitQuery>,
) -> ApiResult<impl IntoResponse> {
    let side = query.side.unwrap_or(SlitSide::Input);
    let spectrograph = state.spectrograph.clone();
    let width = blocking(move || spectrograph.slit_width(side)).await?;
    Ok(Json(json!({ "slit_width_um": width, "side": side })))
}

#[derive(Deserialize)]
pub struct SlitRequest {
    pub width_um: f64,
    #[serde(default)]
    pub side: Option<SlitSide>,
}

pub async fn set_slit_width(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SlitRequest>,
) -> ApiResult<impl IntoResponse> {
    let side = request.side.unwrap_or(SlitSide::Input);
    let spectrograph = state.spectrograph.clone();
    blocking(move || spectrograph.set_slit_width(request.width_um, side)).await?;
    Ok(Json(json!({ "slit_width_um": request.width_um, "side": side })))
}

#[derive(Deserialize, Default)]
pub struct AcquireRequest {
    pub laser_wavelength_nm: Option<f64>,
    #[serde(default)]
    pub software_trigger: bool,
}

/// Runs one acquisition, records its outcome (spectrum or typed error) in
/// the shared slot, and hands the same outcome back to the caller. The
/// caller responds from the returned value, never by re-reading the slot: a
/// concurrent acquisition may overwrite the slot at any time.
fn run_acquisition(
    state: &AppState,
    request: &AcquireRequest,
) -> Result<SpectrumResult, Arc<SpectroError>> {
    let laser = request
        .laser_wavelength_nm
        .unwrap_or(state.laser_wavelength_nm);
    let result = if request.software_trigger {
        state
            .coordinator
            .acquire_spectrum_software_triggered(laser, state.frame_timeout)
    } else {
        state.coordinator.acquire_spectrum(laser)
    };
    let outcome = result.map_err(Arc::new);
    let mut slot = state
        .last_spectrum
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    *slot = Some(outcome.clone());
    outcome
}

pub async fn acquire_spectrum(
    State(state): State<Arc<AppState>>,
    request: Option<Json<AcquireRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let worker = state.clone();
    let spectrum = tokio::task::spawn_blocking(move || run_acquisition(&worker, &request))
        .await
        .map_err(|err| {
            ApiError::from(SpectroError::Hardware(format!("worker task failed: {err}")))
        })?
        .map_err(|err| ApiError::new(&err))?;
    Ok(Json(spectrum))
}

/// Fire-and-forget acquisition; poll `/api/spectrum/last` for the outcome.
pub async fn acquire_spectrum_async(
    State(state): State<Arc<AppState>>,
    request: Option<Json<AcquireRequest>>,
) -> impl IntoResponse {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = run_acquisition(&worker, &request) {
            error!("Background acquisition failed: {err}");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
}

pub async fn last_spectrum(State(state): State<Arc<AppState>>) -> Response {
    let outcome = state
        .last_spectrum
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    match outcome {
        Some(Ok(spectrum)) => Json(spectrum).into_response(),
        Some(Err(err)) => ApiError::new(&err).into_response(),
        None => ApiError::not_found("no spectrum acquired yet").into_response(),
    }
}

#[derive(Deserialize, Default)]
pub struct SaveRequest {
    pub filename: Option<String>,
}

/// Persists the most recent spectrum as CSV in the configured data
/// directory.
pub async fn save_spectrum(
    State(state): State<Arc<AppState>>,
    request: Option<Json<SaveRequest>>,
) -> ApiResult<impl IntoResponse> {
    let filename = request.and_then(|Json(r)| r.filename);
    let outcome = state
        .last_spectrum
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let spectrum = match outcome {
        Some(Ok(spectrum)) => spectrum,
        Some(Err(_)) | None => {
            return Err(ApiError::not_found("no spectrum available to save"))
        }
    };
    let camera = state.camera.clone();
    let spectrograph = state.spectrograph.clone();
    let directory = state.storage_dir.clone();
    let path = blocking(move || {
        let config = camera.config_snapshot();
        let status = spectrograph.status();
        crate::storage::save_spectrum_csv(
            &directory,
            filename.as_deref(),
            &spectrum,
            &config,
            &status,
        )
    })
    .await?;
    Ok(Json(json!({ "path": path })))
}

/// Takes one frame and persists it as FITS in the configured data directory.
pub async fn save_image(
    State(state): State<Arc<AppState>>,
    request: Option<Json<SaveRequest>>,
) -> ApiResult<impl IntoResponse> {
    let filename = request.and_then(|Json(r)| r.filename);
    let camera = state.camera.clone();
    let directory = state.storage_dir.clone();
    let path = blocking(move || {
        let frame = camera.acquire_single()?;
        let config = camera.config_snapshot();
        crate::storage::save_frame_fits(&directory, filename.as_deref(), &frame, &config)
    })
    .await?;
    Ok(Json(json!({ "path": path })))
}

/// Best-effort disconnect of both instruments, then signal the binary to
/// stop serving. Cooling stays on.
pub async fn shutdown(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    info!("Shutdown requested over HTTP");
    let camera = state.camera.clone();
    let spectrograph = state.spectrograph.clone();
    blocking(move || {
        camera.disconnect();
        spectrograph.disconnect();
        Ok(())
    })
    .await?;
    state.shutdown.notify_one();
    Ok(Json(json!({ "status": "shutting down" })))
}
