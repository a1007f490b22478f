use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use spectro_daq::acquisition::AcquisitionCoordinator;
use spectro_daq::config::Settings;
use spectro_daq::device::mock::{MockCamera, MockSpectrograph};
use spectro_daq::server::{self, AppState};
use spectro_daq::session::{CameraSession, SpectrographSession};
use std::sync::Arc;
use std::time::Duration;

/// Fan switches to full speed when the sensor is within this many degrees of
/// the setpoint.
const FAN_THRESHOLD_C: f64 = 5.0;

#[derive(Parser, Debug)]
#[command(name = "spectro_daq", about = "CCD spectrometer control server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Bind address, overriding the configuration file.
    #[arg(long)]
    bind: Option<String>,

    /// Run against simulated instruments instead of vendor hardware.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if !cli.simulate {
        anyhow::bail!("no vendor SDK is linked into this build; run with --simulate");
    }

    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let frame_timeout = Duration::from_secs_f64(settings.camera.frame_timeout_s);

    let camera = Arc::new(CameraSession::new(Box::new(MockCamera::new()), frame_timeout));
    let spectrograph = Arc::new(SpectrographSession::new(Box::new(MockSpectrograph::new())));

    camera.connect().context("connecting camera")?;
    spectrograph
        .connect()
        .context("connecting spectrograph")?;

    camera.set_exposure(settings.camera.exposure_s)?;
    camera.set_fan_mode(settings.camera.fan_mode)?;
    if let Some(setpoint) = settings.camera.cooling_setpoint_c {
        camera.set_cooler_setpoint(setpoint, true)?;
        info!("Cooling enabled, setpoint {setpoint} C");
    }

    spectrograph.set_pixel_pitch(settings.spectrograph.pixel_pitch_um)?;
    spectrograph.set_grating(settings.spectrograph.default_grating)?;
    spectrograph.configure_from_camera(camera.dispersion_pixels()?)?;

    let coordinator = Arc::new(AcquisitionCoordinator::new(camera.clone(), spectrograph.clone()));
    let state = Arc::new(AppState::new(
        coordinator,
        settings.laser.wavelength_nm,
        frame_timeout,
        std::path::PathBuf::from(&settings.storage.default_path),
    ));

    // The controller can silently drop cooling state, so re-assert it once a
    // second and track the fan policy alongside.
    let maintenance_camera = camera.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            let camera = maintenance_camera.clone();
            let result = tokio::task::spawn_blocking(move || {
                camera.maintain_cooling()?;
                camera.auto_fan(FAN_THRESHOLD_C)
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Cooling maintenance failed: {err}"),
                Err(err) => warn!("Cooling maintenance task failed: {err}"),
            }
        }
    });

    let bind_addr = cli.bind.unwrap_or_else(|| settings.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("Listening on {bind_addr}");

    let shutdown_state = state.clone();
    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
                () = shutdown_state.shutdown.notified() => {}
            }
        })
        .await
        .context("serving HTTP")?;

    // Cooling is deliberately left on so the sensor is not thermally cycled.
    camera.disconnect();
    spectrograph.disconnect();
    info!("Instruments released; cooling left enabled");
    Ok(())
}
