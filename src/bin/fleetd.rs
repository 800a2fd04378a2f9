//! fleetd - vehicle monitoring daemon
//!
//! Starts the road capture worker, the mode-controlled secondary capture
//! worker, both analysis workers, the position monitor and the HTTP surface,
//! then runs until Ctrl-C.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use fleet_sentinel::{
    api::{ApiConfig, StreamServer},
    transport::{Modem, ModemGps, SmsSink, TelegramSink},
    AlertDispatcher, BackendRegistry, CaptureWorker, DeviceOpener, EventLog, EventLogSink,
    FleetConfig, FrameSlot, ModeController, PositionFeed, PositionMonitor, RoadAnalysis,
    SecondaryAnalysis, SourceOpener, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-vehicle camera, driver/cargo and geofence monitor")]
struct Args {
    /// JSON config file. Environment overrides are applied on top.
    #[arg(long, env = "FLEET_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = FleetConfig::load_from(args.config.as_deref())?;

    let events = Arc::new(EventLog::new(&cfg.log_path));
    let modem = Modem::open(&cfg.modem.ports, cfg.modem.baud);

    let mut dispatcher =
        AlertDispatcher::new(cfg.alert_cooldown).with_sink(EventLogSink::new(events.clone()));
    match (&cfg.notify.telegram_url, &cfg.notify.telegram_chat_id) {
        (Some(url), Some(chat_id)) => dispatcher.add_sink(Box::new(TelegramSink::new(url, chat_id))),
        (None, None) => log::info!("telegram notifications not configured"),
        _ => log::warn!("telegram needs both a URL and a chat id; notifications disabled"),
    }
    match (&modem, &cfg.notify.sms_number) {
        (Some(modem), Some(number)) => {
            dispatcher.add_sink(Box::new(SmsSink::new(modem.clone(), number.as_str())))
        }
        (None, Some(_)) => log::warn!("sms number configured but no modem; sms disabled"),
        _ => {}
    }
    log::info!("alert sinks: {}", dispatcher.sink_names().join(", "));
    let alerts = Arc::new(dispatcher);

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    registry.warm_up_all();
    let detectors = Arc::new(registry);

    let opener: Arc<dyn SourceOpener> = Arc::new(DeviceOpener::new());
    let road_input = Arc::new(FrameSlot::new());
    let second_input = Arc::new(FrameSlot::new());
    let road_display = Arc::new(FrameSlot::new());
    let second_display = Arc::new(FrameSlot::new());

    let road_camera = &cfg.cameras.road;
    let road_capture = CaptureWorker::spawn(
        "road",
        opener.open(road_camera),
        road_input.clone(),
        road_camera.fps,
    )?;

    let controller = Arc::new(ModeController::start(
        cfg.initial_mode,
        cfg.cameras.clone(),
        opener,
        second_input.clone(),
    )?);

    RoadAnalysis::new(detectors.clone(), cfg.confidence)
        .spawn(road_input, road_display.clone())?;
    SecondaryAnalysis::new(detectors, alerts.clone(), controller.state(), cfg.confidence)
        .spawn(second_input, second_display.clone())?;

    let feed = modem
        .clone()
        .map(|modem| Box::new(ModemGps::new(modem)) as Box<dyn PositionFeed>);
    PositionMonitor::new(
        feed,
        cfg.geofence,
        cfg.speed_limit_kmh,
        cfg.position_interval,
        alerts.clone(),
        events.clone(),
    )
    .spawn()?;

    let api_handle = StreamServer::new(
        ApiConfig {
            addr: cfg.http_addr.clone(),
            ..ApiConfig::default()
        },
        controller.clone(),
        road_display,
        second_display,
    )
    .spawn()?;

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    log::info!(
        "fleetd running in {} mode, http on {}, events to {}",
        controller.current(),
        api_handle.addr,
        events.path().display()
    );
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    api_handle.stop()?;
    controller.stop()?;
    road_capture.stop()?;
    alerts.flush();

    Ok(())
}
