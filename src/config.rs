use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mode::OperatingMode;
use crate::position::Geofence;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_LOG_PATH: &str = "fleet_log.csv";
const DEFAULT_DRIVER_CAMERA: &str = "/dev/video0";
const DEFAULT_ROAD_CAMERA: &str = "/dev/video1";
const DEFAULT_CARGO_CAMERA: &str = "/dev/video2";
const DEFAULT_DRIVER_FPS: u32 = 12;
const DEFAULT_ROAD_FPS: u32 = 10;
const DEFAULT_CARGO_FPS: u32 = 10;
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_GEOFENCE_LAT: f64 = 13.2866;
const DEFAULT_GEOFENCE_LON: f64 = 77.5953;
const DEFAULT_GEOFENCE_RADIUS_KM: f64 = 0.5;
const DEFAULT_SPEED_LIMIT_KMH: f64 = 60.0;
const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_POSITION_INTERVAL_SECS: u64 = 5;
const DEFAULT_MODEM_PORTS: [&str; 4] = ["/dev/ttyUSB2", "/dev/ttyUSB3", "/dev/ttyUSB1", "/dev/ttyUSB0"];
const DEFAULT_MODEM_BAUD: u32 = 115_200;

#[derive(Debug, Deserialize, Default)]
struct FleetConfigFile {
    http_addr: Option<String>,
    log_path: Option<PathBuf>,
    initial_mode: Option<String>,
    confidence: Option<f32>,
    cameras: Option<CamerasConfigFile>,
    geofence: Option<GeofenceConfigFile>,
    speed_limit_kmh: Option<f64>,
    alert_cooldown_secs: Option<u64>,
    position_interval_secs: Option<u64>,
    notify: Option<NotifyConfigFile>,
    modem: Option<ModemConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CamerasConfigFile {
    driver: Option<CameraConfigFile>,
    road: Option<CameraConfigFile>,
    cargo: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct GeofenceConfigFile {
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_km: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    telegram_url: Option<String>,
    telegram_chat_id: Option<String>,
    sms_number: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModemConfigFile {
    ports: Option<Vec<String>>,
    baud: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub http_addr: String,
    pub log_path: PathBuf,
    pub initial_mode: OperatingMode,
    pub confidence: f32,
    pub cameras: CameraSet,
    pub geofence: Geofence,
    pub speed_limit_kmh: f64,
    pub alert_cooldown: Duration,
    pub position_interval: Duration,
    pub notify: NotifySettings,
    pub modem: ModemSettings,
}

/// One camera: device identifier and target sampling frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub device: String,
    pub fps: u32,
}

impl CameraSettings {
    pub fn new(device: impl Into<String>, fps: u32) -> Self {
        Self {
            device: device.into(),
            fps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSet {
    pub driver: CameraSettings,
    pub road: CameraSettings,
    pub cargo: CameraSettings,
}

impl CameraSet {
    /// Camera feeding the secondary pipeline in `mode`.
    pub fn secondary(&self, mode: OperatingMode) -> &CameraSettings {
        match mode {
            OperatingMode::Driver => &self.driver,
            OperatingMode::Cargo => &self.cargo,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub telegram_url: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub sms_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModemSettings {
    pub ports: Vec<String>,
    pub baud: u32,
}

impl FleetConfig {
    /// Load from the JSON file named by `FLEET_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("FLEET_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FleetConfigFile) -> Result<Self> {
        let initial_mode = match file.initial_mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => OperatingMode::Driver,
        };
        let cameras = file.cameras.unwrap_or_default();
        let camera = |cfg: Option<CameraConfigFile>, device: &str, fps: u32| {
            let cfg = cfg.unwrap_or_default();
            CameraSettings {
                device: cfg.device.unwrap_or_else(|| device.to_string()),
                fps: cfg.fps.unwrap_or(fps),
            }
        };
        let geofence = file.geofence.unwrap_or_default();
        let notify = file.notify.unwrap_or_default();
        let modem = file.modem.unwrap_or_default();

        Ok(Self {
            http_addr: file
                .http_addr
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            log_path: file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            initial_mode,
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            cameras: CameraSet {
                driver: camera(cameras.driver, DEFAULT_DRIVER_CAMERA, DEFAULT_DRIVER_FPS),
                road: camera(cameras.road, DEFAULT_ROAD_CAMERA, DEFAULT_ROAD_FPS),
                cargo: camera(cameras.cargo, DEFAULT_CARGO_CAMERA, DEFAULT_CARGO_FPS),
            },
            geofence: Geofence {
                latitude: geofence.latitude.unwrap_or(DEFAULT_GEOFENCE_LAT),
                longitude: geofence.longitude.unwrap_or(DEFAULT_GEOFENCE_LON),
                radius_km: geofence.radius_km.unwrap_or(DEFAULT_GEOFENCE_RADIUS_KM),
            },
            speed_limit_kmh: file.speed_limit_kmh.unwrap_or(DEFAULT_SPEED_LIMIT_KMH),
            alert_cooldown: Duration::from_secs(
                file.alert_cooldown_secs
                    .unwrap_or(DEFAULT_ALERT_COOLDOWN_SECS),
            ),
            position_interval: Duration::from_secs(
                file.position_interval_secs
                    .unwrap_or(DEFAULT_POSITION_INTERVAL_SECS),
            ),
            notify: NotifySettings {
                telegram_url: notify.telegram_url,
                telegram_chat_id: notify.telegram_chat_id,
                sms_number: notify.sms_number,
            },
            modem: ModemSettings {
                ports: modem.ports.unwrap_or_else(|| {
                    DEFAULT_MODEM_PORTS.iter().map(|p| p.to_string()).collect()
                }),
                baud: modem.baud.unwrap_or(DEFAULT_MODEM_BAUD),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("FLEET_HTTP_ADDR") {
            self.http_addr = addr;
        }
        if let Some(path) = non_empty_env("FLEET_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Some(device) = non_empty_env("FLEET_DRIVER_CAMERA") {
            self.cameras.driver.device = device;
        }
        if let Some(device) = non_empty_env("FLEET_ROAD_CAMERA") {
            self.cameras.road.device = device;
        }
        if let Some(device) = non_empty_env("FLEET_CARGO_CAMERA") {
            self.cameras.cargo.device = device;
        }
        if let Some(url) = non_empty_env("FLEET_TELEGRAM_URL") {
            self.notify.telegram_url = Some(url);
        }
        if let Some(chat_id) = non_empty_env("FLEET_TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(chat_id);
        }
        if let Some(number) = non_empty_env("FLEET_SMS_NUMBER") {
            self.notify.sms_number = Some(number);
        }
        if let Some(limit) = non_empty_env("FLEET_SPEED_LIMIT_KMH") {
            self.speed_limit_kmh = limit
                .parse()
                .map_err(|_| anyhow!("FLEET_SPEED_LIMIT_KMH must be a number"))?;
        }
        if let Some(cooldown) = non_empty_env("FLEET_ALERT_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("FLEET_ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.alert_cooldown = Duration::from_secs(seconds);
        }
        if let Some(mode) = non_empty_env("FLEET_INITIAL_MODE") {
            self.initial_mode = mode.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, camera) in [
            ("driver", &self.cameras.driver),
            ("road", &self.cameras.road),
            ("cargo", &self.cameras.cargo),
        ] {
            if camera.fps == 0 {
                return Err(anyhow!("{} camera fps must be greater than zero", name));
            }
            if camera.device.trim().is_empty() {
                return Err(anyhow!("{} camera device must not be empty", name));
            }
        }
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(anyhow!("confidence must be in (0, 1]"));
        }
        if !(-90.0..=90.0).contains(&self.geofence.latitude)
            || !(-180.0..=180.0).contains(&self.geofence.longitude)
        {
            return Err(anyhow!("geofence center is not a valid coordinate"));
        }
        if self.geofence.radius_km <= 0.0 {
            return Err(anyhow!("geofence radius must be greater than zero"));
        }
        if self.speed_limit_kmh <= 0.0 {
            return Err(anyhow!("speed limit must be greater than zero"));
        }
        if self.position_interval.is_zero() {
            return Err(anyhow!("position interval must be greater than zero"));
        }
        if self.modem.baud == 0 {
            return Err(anyhow!("modem baud rate must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FleetConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
