use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use fleet_sentinel::config::FleetConfig;
use fleet_sentinel::OperatingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FLEET_CONFIG",
        "FLEET_HTTP_ADDR",
        "FLEET_LOG_PATH",
        "FLEET_DRIVER_CAMERA",
        "FLEET_ROAD_CAMERA",
        "FLEET_CARGO_CAMERA",
        "FLEET_TELEGRAM_URL",
        "FLEET_TELEGRAM_CHAT_ID",
        "FLEET_SMS_NUMBER",
        "FLEET_SPEED_LIMIT_KMH",
        "FLEET_ALERT_COOLDOWN_SECS",
        "FLEET_INITIAL_MODE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "http_addr": "127.0.0.1:8080",
        "log_path": "/var/log/fleet/events.csv",
        "initial_mode": "cargo",
        "confidence": 0.55,
        "cameras": {
            "driver": { "device": "stub://driver", "fps": 15 },
            "road": { "device": "http://10.0.0.5/video" }
        },
        "geofence": { "latitude": 12.97, "longitude": 77.59, "radius_km": 2.0 },
        "speed_limit_kmh": 80,
        "notify": { "telegram_chat_id": "42" },
        "modem": { "ports": ["/dev/ttyACM0"], "baud": 9600 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("FLEET_CONFIG", file.path());
    std::env::set_var("FLEET_CARGO_CAMERA", "stub://cargo");
    std::env::set_var("FLEET_TELEGRAM_URL", "https://api.example.test/send");
    std::env::set_var("FLEET_ALERT_COOLDOWN_SECS", "30");
    std::env::set_var("FLEET_INITIAL_MODE", "DRIVER");

    let cfg = FleetConfig::load().expect("load config");

    assert_eq!(cfg.http_addr, "127.0.0.1:8080");
    assert_eq!(cfg.log_path, PathBuf::from("/var/log/fleet/events.csv"));
    assert_eq!(cfg.initial_mode, OperatingMode::Driver);
    assert!((cfg.confidence - 0.55).abs() < f32::EPSILON);
    assert_eq!(cfg.cameras.driver.device, "stub://driver");
    assert_eq!(cfg.cameras.driver.fps, 15);
    assert_eq!(cfg.cameras.road.device, "http://10.0.0.5/video");
    assert_eq!(cfg.cameras.road.fps, 10);
    assert_eq!(cfg.cameras.cargo.device, "stub://cargo");
    assert_eq!(cfg.geofence.radius_km, 2.0);
    assert_eq!(cfg.speed_limit_kmh, 80.0);
    assert_eq!(cfg.alert_cooldown, Duration::from_secs(30));
    assert_eq!(
        cfg.notify.telegram_url.as_deref(),
        Some("https://api.example.test/send")
    );
    assert_eq!(cfg.notify.telegram_chat_id.as_deref(), Some("42"));
    assert_eq!(cfg.notify.sms_number, None);
    assert_eq!(cfg.modem.ports, vec!["/dev/ttyACM0"]);
    assert_eq!(cfg.modem.baud, 9600);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FleetConfig::load().expect("load defaults");
    assert_eq!(cfg.http_addr, "0.0.0.0:5000");
    assert_eq!(cfg.log_path, PathBuf::from("fleet_log.csv"));
    assert_eq!(cfg.geofence.latitude, 13.2866);
    assert_eq!(cfg.geofence.longitude, 77.5953);
    assert_eq!(cfg.speed_limit_kmh, 60.0);
    assert!((cfg.confidence - 0.4).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FLEET_SPEED_LIMIT_KMH", "fast");
    assert!(FleetConfig::load().is_err());
    clear_env();

    std::env::set_var("FLEET_INITIAL_MODE", "parking");
    assert!(FleetConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"geofence": {"radius_km": 0}}"#).expect("write");
    assert!(FleetConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{not json").expect("write");
    assert!(FleetConfig::load_from(Some(file.path())).is_err());

    clear_env();
}

#[test]
fn zero_cooldown_is_allowed() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FLEET_ALERT_COOLDOWN_SECS", "0");
    let cfg = FleetConfig::load().expect("load config");
    assert!(cfg.alert_cooldown.is_zero());

    clear_env();
}
