use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_sentinel::detect::{DetectionResult, Landmark, LandmarkSet};
use fleet_sentinel::{
    AlertDispatcher, AlertKind, BackendRegistry, CameraSet, CameraSettings, CaptureWorker,
    DetectionCapability, DetectorBackend, DeviceOpener, EventLog, EventLogSink, Frame, FrameSlot,
    Geofence, ModeController, OperatingMode, PositionFeed, PositionMonitor, RoadAnalysis,
    SecondaryAnalysis, SourceOpener, StubBackend,
};

/// Every face it reports has both eyes shut; every frame has a hand in it.
struct SleepyDriver;

impl SleepyDriver {
    fn closed_eyes() -> LandmarkSet {
        let mut points = vec![Landmark::new(0.5, 0.5); 478];
        for eye in [[33, 160, 158, 133, 153, 144], [362, 385, 387, 263, 373, 380]] {
            points[eye[0]] = Landmark::new(0.40, 0.4);
            points[eye[3]] = Landmark::new(0.50, 0.4);
            points[eye[1]] = Landmark::new(0.45, 0.400);
            points[eye[5]] = Landmark::new(0.45, 0.405);
        }
        points[78] = Landmark::new(0.4, 0.7);
        points[308] = Landmark::new(0.6, 0.7);
        LandmarkSet::new(points)
    }
}

impl DetectorBackend for SleepyDriver {
    fn name(&self) -> &'static str {
        "sleepy_driver"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability != DetectionCapability::Objects
    }

    fn detect(
        &mut self,
        capability: DetectionCapability,
        _frame: &Frame,
        _confidence: f32,
    ) -> Result<DetectionResult> {
        let landmarks = match capability {
            DetectionCapability::FaceLandmarks => vec![Self::closed_eyes()],
            _ => vec![LandmarkSet::new(vec![Landmark::new(0.5, 0.5); 21])],
        };
        Ok(DetectionResult {
            objects: Vec::new(),
            landmarks,
        })
    }
}

fn stub_cameras(fps: u32) -> CameraSet {
    CameraSet {
        driver: CameraSettings::new("stub://driver", fps),
        road: CameraSettings::new("stub://road", fps),
        cargo: CameraSettings::new("stub://cargo", fps),
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[test]
fn road_frames_flow_from_capture_to_display() {
    let opener = DeviceOpener::new();
    let input = Arc::new(FrameSlot::new());
    let display = Arc::new(FrameSlot::new());

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    RoadAnalysis::new(Arc::new(registry), 0.4)
        .spawn(input.clone(), display.clone())
        .unwrap();

    let camera = CameraSettings::new("stub://road", 25);
    let capture = CaptureWorker::spawn("road", opener.open(&camera), input, camera.fps).unwrap();

    for _ in 0..3 {
        let frame = display
            .pop_timeout(Duration::from_secs(2))
            .expect("annotated road frame");
        assert!(frame.width() > 0 && frame.height() > 0);
    }
    let stats = capture.stop().unwrap();
    assert!(stats.frames_pushed >= 3);
}

#[test]
fn drowsy_driver_is_logged_then_cargo_mode_flags_hands() {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventLog::new(dir.path().join("fleet_log.csv")));
    let alerts = Arc::new(
        AlertDispatcher::new(Duration::from_secs(60)).with_sink(EventLogSink::new(events.clone())),
    );

    let mut registry = BackendRegistry::new();
    registry.register(SleepyDriver);
    registry.register(StubBackend::new());
    let detectors = Arc::new(registry);

    let second_input = Arc::new(FrameSlot::new());
    let second_display = Arc::new(FrameSlot::new());
    let controller = ModeController::start(
        OperatingMode::Driver,
        stub_cameras(50),
        Arc::new(DeviceOpener::new()),
        second_input.clone(),
    )
    .unwrap();
    SecondaryAnalysis::new(detectors, alerts, controller.state(), 0.4)
        .spawn(second_input, second_display.clone())
        .unwrap();

    let log_contains = |needle: &str| {
        std::fs::read_to_string(events.path())
            .map(|text| text.contains(needle))
            .unwrap_or(false)
    };
    assert!(wait_for(Duration::from_secs(5), || log_contains(
        AlertKind::DriverDrowsy.message()
    )));
    assert!(!log_contains(AlertKind::UnauthorizedCargoAccess.message()));
    assert!(second_display.pop_timeout(Duration::from_secs(2)).is_some());

    controller.switch_to(OperatingMode::Cargo).unwrap();
    assert!(wait_for(Duration::from_secs(5), || log_contains(
        AlertKind::UnauthorizedCargoAccess.message()
    )));

    let text = std::fs::read_to_string(events.path()).unwrap();
    let drowsy_rows = text
        .lines()
        .filter(|row| row.ends_with(",ALERT,SYSTEM,⚠️ DRIVER DROWSY"))
        .count();
    assert_eq!(drowsy_rows, 1, "cooldown should collapse repeats");
    controller.stop().unwrap();
}

struct FixedFeed(&'static str);

impl PositionFeed for FixedFeed {
    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }
}

#[test]
fn position_monitor_raises_geofence_and_speed_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventLog::new(dir.path().join("fleet_log.csv")));
    let alerts = Arc::new(
        AlertDispatcher::new(Duration::from_secs(60)).with_sink(EventLogSink::new(events.clone())),
    );
    // 37.797 knots is 70 km/h.
    let mut monitor = PositionMonitor::new(
        Some(Box::new(FixedFeed("$FIX,13.30,N,77.60,E,0,0,37.797"))),
        Geofence {
            latitude: 13.2866,
            longitude: 77.5953,
            radius_km: 0.5,
        },
        60.0,
        Duration::from_secs(5),
        alerts.clone(),
        events.clone(),
    );

    assert_eq!(
        monitor.poll_once(),
        vec![AlertKind::GeofenceBreach, AlertKind::Overspeeding]
    );
    // Inside the cooldown window both conditions persist but nothing is forwarded.
    assert!(monitor.poll_once().is_empty());
    alerts.flush();

    let text = std::fs::read_to_string(events.path()).unwrap();
    assert_eq!(text.matches(",GPS,LIVE,").count(), 2);
    assert_eq!(text.matches(",ALERT,SYSTEM,⚠️ GEOFENCE BREACH").count(), 1);
    assert_eq!(text.matches(",ALERT,SYSTEM,⚠️ OVERSPEEDING").count(), 1);
}
