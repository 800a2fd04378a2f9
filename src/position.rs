//! Position, geofence and speed monitoring.
//!
//! The monitor polls a line-oriented positioning feed at a fixed interval.
//! Latitude and longitude come from fields 1 and 3, speed in knots from
//! field 7. Coordinates and speed are parsed independently, so a reading
//! with a fix but no speed still drives the geofence check.

use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::alert::{AlertDispatcher, AlertKind};
use crate::event_log::EventLog;

/// Mean earth radius used by the haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KNOTS_TO_KMH: f64 = 1.852;

const LATITUDE_FIELD: usize = 1;
const LONGITUDE_FIELD: usize = 3;
const SPEED_FIELD: usize = 7;

/// One positioning-feed reading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionSample {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_kmh: Option<f64>,
}

impl PositionSample {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Parse one feed line. Short or malformed fields come back as `None`.
pub fn parse_position_line(line: &str) -> PositionSample {
    let fields: Vec<&str> = line.trim().split(',').collect();
    let number = |idx: usize| -> Option<f64> {
        fields
            .get(idx)
            .and_then(|field| field.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    };
    let (latitude, longitude) = match (number(LATITUDE_FIELD), number(LONGITUDE_FIELD)) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };
    PositionSample {
        latitude,
        longitude,
        speed_kmh: number(SPEED_FIELD).map(|knots| knots * KNOTS_TO_KMH),
    }
}

/// Great-circle distance in kilometres on a spherical earth.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Circular authorized operating area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl Geofence {
    pub fn distance_km(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_km(latitude, longitude, self.latitude, self.longitude)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_km(latitude, longitude) <= self.radius_km
    }
}

/// Line-oriented positioning source.
pub trait PositionFeed: Send {
    /// One raw reading, or `None` when the receiver has nothing to report.
    fn read_line(&mut self) -> Result<Option<String>>;
}

pub struct PositionMonitor {
    feed: Option<Box<dyn PositionFeed>>,
    geofence: Geofence,
    speed_limit_kmh: f64,
    interval: Duration,
    alerts: Arc<AlertDispatcher>,
    events: Arc<EventLog>,
}

impl PositionMonitor {
    /// A monitor without a feed never reads and never alerts.
    pub fn new(
        feed: Option<Box<dyn PositionFeed>>,
        geofence: Geofence,
        speed_limit_kmh: f64,
        interval: Duration,
        alerts: Arc<AlertDispatcher>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            feed,
            geofence,
            speed_limit_kmh,
            interval,
            alerts,
            events,
        }
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    /// Read and evaluate one sample. Returns the alerts that were forwarded.
    pub fn poll_once(&mut self) -> Vec<AlertKind> {
        let Some(feed) = self.feed.as_mut() else {
            return Vec::new();
        };
        let line = match feed.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => return Vec::new(),
            Err(err) => {
                log::debug!("position read failed: {:#}", err);
                return Vec::new();
            }
        };
        let sample = parse_position_line(&line);
        self.evaluate(&sample)
    }

    /// Log a sample and raise geofence and speed alerts for it.
    pub fn evaluate(&self, sample: &PositionSample) -> Vec<AlertKind> {
        let mut raised = Vec::new();
        if let Some((lat, lon)) = sample.coordinates() {
            self.events
                .record_quietly("GPS", "LIVE", &format!("{},{}", lat, lon));
            let distance = self.geofence.distance_km(lat, lon);
            if distance > self.geofence.radius_km {
                log::debug!(
                    "outside geofence: {:.3} km > {:.3} km",
                    distance,
                    self.geofence.radius_km
                );
                if self.alerts.raise_kind(AlertKind::GeofenceBreach) {
                    raised.push(AlertKind::GeofenceBreach);
                }
            }
        }
        if let Some(speed) = sample.speed_kmh {
            self.events.record_quietly("GPS", "SPEED", &speed.to_string());
            if speed > self.speed_limit_kmh && self.alerts.raise_kind(AlertKind::Overspeeding) {
                raised.push(AlertKind::Overspeeding);
            }
        }
        raised
    }

    /// Poll forever at the configured interval.
    pub fn run(mut self) {
        if !self.has_feed() {
            log::warn!("position monitor: no positioning feed, geofence and speed checks disabled");
        }
        loop {
            self.poll_once();
            std::thread::sleep(self.interval);
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("position".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Alert, AlertSink};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const CENTER: Geofence = Geofence {
        latitude: 13.2866,
        longitude: 77.5953,
        radius_km: 0.5,
    };

    struct ScriptedFeed {
        lines: VecDeque<Result<Option<String>>>,
    }

    impl PositionFeed for ScriptedFeed {
        fn read_line(&mut self) -> Result<Option<String>> {
            self.lines.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl AlertSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn deliver(&self, alert: &Alert) -> Result<()> {
            self.seen.lock().unwrap().push(alert.message.clone());
            Ok(())
        }
    }

    fn monitor(
        lines: Vec<Result<Option<String>>>,
        events: Arc<EventLog>,
    ) -> (PositionMonitor, Recorder, Arc<AlertDispatcher>) {
        let recorder = Recorder::default();
        let alerts =
            Arc::new(AlertDispatcher::new(Duration::from_secs(10)).with_sink(recorder.clone()));
        let feed = ScriptedFeed {
            lines: lines.into(),
        };
        let monitor = PositionMonitor::new(
            Some(Box::new(feed)),
            CENTER,
            60.0,
            Duration::from_millis(1),
            alerts.clone(),
            events,
        );
        (monitor, recorder, alerts)
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_identity() {
        let a = (13.30, 77.60);
        let b = (12.97, 77.59);
        assert_eq!(haversine_km(a.0, a.1, a.0, a.1), 0.0);
        let ab = haversine_km(a.0, a.1, b.0, b.1);
        let ba = haversine_km(b.0, b.1, a.0, a.1);
        assert!((ab - ba).abs() < 1e-9);
        assert!(ab > 30.0 && ab < 40.0, "distance {}", ab);
    }

    #[test]
    fn parses_fields_independently() {
        let sample = parse_position_line("$FIX,13.30,N,77.60,E,0,0,37.8");
        assert_eq!(sample.coordinates(), Some((13.30, 77.60)));
        assert!((sample.speed_kmh.unwrap() - 70.0056).abs() < 1e-3);

        let no_speed = parse_position_line("$FIX,13.30,N,77.60,E");
        assert_eq!(no_speed.coordinates(), Some((13.30, 77.60)));
        assert_eq!(no_speed.speed_kmh, None);

        let no_fix = parse_position_line("$FIX,,N,,E,0,0,10.0");
        assert_eq!(no_fix.coordinates(), None);
        assert!(no_fix.speed_kmh.is_some());

        assert_eq!(parse_position_line("OK"), PositionSample::default());
    }

    #[test]
    fn breach_and_overspeed_are_both_raised() {
        let dir = tempdir().unwrap();
        let events = Arc::new(EventLog::new(dir.path().join("events.csv")));
        let line = format!("$FIX,13.30,N,77.60,E,0,0,{}", 70.0 / KNOTS_TO_KMH);
        let (mut monitor, recorder, alerts) = monitor(vec![Ok(Some(line))], events.clone());

        let distance = CENTER.distance_km(13.30, 77.60);
        assert!((distance - 1.6).abs() < 0.1, "distance {}", distance);

        let raised = monitor.poll_once();
        assert_eq!(raised, vec![AlertKind::GeofenceBreach, AlertKind::Overspeeding]);
        alerts.flush();
        assert_eq!(
            recorder.seen.lock().unwrap().as_slice(),
            &["⚠️ GEOFENCE BREACH".to_string(), "⚠️ OVERSPEEDING".to_string()]
        );

        let log = std::fs::read_to_string(events.path()).unwrap();
        assert!(log.contains(",GPS,LIVE,\"13.3,77.6\""));
        assert!(log.contains(",GPS,SPEED,"));
    }

    #[test]
    fn inside_fence_under_limit_is_quiet() {
        let dir = tempdir().unwrap();
        let events = Arc::new(EventLog::new(dir.path().join("events.csv")));
        let line = "$FIX,13.2866,N,77.5953,E,0,0,10".to_string();
        let (mut monitor, recorder, alerts) = monitor(vec![Ok(Some(line))], events);
        assert!(monitor.poll_once().is_empty());
        alerts.flush();
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn feed_errors_and_garbage_are_skipped() {
        let dir = tempdir().unwrap();
        let events = Arc::new(EventLog::new(dir.path().join("events.csv")));
        let (mut monitor, recorder, alerts) = monitor(
            vec![
                Err(anyhow::anyhow!("port closed")),
                Ok(Some("ERROR".to_string())),
                Ok(None),
            ],
            events,
        );
        for _ in 0..3 {
            assert!(monitor.poll_once().is_empty());
        }
        alerts.flush();
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_feed_is_a_no_op() {
        let dir = tempdir().unwrap();
        let events = Arc::new(EventLog::new(dir.path().join("events.csv")));
        let mut monitor = PositionMonitor::new(
            None,
            CENTER,
            60.0,
            Duration::from_secs(5),
            Arc::new(AlertDispatcher::new(Duration::from_secs(10))),
            events.clone(),
        );
        assert!(!monitor.has_feed());
        assert!(monitor.poll_once().is_empty());
        assert!(!events.path().exists());
    }
}
