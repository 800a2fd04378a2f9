//! Alert deduplication and fan-out.
//!
//! Every detector funnels alerts through one `AlertDispatcher`. An alert
//! identity fires at most once per cooldown window; repeats inside the window
//! are dropped, not queued. A forwarded alert goes to every sink, and a sink
//! failure is logged and swallowed so the remaining sinks still get it.
//!
//! The cooldown check runs on the caller's thread. Sinks run on a separate
//! `alert-delivery` thread fed by a channel, so `raise` never waits on a
//! network request or the modem.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

/// Alert conditions raised by the pipeline and the position monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlertKind {
    DriverDrowsy,
    DriverYawning,
    DriverLookingAway,
    PhoneUsage,
    UnauthorizedCargoAccess,
    GeofenceBreach,
    Overspeeding,
}

impl AlertKind {
    pub const ALL: [AlertKind; 7] = [
        AlertKind::DriverDrowsy,
        AlertKind::DriverYawning,
        AlertKind::DriverLookingAway,
        AlertKind::PhoneUsage,
        AlertKind::UnauthorizedCargoAccess,
        AlertKind::GeofenceBreach,
        AlertKind::Overspeeding,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            AlertKind::DriverDrowsy => "⚠️ DRIVER DROWSY",
            AlertKind::DriverYawning => "⚠️ DRIVER YAWNING",
            AlertKind::DriverLookingAway => "⚠️ DRIVER LOOKING AWAY",
            AlertKind::PhoneUsage => "⚠️ PHONE USAGE",
            AlertKind::UnauthorizedCargoAccess => "⚠️ UNAUTHORIZED CARGO ACCESS",
            AlertKind::GeofenceBreach => "⚠️ GEOFENCE BREACH",
            AlertKind::Overspeeding => "⚠️ OVERSPEEDING",
        }
    }

    /// Cooldown key. The message text doubles as the identity.
    pub fn identity(&self) -> &'static str {
        self.message()
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A forwarded alert as seen by sinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub identity: String,
    pub message: String,
    pub raised_at: SystemTime,
}

/// Destination for forwarded alerts. Delivery is best-effort.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, alert: &Alert) -> Result<()>;
}

type SinkList = Arc<RwLock<Vec<Box<dyn AlertSink>>>>;

enum Delivery {
    Alert(Alert),
    /// Acknowledged once everything queued before it has been delivered.
    Flush(Sender<()>),
}

/// Deduplicates alerts per identity and fans them out to sinks.
pub struct AlertDispatcher {
    cooldown: Duration,
    last_fired: Mutex<HashMap<String, Instant>>,
    sinks: SinkList,
    /// `None` when the delivery thread could not be started; sinks then run
    /// on the caller's thread.
    queue: Option<Mutex<Sender<Delivery>>>,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        let sinks: SinkList = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let thread_sinks = sinks.clone();
        let queue = match std::thread::Builder::new()
            .name("alert-delivery".to_string())
            .spawn(move || run_delivery(rx, &thread_sinks))
        {
            Ok(_) => Some(Mutex::new(tx)),
            Err(err) => {
                log::error!("alert delivery thread failed to start: {}", err);
                None
            }
        };
        Self {
            cooldown,
            last_fired: Mutex::new(HashMap::new()),
            sinks,
            queue,
        }
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|sink| sink.name().to_string())
            .collect()
    }

    /// Raise one of the known alert kinds.
    pub fn raise_kind(&self, kind: AlertKind) -> bool {
        self.raise(kind.identity(), kind.message())
    }

    /// Forward `message` unless `identity` fired within the cooldown window.
    /// Returns true when the alert was forwarded. Sink delivery happens
    /// afterwards on the delivery thread.
    pub fn raise(&self, identity: &str, message: &str) -> bool {
        self.raise_at(identity, message, Instant::now())
    }

    /// `raise` with an explicit clock reading.
    pub fn raise_at(&self, identity: &str, message: &str, now: Instant) -> bool {
        if !self.claim(identity, now) {
            log::debug!("alert suppressed by cooldown: {}", message);
            return false;
        }

        log::warn!("alert: {}", message);
        let alert = Alert {
            identity: identity.to_string(),
            message: message.to_string(),
            raised_at: SystemTime::now(),
        };
        match self.enqueue(Delivery::Alert(alert)) {
            Ok(()) => {}
            Err(Delivery::Alert(alert)) => deliver_all(&self.sinks, &alert),
            Err(Delivery::Flush(_)) => {}
        }
        true
    }

    /// Block until every alert forwarded so far has been handed to all sinks.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.enqueue(Delivery::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Hand `delivery` to the delivery thread, or give it back if there is
    /// no thread to take it.
    fn enqueue(&self, delivery: Delivery) -> std::result::Result<(), Delivery> {
        let Some(queue) = &self.queue else {
            return Err(delivery);
        };
        let sender = queue.lock().unwrap_or_else(PoisonError::into_inner);
        sender.send(delivery).map_err(|mpsc::SendError(delivery)| {
            log::debug!("alert delivery thread has exited");
            delivery
        })
    }

    /// Record a fire for `identity` if its cooldown has elapsed.
    fn claim(&self, identity: &str, now: Instant) -> bool {
        let mut table = self
            .last_fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = table.get(identity) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }
        table.insert(identity.to_string(), now);
        true
    }
}

/// Delivery thread body. Exits once the dispatcher is dropped.
fn run_delivery(rx: Receiver<Delivery>, sinks: &RwLock<Vec<Box<dyn AlertSink>>>) {
    for delivery in rx {
        match delivery {
            Delivery::Alert(alert) => deliver_all(sinks, &alert),
            Delivery::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn deliver_all(sinks: &RwLock<Vec<Box<dyn AlertSink>>>, alert: &Alert) {
    let sinks = sinks.read().unwrap_or_else(PoisonError::into_inner);
    for sink in sinks.iter() {
        if let Err(err) = sink.deliver(alert) {
            log::debug!("alert sink {} failed: {:#}", sink.name(), err);
        }
    }
}
