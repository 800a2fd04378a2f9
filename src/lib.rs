//! Fleet Sentinel
//!
//! Per-vehicle monitoring node: camera capture, road and driver/cargo
//! analysis, deduplicated alerting, and geofence/speed tracking.
//!
//! # Pipeline
//!
//! ```text
//! CaptureWorker -> FrameSlot -> RoadAnalysis / SecondaryAnalysis -> FrameSlot -> HTTP stream
//!                                         |
//!                                         v
//!                  PositionMonitor -> AlertDispatcher -> {event log, Telegram, SMS}
//! ```
//!
//! Every stage hands frames through a capacity-one `FrameSlot`, so a slow
//! consumer only ever sees the newest frame. The secondary capture source is
//! chosen by the `ModeController`, which stops the running capture worker
//! before starting the next one.
//!
//! # Module Structure
//!
//! - `frame`: frames, annotation, JPEG encoding, the single-slot channel
//! - `ingest`: camera sources (synthetic, HTTP MJPEG, V4L2)
//! - `capture`: paced capture workers with sequenced stop
//! - `detect`: detector backend trait and registry
//! - `analysis`: road and secondary analysis workers
//! - `mode`: operating mode and the mode controller
//! - `alert`: alert kinds, cooldown dispatcher, sink trait
//! - `event_log`: CSV event log and its alert sink
//! - `transport`: Telegram and cellular modem (SMS, GPS)
//! - `position`: position parsing, haversine, geofence/speed monitor
//! - `api`: HTTP streams and mode control
//! - `config`: JSON + environment configuration

pub mod alert;
pub mod analysis;
pub mod api;
pub mod capture;
pub mod config;
pub mod detect;
pub mod event_log;
pub mod frame;
pub mod ingest;
pub mod mode;
pub mod position;
pub mod transport;

pub use alert::{Alert, AlertDispatcher, AlertKind, AlertSink};
pub use analysis::{RoadAnalysis, SecondaryAnalysis};
pub use api::{ApiConfig, ApiHandle, StreamServer};
pub use capture::{CaptureStats, CaptureWorker, StopSignal};
pub use config::{CameraSet, CameraSettings, FleetConfig};
pub use detect::{BackendRegistry, DetectionCapability, DetectorBackend, StubBackend};
pub use event_log::{EventLog, EventLogSink};
pub use frame::{Frame, FrameSlot, LatestSlot};
pub use ingest::{DeviceOpener, FrameSource, SourceOpener};
pub use mode::{ModeController, ModeSnapshot, ModeState, OperatingMode};
pub use position::{Geofence, PositionFeed, PositionMonitor, PositionSample};
