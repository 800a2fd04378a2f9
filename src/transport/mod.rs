//! Outbound alert transports and the cellular modem.
//!
//! - `TelegramSink`: messaging API over HTTPS
//! - `Modem`: AT-command serial link shared by `SmsSink` and `ModemGps`
//!
//! All transports are best-effort with short timeouts. Errors are returned to
//! the caller (the alert dispatcher or position monitor), which logs and drops
//! them.

pub mod modem;
pub mod telegram;

pub use modem::{Modem, ModemGps, ModemPort, SmsSink};
pub use telegram::TelegramSink;
