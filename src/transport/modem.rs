//! Cellular modem over an AT-command serial port.
//!
//! One `Modem` is shared by the SMS sink and the GPS feed; every AT exchange
//! holds the port lock for its whole duration so the two never interleave.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::alert::{Alert, AlertSink};
use crate::position::PositionFeed;

/// Pause between AT commands while the modem processes the previous one.
const AT_PAUSE: Duration = Duration::from_millis(500);
const CTRL_Z: u8 = 0x1A;
const MAX_RESPONSE_BYTES: usize = 4096;

/// Byte stream to the modem. Implemented by the serial device file and by
/// in-memory fakes.
pub trait ModemPort: Read + Write + Send {}

impl<T: Read + Write + Send> ModemPort for T {}

pub struct Modem {
    port_name: String,
    port: Mutex<Box<dyn ModemPort>>,
    pause: Duration,
}

impl Modem {
    /// Try each candidate port in order. `None` means no modem: SMS and
    /// positioning become no-ops.
    pub fn open(ports: &[String], baud: u32) -> Option<Arc<Modem>> {
        for path in ports {
            match open_serial(path, baud) {
                Ok(file) => {
                    log::info!("modem: opened {} at {} baud", path, baud);
                    return Some(Arc::new(Self::from_port(path, Box::new(file))));
                }
                Err(err) => log::debug!("modem: {} unavailable: {:#}", path, err),
            }
        }
        log::warn!("modem: no serial port available; SMS and positioning disabled");
        None
    }

    pub fn from_port(name: &str, port: Box<dyn ModemPort>) -> Self {
        Self {
            port_name: name.to_string(),
            port: Mutex::new(port),
            pause: AT_PAUSE,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Send a text message: text mode, recipient, body terminated by Ctrl-Z.
    pub fn send_sms(&self, number: &str, text: &str) -> Result<()> {
        let mut port = self
            .port
            .lock()
            .map_err(|_| anyhow!("modem {} lock poisoned", self.port_name))?;
        port.write_all(b"AT+CMGF=1\r").context("set sms text mode")?;
        std::thread::sleep(self.pause);
        port.write_all(format!("AT+CMGS=\"{}\"\r", number).as_bytes())
            .context("set sms recipient")?;
        std::thread::sleep(self.pause);
        let mut body = text.as_bytes().to_vec();
        body.push(CTRL_Z);
        port.write_all(&body).context("write sms body")?;
        port.flush().context("flush sms")?;
        Ok(())
    }

    /// Ask for a GNSS fix. Returns the first response line containing a comma,
    /// or `None` if the modem answered without one.
    pub fn query_gps(&self) -> Result<Option<String>> {
        let mut port = self
            .port
            .lock()
            .map_err(|_| anyhow!("modem {} lock poisoned", self.port_name))?;
        port.write_all(b"AT+CGPSINFO\r").context("request gps info")?;
        port.flush().context("flush gps request")?;
        std::thread::sleep(self.pause);
        let response = read_available(&mut **port)?;
        Ok(response
            .lines()
            .map(str::trim)
            .find(|line| line.contains(','))
            .map(str::to_string))
    }
}

/// Read until the port goes quiet (read returns 0 or times out).
fn read_available(port: &mut dyn ModemPort) -> Result<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 512];
    while data.len() < MAX_RESPONSE_BYTES {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(anyhow::Error::new(err).context("read modem response")),
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn open_serial(path: &str, baud: u32) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open serial port {}", path))?;
    configure_tty(&file, baud)?;
    Ok(file)
}

/// Raw mode at `baud`, reads return after one second of silence.
#[cfg(target_os = "linux")]
fn configure_tty(file: &File, baud: u32) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        921_600 => libc::B921600,
        other => return Err(anyhow!("unsupported baud rate {}", other)),
    };
    let fd = file.as_raw_fd();
    // SAFETY: fd is an open descriptor owned by `file` for the duration of
    // these calls, and `tio` is a plain C struct initialized by tcgetattr.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error()).context("tcgetattr (not a tty?)");
        }
        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 10;
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error()).context("tcsetattr");
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn configure_tty(_file: &File, _baud: u32) -> Result<()> {
    Ok(())
}

/// Text-message alert sink.
pub struct SmsSink {
    modem: Arc<Modem>,
    number: String,
}

impl SmsSink {
    pub fn new(modem: Arc<Modem>, number: impl Into<String>) -> Self {
        Self {
            modem,
            number: number.into(),
        }
    }
}

impl AlertSink for SmsSink {
    fn name(&self) -> &str {
        "sms"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        self.modem.send_sms(&self.number, &alert.message)
    }
}

/// Positioning feed backed by the modem's GNSS receiver.
pub struct ModemGps {
    modem: Arc<Modem>,
}

impl ModemGps {
    pub fn new(modem: Arc<Modem>) -> Self {
        Self { modem }
    }
}

impl PositionFeed for ModemGps {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.modem.query_gps()
    }
}
