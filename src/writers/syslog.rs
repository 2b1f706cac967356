//! Syslog writer for local or remote syslog daemons
//!
//! Messages use an RFC 5424 style line and are sent by a worker thread that
//! keeps one long-lived connection, reconnecting with a randomized backoff
//! when a write fails.

use super::backoff::Backoff;
use super::worker::{self, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::core::{
    diagnostics, ColorTheme, LogEvent, LogLevel, LoggerError, Result, Writer, WriterMetrics,
};
use chrono::SecondsFormat;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const COMPONENT: &str = "SyslogWriter";

/// Byte order mark preceding the free-form message part
const UTF8_BOM: char = '\u{feff}';

/// Well-known local syslog socket paths
pub const LOCAL_SOCKET_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

/// Attempts at sending one message before it is dropped
const MAX_SEND_ATTEMPTS: u32 = 3;

// Severities from <sys/syslog.h>
const SEVERITY_CRIT: u8 = 2;
const SEVERITY_ERR: u8 = 3;
const SEVERITY_WARNING: u8 = 4;
const SEVERITY_INFO: u8 = 6;
const SEVERITY_DEBUG: u8 = 7;

/// Syslog severity for a level
pub fn severity(level: LogLevel) -> u8 {
    match level {
        LogLevel::Trace | LogLevel::Debug => SEVERITY_DEBUG,
        LogLevel::Info => SEVERITY_INFO,
        LogLevel::Warning => SEVERITY_WARNING,
        LogLevel::Error => SEVERITY_ERR,
        LogLevel::Critical => SEVERITY_CRIT,
    }
}

/// Level that produces `severity`, if any
pub fn level_for_severity(severity: u8) -> Option<LogLevel> {
    match severity {
        SEVERITY_DEBUG => Some(LogLevel::Debug),
        SEVERITY_INFO => Some(LogLevel::Info),
        SEVERITY_WARNING => Some(LogLevel::Warning),
        SEVERITY_ERR => Some(LogLevel::Error),
        SEVERITY_CRIT => Some(LogLevel::Critical),
        _ => None,
    }
}

/// Read the `<PRI>` field of a wire message
pub fn parse_priority(message: &str) -> Option<u8> {
    let rest = message.strip_prefix('<')?;
    let end = rest.find('>')?;
    rest[..end].parse().ok()
}

/// Format one wire message
///
/// `<PRI>1 <timestamp> <host> <module> <pid> - - <BOM><file>:<line> <message>`
pub fn format_message(event: &LogEvent, hostname: &str, pid: u32) -> String {
    let app_name = if event.module.is_empty() {
        "-"
    } else {
        event.module.as_str()
    };

    format!(
        "<{}>1 {} {} {} {} - - {}{}:{} {}\n",
        severity(event.level),
        event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        hostname,
        app_name,
        pid,
        UTF8_BOM,
        event.file,
        event.line,
        event.message
    )
}

/// A live connection to a syslog daemon
pub trait SyslogConnection: Send {
    /// Send one complete message
    fn write_message(&mut self, message: &[u8]) -> io::Result<()>;
}

impl SyslogConnection for TcpStream {
    fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        self.write_all(message)
    }
}

impl SyslogConnection for UdpSocket {
    fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        self.send(message).map(|_| ())
    }
}

#[cfg(unix)]
impl SyslogConnection for std::os::unix::net::UnixStream {
    fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        self.write_all(message)
    }
}

#[cfg(unix)]
impl SyslogConnection for std::os::unix::net::UnixDatagram {
    fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        self.send(message).map(|_| ())
    }
}

/// Something that can (re)establish a syslog connection
pub trait Connector: Send + 'static {
    fn connect(&mut self) -> io::Result<Box<dyn SyslogConnection>>;

    /// Local daemons are addressed as `localhost` in the host field,
    /// everything else as `-`
    fn is_local(&self) -> bool {
        false
    }

    /// Human readable target, used in errors
    fn describe(&self) -> String;
}

/// Transport for a remote syslog target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
    Unix,
    Unixgram,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
            Network::Unix => write!(f, "unix"),
            Network::Unixgram => write!(f, "unixgram"),
        }
    }
}

impl FromStr for Network {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "udp" | "udp4" | "udp6" => Ok(Network::Udp),
            "unix" => Ok(Network::Unix),
            "unixgram" => Ok(Network::Unixgram),
            _ => Err(LoggerError::config(
                COMPONENT,
                format!("unknown network '{}'", s),
            )),
        }
    }
}

/// Where a [`SyslogWriter`] sends its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyslogTarget {
    /// The local daemon, through one of the well-known Unix sockets
    Local,
    /// An explicit network address (`host:port` or a socket path)
    Remote { network: Network, address: String },
}

impl SyslogTarget {
    pub fn remote(network: Network, address: impl Into<String>) -> Self {
        SyslogTarget::Remote {
            network,
            address: address.into(),
        }
    }
}

fn connect_udp(address: &str) -> io::Result<UdpSocket> {
    let addrs: Vec<SocketAddr> = address.to_socket_addrs()?.collect();
    let mut last_err = io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to");
    for addr in addrs {
        let bind = if addr.is_ipv4() {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        } else {
            SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
        };
        match UdpSocket::bind(bind).and_then(|socket| socket.connect(addr).map(|()| socket)) {
            Ok(socket) => return Ok(socket),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[cfg(unix)]
fn connect_unix(network: Network, path: &str) -> io::Result<Box<dyn SyslogConnection>> {
    use std::os::unix::net::{UnixDatagram, UnixStream};

    match network {
        Network::Unixgram => {
            let socket = UnixDatagram::unbound()?;
            socket.connect(path)?;
            Ok(Box::new(socket))
        }
        _ => Ok(Box::new(UnixStream::connect(path)?)),
    }
}

#[cfg(not(unix))]
fn connect_unix(_network: Network, _path: &str) -> io::Result<Box<dyn SyslogConnection>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}

impl Connector for SyslogTarget {
    fn connect(&mut self) -> io::Result<Box<dyn SyslogConnection>> {
        match self {
            SyslogTarget::Local => {
                for network in [Network::Unixgram, Network::Unix] {
                    for path in LOCAL_SOCKET_PATHS {
                        if let Ok(conn) = connect_unix(network, path) {
                            return Ok(conn);
                        }
                    }
                }
                Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "unix syslog delivery error",
                ))
            }
            SyslogTarget::Remote { network, address } => match network {
                Network::Tcp => Ok(Box::new(TcpStream::connect(address.as_str())?)),
                Network::Udp => Ok(Box::new(connect_udp(address)?)),
                Network::Unix | Network::Unixgram => connect_unix(*network, address),
            },
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, SyslogTarget::Local)
    }

    fn describe(&self) -> String {
        match self {
            SyslogTarget::Local => "local syslog".to_string(),
            SyslogTarget::Remote { network, address } => format!("{}://{}", network, address),
        }
    }
}

/// Configuration for [`SyslogWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogConfig {
    /// Events below this level are ignored
    pub min_level: LogLevel,
    /// Messages buffered between callers and the worker
    pub buffer_size: usize,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Warning,
            buffer_size: 1000,
        }
    }
}

impl SyslogConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// Host field for messages sent through `connector`
fn host_field(connector: &dyn Connector) -> &'static str {
    if connector.is_local() {
        "localhost"
    } else {
        "-"
    }
}

/// Worker side of a [`SyslogWriter`]
struct SendLoop {
    connector: Box<dyn Connector>,
    connection: Option<Box<dyn SyslogConnection>>,
    messages: Receiver<String>,
    shutdown: Receiver<()>,
    /// Message that failed to send and is retried first
    pending: Option<String>,
    pending_attempts: u32,
    backoff: Backoff,
    rng: StdRng,
    metrics: Arc<WriterMetrics>,
}

impl SendLoop {
    fn run(mut self) {
        loop {
            if self.pending.is_none() {
                select! {
                    recv(self.messages) -> message => match message {
                        Ok(message) => self.pending = Some(message),
                        Err(_) => return,
                    },
                    recv(self.shutdown) -> _ => return self.finish(false),
                }
            }

            if self.send_buffered() {
                self.backoff.reset();
                // Refresh a possibly stale binding after every healthy cycle
                self.reconnect();
            } else {
                let delay = self.backoff.next_delay(&mut self.rng);
                match self.shutdown.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return self.finish(true),
                }
                self.reconnect();
            }
        }
    }

    /// Final bounded attempt at whatever is still buffered at shutdown
    ///
    /// Producers are gone by now, so the channel only shrinks. Anything that
    /// still cannot be written is counted as dropped.
    fn finish(&mut self, last_write_failed: bool) {
        if self.pending.is_none() && self.messages.is_empty() {
            return;
        }

        if last_write_failed {
            self.reconnect();
        }
        for _ in 0..MAX_SEND_ATTEMPTS {
            if self.send_buffered() {
                return;
            }
            self.reconnect();
        }

        let lost = self.pending.take().map_or(0, |_| 1) + self.messages.try_iter().count();
        if lost > 0 {
            self.metrics.record_dropped_many(lost as u64);
            diagnostics::warn(
                COMPONENT,
                format!("{} buffered messages lost at shutdown", lost),
            );
        }
    }

    /// Send messages until the buffer runs empty (`true`) or a write fails (`false`)
    fn send_buffered(&mut self) -> bool {
        loop {
            let message = match self.pending.take() {
                Some(message) => message,
                None => match self.messages.try_recv() {
                    Ok(message) => message,
                    Err(_) => return true,
                },
            };

            let result = match self.connection.as_mut() {
                Some(conn) => conn.write_message(message.as_bytes()),
                None => Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no syslog connection",
                )),
            };

            match result {
                Ok(()) => {
                    self.pending_attempts = 0;
                    self.metrics.record_delivered(1);
                }
                Err(e) => {
                    self.metrics.record_failure();
                    self.pending_attempts += 1;
                    if self.backoff.step() == 0 {
                        diagnostics::warn(COMPONENT, format!("write failed, backing off: {}", e));
                    }
                    if self.pending_attempts >= MAX_SEND_ATTEMPTS {
                        self.pending_attempts = 0;
                        diagnostics::drop_with_alert(
                            COMPONENT,
                            &self.metrics,
                            "message could not be delivered",
                        );
                    } else {
                        self.pending = Some(message);
                    }
                    return false;
                }
            }
        }
    }

    fn reconnect(&mut self) {
        let was_connected = self.connection.take().is_some();

        match self.connector.connect() {
            Ok(conn) => {
                self.connection = Some(conn);
                self.metrics.record_reconnect();
            }
            Err(e) => {
                if was_connected {
                    diagnostics::warn(
                        COMPONENT,
                        format!("could not reconnect to {}: {}", self.connector.describe(), e),
                    );
                }
            }
        }
    }
}

/// Writer that sends events to a syslog daemon
///
/// # Example
///
/// ```no_run
/// use rust_logmanager::writers::{Network, SyslogConfig, SyslogTarget, SyslogWriter};
/// use rust_logmanager::LogLevel;
///
/// // Local daemon through /dev/log and friends
/// let local = SyslogWriter::new(SyslogTarget::Local).expect("no local syslog");
///
/// // Remote daemon over UDP, forwarding Info and above
/// let remote = SyslogWriter::with_config(
///     SyslogTarget::remote(Network::Udp, "logs.internal:514"),
///     SyslogConfig::new().with_min_level(LogLevel::Info),
/// )
/// .expect("Failed to connect to syslog");
/// ```
pub struct SyslogWriter {
    sender: RwLock<Option<Sender<String>>>,
    shutdown: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    hostname: &'static str,
    min_level: RwLock<LogLevel>,
    metrics: Arc<WriterMetrics>,
}

impl SyslogWriter {
    /// Connect to `target` with the default configuration
    ///
    /// # Errors
    ///
    /// Returns error if no connection can be established
    pub fn new(target: SyslogTarget) -> Result<Self> {
        Self::with_config(target, SyslogConfig::default())
    }

    pub fn with_config(target: SyslogTarget, config: SyslogConfig) -> Result<Self> {
        Self::with_connector(target, config)
    }

    /// Use a custom connector, e.g. a different transport
    ///
    /// The first connection is made before this returns.
    pub fn with_connector<C: Connector>(mut connector: C, config: SyslogConfig) -> Result<Self> {
        if config.buffer_size == 0 {
            return Err(LoggerError::config(COMPONENT, "buffer_size must be at least 1"));
        }

        let connection = connector
            .connect()
            .map_err(|e| LoggerError::connect(connector.describe(), e.to_string()))?;

        let hostname = host_field(&connector);
        let metrics = Arc::new(WriterMetrics::new());
        let (sender, messages) = bounded(config.buffer_size);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let send_loop = SendLoop {
            connector: Box::new(connector),
            connection: Some(connection),
            messages,
            shutdown: shutdown_rx,
            pending: None,
            pending_attempts: 0,
            backoff: Backoff::new(),
            rng: StdRng::from_entropy(),
            metrics: Arc::clone(&metrics),
        };
        let handle = worker::spawn("logmanager-syslog", move || send_loop.run())?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(handle)),
            hostname,
            min_level: RwLock::new(config.min_level),
            metrics,
        })
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Stop the worker
    ///
    /// Buffered messages get one last bounded delivery attempt. Whatever
    /// cannot be written is counted in [`WriterMetrics::dropped_count`].
    pub fn close(&self) -> bool {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Like [`close`](Self::close) with a custom timeout
    pub fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.sender.write().take());
        drop(self.shutdown.lock().take());

        match self.worker.lock().take() {
            Some(handle) => worker::join_with_timeout(handle, timeout, COMPONENT),
            None => true,
        }
    }
}

impl Writer for SyslogWriter {
    fn build_theme(&self, _module: &str) -> ColorTheme {
        ColorTheme::default()
    }

    fn log(&self, event: &LogEvent, _theme: &ColorTheme) {
        if event.level < self.min_level() {
            return;
        }

        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return;
        };

        let message = format_message(event, self.hostname, std::process::id());
        match sender.try_send(message) {
            Ok(()) => {
                self.metrics.record_accepted();
            }
            Err(TrySendError::Full(_)) => {
                diagnostics::drop_with_alert(
                    COMPONENT,
                    &self.metrics,
                    "too many messages buffered, syslog losing messages",
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        self.close();
    }
}
