//! Periodic SMTP reachability and authentication probe.
//!
//! The crate is split the same way the daemon runs: [`config`] turns raw
//! inputs into a [`ProbeConfig`], [`probe`] performs one connect/close cycle
//! against a [`Transport`] and renders the result line, and [`schedule`]
//! drives the probe once or at a fixed rate.

pub mod config;
mod connection;
mod input;
pub mod probe;
pub mod schedule;

pub use config::{ConfigError, ProbeConfig, RawConfig};
pub use connection::SmtpTransport;
pub use input::ProbeFile;
pub use probe::{Outcome, Probe, ProbeResult, Transport, TransportError};
pub use schedule::{Clock, ScheduleError, Scheduler, Shutdown, SystemClock, Task};

/// Receives every byte exchanged with the mail server.
pub trait Logger {
    fn client(&mut self, data: &[u8]);
    fn server(&mut self, data: &[u8]);
    fn disable(&mut self);
    fn enable(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("There was an error on the mail server side.")]
    Protocol,
    #[error("Can't reach the server, try again later.")]
    ServerUnreachable,
    #[error("Server abruptly ended the connection.")]
    ServerUnavailable,
    #[error("The server address you entered probably is not an SMTP one.")]
    InvalidServer,
    #[error("Disconnected due to a network issues.")]
    Network,
    #[error("Failed to resolve hostname.")]
    Dns,
    #[error("The credentials you entered were invalidated by the server.")]
    InvalidCred,
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
    #[error("No such provider: {0}")]
    ProviderUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Credentials {
        Credentials { username, password }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Support {
    Supported,
    NotSupported,
    Unknown,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ServerMeta {
    pub(crate) tls: Support,
    pub(crate) auth_plain: Support,
    pub(crate) auth_login: Support,
}

impl ServerMeta {
    pub(crate) fn new() -> ServerMeta {
        ServerMeta {
            tls: Support::Unknown,
            auth_plain: Support::Unknown,
            auth_login: Support::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Server {
    address: String,
    port: u16,
    pub(crate) meta: ServerMeta,
}

impl Server {
    pub fn new(address: String, port: u16) -> Server {
        Server {
            address,
            port,
            meta: ServerMeta::new(),
        }
    }
    pub fn address(&self) -> &str {
        &self.address
    }
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Transport-level settings, shared by every connection the probe opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    timeout: Option<u64>,
    starttls: bool,
    name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            timeout: None,
            starttls: false,
            name: "localhost".to_string(),
        }
    }
    pub fn timeout(&mut self, seconds: u64) -> &mut Self {
        self.timeout = Some(seconds);
        self
    }
    pub fn starttls(&mut self, enabled: bool) -> &mut Self {
        self.starttls = enabled;
        self
    }
    pub fn name(&mut self, name: String) -> &mut Self {
        self.name = name;
        self
    }
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout
    }
    pub fn uses_starttls(&self) -> bool {
        self.starttls
    }
}
