//! One connect/close cycle against the mail server, rendered as a result line.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Local, Timelike};
use log::{debug, warn};

use crate::{Error, ProbeConfig, Task};

/// Failure kinds a [`Transport`] can report. Only the authentication kind is
/// told apart; everything else is a messaging failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("messaging failure: {0}")]
    Messaging(String),
}

impl From<Error> for TransportError {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidCred => TransportError::Authentication(error.to_string()),
            other => TransportError::Messaging(other.to_string()),
        }
    }
}

/// Mail transport capability. The handle is long-lived; each probe opens and
/// closes its own connection through it.
pub trait Transport {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AuthFailure,
    ConnectFailure,
}

impl Outcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Success => "OK",
            Outcome::AuthFailure | Outcome::ConnectFailure => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub timestamp: DateTime<Local>,
    pub outcome: Outcome,
    pub message: String,
}

impl ProbeResult {
    fn new(timestamp: DateTime<Local>, outcome: Outcome, host: &str) -> ProbeResult {
        let message = match outcome {
            Outcome::Success => format!("Connection established - {}", host),
            Outcome::AuthFailure => "Authentication failed".to_string(),
            Outcome::ConnectFailure => "Unable to connect to server".to_string(),
        };
        ProbeResult {
            timestamp,
            outcome,
            message,
        }
    }
}

/// `yyyy-mm-dd hh:mm:ss.f`, with the fraction in milliseconds and trailing
/// zeros dropped (at least one digit is kept).
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    let millis = format!("{:03}", timestamp.nanosecond() / 1_000_000 % 1000);
    let fraction = millis.trim_end_matches('0');
    format!(
        "{}.{}",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        if fraction.is_empty() { "0" } else { fraction }
    )
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: [{}] {}",
            format_timestamp(&self.timestamp),
            self.outcome.tag(),
            self.message
        )
    }
}

pub struct Probe<T, W = io::Stdout>
where
    T: Transport,
    W: Write,
{
    host: String,
    port: u16,
    user: String,
    password: String,
    transport: T,
    sink: W,
}

impl<T: Transport> Probe<T, io::Stdout> {
    pub fn new(config: &ProbeConfig, transport: T) -> Probe<T, io::Stdout> {
        Probe::with_sink(config, transport, io::stdout())
    }
}

impl<T, W> Probe<T, W>
where
    T: Transport,
    W: Write,
{
    pub fn with_sink(config: &ProbeConfig, transport: T, sink: W) -> Probe<T, W> {
        Probe {
            host: config.host().to_string(),
            port: config.port(),
            user: config.user().to_string(),
            password: config.password().to_string(),
            transport,
            sink,
        }
    }

    fn attempt(&mut self) -> Result<(), TransportError> {
        self.transport
            .connect(&self.host, self.port, &self.user, &self.password)?;
        self.transport.close()
    }

    /// Runs one connect/close cycle and writes the result line to the sink.
    /// Transport failures are classified, never propagated.
    pub fn execute(&mut self) -> ProbeResult {
        let timestamp = Local::now();
        let outcome = match self.attempt() {
            Ok(()) => Outcome::Success,
            Err(TransportError::Authentication(reason)) => {
                debug!("authentication rejected by {}: {}", self.host, reason);
                Outcome::AuthFailure
            }
            Err(TransportError::Messaging(reason)) => {
                debug!("probe of {}:{} failed: {}", self.host, self.port, reason);
                Outcome::ConnectFailure
            }
        };
        let result = ProbeResult::new(timestamp, outcome, &self.host);
        if let Err(e) = writeln!(self.sink, "{}", result).and_then(|_| self.sink.flush()) {
            warn!("failed to write probe result: {}", e);
        }
        result
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }
}

impl<T, W> Task for Probe<T, W>
where
    T: Transport,
    W: Write,
{
    fn run(&mut self) {
        self.execute();
    }
}
