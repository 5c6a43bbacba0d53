//! Configuration resolver.
//!
//! Raw values arrive as strings (from the command line or the TOML file) and
//! are validated here, so a [`ProbeConfig`] that exists is always usable.

use std::fmt;
use std::time::Duration;

use crate::Config;

pub const DEFAULT_INTERVAL: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    MissingField(&'static str),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("failed to parse arguments: {0}")]
    ParseFailure(String),
    #[error("failed to read configuration file: {0}")]
    File(String),
}

impl ConfigError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::MissingField(_))
    }
    pub fn is_malformed(&self) -> bool {
        !self.is_missing()
    }
}

/// Unvalidated key/value inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub interval: Option<String>,
    pub once: bool,
    pub timeout: Option<String>,
    pub starttls: bool,
    pub logfile: Option<String>,
}

impl RawConfig {
    /// Fills every unset value from `fallback`.
    pub fn merge(self, fallback: RawConfig) -> RawConfig {
        RawConfig {
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            user: self.user.or(fallback.user),
            password: self.password.or(fallback.password),
            interval: self.interval.or(fallback.interval),
            once: self.once || fallback.once,
            timeout: self.timeout.or(fallback.timeout),
            starttls: self.starttls || fallback.starttls,
            logfile: self.logfile.or(fallback.logfile),
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField(name)),
    }
}

fn positive(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|v| *v > 0)
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    interval: u64,
    run_once: bool,
}

impl ProbeConfig {
    pub fn resolve(raw: &RawConfig) -> Result<ProbeConfig, ConfigError> {
        let host = required(&raw.host, "host")?;
        let port = required(&raw.port, "port")?;
        let user = required(&raw.user, "user")?;
        let password = required(&raw.password, "pwd")?;

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?;

        let interval = match raw.interval.as_deref() {
            Some(i) => positive(i).ok_or_else(|| ConfigError::InvalidInterval(i.to_string()))?,
            None => DEFAULT_INTERVAL,
        };

        Ok(ProbeConfig {
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            interval,
            run_once: raw.once,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn user(&self) -> &str {
        &self.user
    }
    pub fn password(&self) -> &str {
        &self.password
    }
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
    pub fn run_once(&self) -> bool {
        self.run_once
    }
}

impl fmt::Debug for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("interval", &self.interval)
            .field("run_once", &self.run_once)
            .finish()
    }
}

impl TryFrom<&RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: &RawConfig) -> Result<Self, Self::Error> {
        let mut config = Config::new();
        if let Some(value) = raw.timeout.as_deref() {
            let secs = positive(value).ok_or_else(|| ConfigError::InvalidTimeout(value.to_string()))?;
            config.timeout(secs);
        }
        config.starttls(raw.starttls);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            host: Some("mail.example.com".to_string()),
            port: Some("587".to_string()),
            user: Some("probe".to_string()),
            password: Some("secret".to_string()),
            ..RawConfig::default()
        }
    }

    #[test]
    fn resolves_defaults() {
        let config = ProbeConfig::resolve(&raw()).unwrap();
        assert_eq!(config.host(), "mail.example.com");
        assert_eq!(config.port(), 587);
        assert_eq!(config.interval(), Duration::from_secs(DEFAULT_INTERVAL));
        assert!(!config.run_once());
    }

    #[test]
    fn each_required_field_is_checked() {
        let cases: [(fn(&mut RawConfig), &str); 4] = [
            (|r: &mut RawConfig| r.host = None, "host"),
            (|r: &mut RawConfig| r.port = None, "port"),
            (|r: &mut RawConfig| r.user = None, "user"),
            (|r: &mut RawConfig| r.password = None, "pwd"),
        ];
        for (clear, name) in cases {
            let mut input = raw();
            clear(&mut input);
            let err = ProbeConfig::resolve(&input).unwrap_err();
            assert_eq!(err, ConfigError::MissingField(name));
            assert!(err.is_missing());
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut input = raw();
        input.user = Some(String::new());
        assert_eq!(
            ProbeConfig::resolve(&input),
            Err(ConfigError::MissingField("user"))
        );
    }

    #[test]
    fn rejects_bad_ports() {
        for port in ["abc", "0", "65536", "-25", " 25"] {
            let mut input = raw();
            input.port = Some(port.to_string());
            let err = ProbeConfig::resolve(&input).unwrap_err();
            assert_eq!(err, ConfigError::InvalidPort(port.to_string()));
            assert!(err.is_malformed());
        }
        let mut input = raw();
        input.port = Some("65535".to_string());
        assert_eq!(ProbeConfig::resolve(&input).unwrap().port(), 65535);
    }

    #[test]
    fn rejects_bad_intervals() {
        for interval in ["five", "0", "-1", "1.5"] {
            let mut input = raw();
            input.interval = Some(interval.to_string());
            assert_eq!(
                ProbeConfig::resolve(&input),
                Err(ConfigError::InvalidInterval(interval.to_string()))
            );
        }
    }

    #[test]
    fn missing_reported_before_malformed() {
        let mut input = raw();
        input.port = Some("nope".to_string());
        input.password = None;
        assert_eq!(
            ProbeConfig::resolve(&input),
            Err(ConfigError::MissingField("pwd"))
        );
    }

    #[test]
    fn explicit_interval_and_once() {
        let mut input = raw();
        input.interval = Some("5".to_string());
        input.once = true;
        let config = ProbeConfig::resolve(&input).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert!(config.run_once());
    }

    #[test]
    fn merge_prefers_primary_values() {
        let primary = RawConfig {
            host: Some("cli.example.com".to_string()),
            ..RawConfig::default()
        };
        let fallback = RawConfig {
            host: Some("file.example.com".to_string()),
            port: Some("25".to_string()),
            once: true,
            ..RawConfig::default()
        };
        let merged = primary.merge(fallback);
        assert_eq!(merged.host.as_deref(), Some("cli.example.com"));
        assert_eq!(merged.port.as_deref(), Some("25"));
        assert!(merged.once);
    }

    #[test]
    fn debug_hides_password() {
        let config = ProbeConfig::resolve(&raw()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("mail.example.com"));
    }

    #[test]
    fn transport_config_from_raw() {
        let mut input = raw();
        input.timeout = Some("10".to_string());
        input.starttls = true;
        let config = Config::try_from(&input).unwrap();
        assert_eq!(config.timeout_secs(), Some(10));
        assert!(config.uses_starttls());

        input.timeout = Some("soon".to_string());
        assert_eq!(
            Config::try_from(&input),
            Err(ConfigError::InvalidTimeout("soon".to_string()))
        );
    }
}
