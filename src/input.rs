use serde_derive::Deserialize;
use std::fs;

use crate::{ConfigError, RawConfig};

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProbeServer {
    host: Option<String>,
    port: Option<i64>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProbeUser {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    interval: Option<i64>,
    once: Option<bool>,
    timeout: Option<i64>,
    starttls: Option<bool>,
    logfile: Option<String>,
}

/// The optional TOML configuration file.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProbeFile {
    server: Option<ProbeServer>,
    user: Option<ProbeUser>,
    config: Option<ProbeSettings>,
}

impl ProbeFile {
    pub fn parse(text: &str) -> Result<ProbeFile, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::File(e.to_string()))
    }

    pub fn load(path: &str) -> Result<ProbeFile, ConfigError> {
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::File(format!("{}: {}", path, e)))?;
        ProbeFile::parse(&text)
    }

    /// Flattens the file into raw values; numbers are validated later by the resolver.
    pub fn destruct(self) -> RawConfig {
        let server = self.server.unwrap_or_default();
        let user = self.user.unwrap_or_default();
        let settings = self.config.unwrap_or_default();

        RawConfig {
            host: server.host,
            port: server.port.map(|p| p.to_string()),
            user: user.username,
            password: user.password,
            interval: settings.interval.map(|i| i.to_string()),
            once: settings.once.unwrap_or(false),
            timeout: settings.timeout.map(|t| t.to_string()),
            starttls: settings.starttls.unwrap_or(false),
            logfile: settings.logfile,
        }
    }
}
