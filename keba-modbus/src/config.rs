use serde::Deserialize;
use std::time::Duration;

use crate::Error;

/// Where and how to reach a single charging station.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(alias = "address")]
    pub host: String,

    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Applied to every request/response round trip.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    // 255 addresses the station directly when it is a single installation
    #[serde(alias = "slave", alias = "slaveid", default = "default_unit")]
    pub unit: u8,

    /// Trace raw register words on every round trip.
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn new<H: Into<String>>(host: H) -> Self {
        Self {
            host: host.into(),
            port: default_modbus_port(),
            timeout: default_timeout(),
            unit: default_unit(),
            debug: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_unit(mut self, unit: u8) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::from("'host' not given"));
        }
        Ok(())
    }
}

pub(crate) fn default_modbus_port() -> u16 {
    502
}

pub(crate) fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

pub(crate) fn default_unit() -> u8 {
    255
}

#[test]
fn parse_minimal_config() {
    use serde_json::json;
    let config = serde_json::from_value::<Config>(json!({
        "host": "192.168.161.103"
    }))
    .unwrap();

    assert!(matches!(
        config,
        Config {
            ref host,
            port: 502,
            unit: 255,
            debug: false,
            ..
        } if host == "192.168.161.103"
    ));
    assert_eq!(config.timeout, Duration::from_secs(10));
}

#[test]
fn parse_full_config() {
    use serde_json::json;
    let config = serde_json::from_value::<Config>(json!({
        "address": "wallbox.local",
        "port": 5020,
        "timeout": "1500ms",
        "slaveid": 1,
        "debug": true,
    }))
    .unwrap();

    assert_eq!(
        config,
        Config::new("wallbox.local")
            .with_port(5020)
            .with_timeout(Duration::from_millis(1500))
            .with_unit(1)
            .with_debug(true)
    );
}

#[test]
fn missing_host_is_rejected_by_serde() {
    use serde_json::json;
    assert!(serde_json::from_value::<Config>(json!({ "port": 502 })).is_err());
}

#[test]
fn empty_host_fails_validation() {
    for host in ["", "   "] {
        assert!(matches!(
            Config::new(host).validate(),
            Err(Error::Configuration(_))
        ));
    }
    assert!(Config::new("10.0.0.2").validate().is_ok());
}
