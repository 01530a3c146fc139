use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Configuration for the `zoned` binary, read from a YAML file.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub interface: Option<Ipv4Addr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub default_ttl: Option<u32>,
    #[serde(default)]
    pub zones: Vec<ZoneSettings>,
}

/// One authoritative zone.  The serial and timers take the same
/// forms `Server::zone` accepts: `"now"` or a number for the serial,
/// seconds or a time-span string (`"2h"`, `"30m"`) for the timers.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct ZoneSettings {
    pub name: String,
    pub mname: String,
    pub rname: String,
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default = "default_refresh")]
    pub refresh: String,
    #[serde(default = "default_retry")]
    pub retry: String,
    #[serde(default = "default_expire")]
    pub expire: String,
    #[serde(default = "default_minimum")]
    pub minimum: String,
    /// Address served for `IN A` queries inside the zone.
    #[serde(default)]
    pub address: Option<Ipv4Addr>,
}

fn default_serial() -> String {
    "now".to_string()
}

fn default_refresh() -> String {
    "2h".to_string()
}

fn default_retry() -> String {
    "30m".to_string()
}

fn default_expire() -> String {
    "2w".to_string()
}

fn default_minimum() -> String {
    "10m".to_string()
}

impl Settings {
    /// # Errors
    ///
    /// If the file cannot be read or deserialised.
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }
}
