use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::supervisor::SupervisorSettings;

const BIND_ADDR: &str = "CAMSTREAM_BIND_ADDR";
const PUBLISHER_BIN: &str = "CAMSTREAM_PUBLISHER_BIN";
const BOARD_DEVICE: &str = "CAMSTREAM_BOARD_DEVICE";
const PLAYER_DEVICE: &str = "CAMSTREAM_PLAYER_DEVICE";
const RESPAWN_DELAY_MS: &str = "CAMSTREAM_RESPAWN_DELAY_MS";
const STOP_GRACE_MS: &str = "CAMSTREAM_STOP_GRACE_MS";
const REGISTRATION_TIMEOUT_SECS: &str = "CAMSTREAM_REGISTRATION_TIMEOUT_SECS";
const WIFI_SUDO: &str = "CAMSTREAM_WIFI_SUDO";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub publisher_bin: PathBuf,
    pub board_device: String,
    pub player_device: String,
    pub respawn_delay: Duration,
    pub stop_grace: Duration,
    pub registration_timeout: Duration,
    pub wifi_sudo: bool,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Config {
            bind_addr: parse(BIND_ADDR, lookup(BIND_ADDR), "0.0.0.0:8070".parse().ok())?,
            publisher_bin: PathBuf::from(string(PUBLISHER_BIN, "./simple-whip-client/whip-client")),
            board_device: string(BOARD_DEVICE, "/dev/video0"),
            player_device: string(PLAYER_DEVICE, "/dev/video1"),
            respawn_delay: Duration::from_millis(parse(
                RESPAWN_DELAY_MS,
                lookup(RESPAWN_DELAY_MS),
                Some(3000),
            )?),
            stop_grace: Duration::from_millis(parse(STOP_GRACE_MS, lookup(STOP_GRACE_MS), Some(5000))?),
            registration_timeout: Duration::from_secs(parse(
                REGISTRATION_TIMEOUT_SECS,
                lookup(REGISTRATION_TIMEOUT_SECS),
                Some(10),
            )?),
            wifi_sudo: parse(WIFI_SUDO, lookup(WIFI_SUDO), Some(true))?,
        })
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            board_device: self.board_device.clone(),
            player_device: self.player_device.clone(),
            respawn_delay: self.respawn_delay,
            stop_grace: self.stop_grace,
        }
    }
}

fn parse<T>(key: &'static str, value: Option<String>, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
        None => default.ok_or_else(|| ConfigError::Invalid {
            key,
            value: String::new(),
            reason: "missing".to_owned(),
        }),
    }
}
