use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::session::{Phase, Role};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("already streaming room {room}")]
    AlreadyStreaming { room: String },

    #[error("not streaming")]
    NotStreaming,

    #[error("session is {phase}")]
    Busy { phase: Phase },

    #[error("endpoint registration failed: {0}")]
    Registration(#[from] RegistrationError),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("failed to build signalling client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}")]
    Rejected {
        url: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Debug, Error)]
#[error("failed to spawn {role} publisher: {source}")]
pub struct SpawnError {
    pub role: Role,
    #[source]
    pub source: io::Error,
}

/// Failure of a host tool invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum WifiScanError {
    #[error("listing wireless interfaces: {0}")]
    Interfaces(#[source] CommandError),

    #[error("no wireless interfaces found")]
    NoInterfaces,

    #[error("scanning {interface}: {source}")]
    Scan {
        interface: String,
        #[source]
        source: CommandError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
