//! Test doubles shared by the supervisor and http tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::RegistrationError;
use crate::pipeline::PublisherArgs;
use crate::publisher::Launcher;
use crate::registration::Registrar;
use crate::session::Role;
use crate::supervisor::{Supervisor, SupervisorSettings};

/// Records every launch and runs either `sh -c <script>` or a fixed program.
pub struct RecordingLauncher {
    program: String,
    script: Option<String>,
    launches: Mutex<Vec<PublisherArgs>>,
}

impl RecordingLauncher {
    pub fn sh(script: &str) -> Self {
        RecordingLauncher {
            program: "sh".to_owned(),
            script: Some(script.to_owned()),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn program(program: &str) -> Self {
        RecordingLauncher {
            program: program.to_owned(),
            script: None,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<PublisherArgs> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launches_for(&self, role: Role) -> Vec<PublisherArgs> {
        self.launches()
            .into_iter()
            .filter(|args| args.role == role)
            .collect()
    }
}

impl Launcher for RecordingLauncher {
    fn command(&self, args: &PublisherArgs) -> Command {
        self.launches.lock().unwrap().push(args.clone());
        let mut command = Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg("-c").arg(script);
        }
        command
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrarCall {
    Register { room: String, role: Role, label: String },
    Deregister { room: String, role: Role },
}

/// In-memory `Registrar` that records calls and can fail or stall on demand.
#[derive(Default)]
pub struct FakeRegistrar {
    calls: Mutex<Vec<RegistrarCall>>,
    fail_register: Option<Role>,
    fail_deregister: bool,
    delay: Duration,
}

impl FakeRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_register(role: Role) -> Self {
        FakeRegistrar {
            fail_register: Some(role),
            ..Self::default()
        }
    }

    pub fn failing_deregister() -> Self {
        FakeRegistrar {
            fail_deregister: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        FakeRegistrar {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RegistrarCall> {
        self.calls.lock().unwrap().clone()
    }

    fn rejected(&self, url: String) -> RegistrationError {
        RegistrationError::Rejected {
            url,
            status: reqwest::StatusCode::BAD_GATEWAY,
        }
    }
}

#[async_trait]
impl Registrar for FakeRegistrar {
    async fn register(
        &self,
        base_url: &str,
        room: &str,
        role: Role,
        display_label: &str,
    ) -> Result<(), RegistrationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(RegistrarCall::Register {
            room: room.to_owned(),
            role,
            label: display_label.to_owned(),
        });
        if self.fail_register == Some(role) {
            return Err(self.rejected(format!("{base_url}/create")));
        }
        Ok(())
    }

    async fn deregister(
        &self,
        base_url: &str,
        room: &str,
        role: Role,
    ) -> Result<(), RegistrationError> {
        self.calls.lock().unwrap().push(RegistrarCall::Deregister {
            room: room.to_owned(),
            role,
        });
        if self.fail_deregister {
            return Err(self.rejected(format!("{base_url}/endpoint/{room}{role}")));
        }
        Ok(())
    }
}

pub fn settings(respawn_delay: Duration) -> SupervisorSettings {
    SupervisorSettings {
        board_device: "/dev/video0".to_owned(),
        player_device: "/dev/video1".to_owned(),
        respawn_delay,
        stop_grace: Duration::from_millis(500),
    }
}

pub fn supervisor(
    registrar: Arc<FakeRegistrar>,
    launcher: Arc<RecordingLauncher>,
    respawn_delay: Duration,
) -> Arc<Supervisor> {
    Supervisor::spawn(settings(respawn_delay), registrar, launcher)
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
