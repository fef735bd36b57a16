use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use crate::error::{RegistrationError, SupervisorError};
use crate::pipeline::{endpoint_url, PublisherArgs};
use crate::publisher::{ExitDisposition, Launcher, PublisherEvent, PublisherHandle};
use crate::registration::Registrar;
use crate::session::{Phase, Role, Session};

pub struct SupervisorSettings {
    pub board_device: String,
    pub player_device: String,
    pub respawn_delay: Duration,
    pub stop_grace: Duration,
}

impl SupervisorSettings {
    fn device(&self, role: Role) -> &str {
        match role {
            Role::Board => &self.board_device,
            Role::Player => &self.player_device,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub endpoint_base_url: String,
    pub room: String,
    pub board_label: String,
    pub player_label: String,
}

impl StartRequest {
    fn label(&self, role: Role) -> &str {
        match role {
            Role::Board => &self.board_label,
            Role::Player => &self.player_label,
        }
    }
}

/// Owns the single streaming session. Keeps remote endpoint registration and
/// local publisher processes in step, and respawns publishers that die on
/// their own.
pub struct Supervisor {
    session: Arc<RwLock<Session>>,
    registrar: Arc<dyn Registrar>,
    launcher: Arc<dyn Launcher>,
    settings: SupervisorSettings,
    events_tx: mpsc::UnboundedSender<PublisherEvent>,
}

impl Supervisor {
    /// Builds the supervisor and starts its event loop on the current runtime.
    pub fn spawn(
        settings: SupervisorSettings,
        registrar: Arc<dyn Registrar>,
        launcher: Arc<dyn Launcher>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Supervisor {
            session: Arc::new(RwLock::new(Session::new())),
            registrar,
            launcher,
            settings,
            events_tx,
        });

        tokio::spawn(run_events(Arc::downgrade(&supervisor), events_rx));
        supervisor
    }

    pub async fn start(&self, request: StartRequest) -> Result<(), SupervisorError> {
        let base_url = request.endpoint_base_url.as_str();
        let room = request.room.as_str();

        self.session.write().await.begin_start(base_url, room)?;
        log::info!("Starting streaming to {base_url} for room {room}");

        if let Err(err) = self.register_all(&request).await {
            log::error!("Aborting start of room {room}: {err}");
            self.session.write().await.clear();
            return Err(err.into());
        }

        let mut session = self.session.write().await;
        for role in Role::ALL {
            let args = PublisherArgs::new(
                role,
                self.settings.device(role),
                endpoint_url(base_url, room, role),
            );
            let handle = session
                .slot_mut(role)
                .insert(PublisherHandle::new(args, request.label(role)));
            if let Err(err) =
                handle.start(self.launcher.as_ref(), &self.events_tx, self.settings.stop_grace)
            {
                log::error!("{err}");
            }
        }
        session.activate();
        Ok(())
    }

    /// Registers board then player. If player fails, the board endpoint
    /// created by this attempt is removed again.
    async fn register_all(&self, request: &StartRequest) -> Result<(), RegistrationError> {
        let base_url = request.endpoint_base_url.as_str();
        let room = request.room.as_str();

        let mut registered = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            if let Err(err) = self
                .registrar
                .register(base_url, room, role, request.label(role))
                .await
            {
                for done in registered {
                    if let Err(rollback) = self.registrar.deregister(base_url, room, done).await {
                        log::error!("Failed to roll back {done} endpoint: {rollback}");
                    }
                }
                return Err(err);
            }
            registered.push(role);
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (base_url, room) = self.session.write().await.begin_stop()?;

        for role in Role::ALL {
            {
                let mut session = self.session.write().await;
                match session.slot_mut(role).as_mut() {
                    Some(handle) if handle.is_running() => {
                        log::info!("Stopping {role} cam process (pid {:?})", handle.pid());
                        handle.stop();
                    }
                    _ => log::warn!("No {role} cam process"),
                }
            }

            if let Err(err) = self.registrar.deregister(&base_url, &room, role).await {
                log::error!("Failed to deregister {role} endpoint of room {room}: {err}");
            }
        }

        self.session.write().await.clear();
        log::info!("Stopped streaming room {room}");
        Ok(())
    }

    pub async fn status(&self) -> Option<String> {
        self.session.read().await.active_room().map(str::to_owned)
    }

    /// Tears down an active session on service shutdown.
    pub async fn shutdown(&self) {
        {
            let session = self.session.read().await;
            if session.phase() != Phase::Active {
                return;
            }
            let running = Role::ALL
                .iter()
                .filter(|&&role| session.slot(role).is_some_and(PublisherHandle::is_running))
                .count();
            log::info!(
                "Stopping room {} on {} ({running} publishers running)",
                session.active_room().unwrap_or_default(),
                session.signalling_base_url().unwrap_or_default()
            );
        }
        if let Err(err) = self.stop().await {
            log::error!("Failed to stop session on shutdown: {err}");
        }
    }

    async fn handle_event(&self, event: PublisherEvent) {
        match event {
            PublisherEvent::Exited {
                role,
                generation,
                code,
            } => {
                let mut session = self.session.write().await;
                let disposition = match session.slot_mut(role).as_mut() {
                    Some(handle) => handle.on_exit(generation, code),
                    None => {
                        log::info!("Process for {role} cam exited with code {code:?}");
                        ExitDisposition::Stale
                    }
                };

                if disposition == ExitDisposition::Crashed {
                    self.schedule_respawn(role, generation);
                }
            }
            PublisherEvent::Respawn { role, generation } => {
                let mut session = self.session.write().await;
                if session.phase() != Phase::Active {
                    log::debug!("Dropping {role} respawn, session is {}", session.phase());
                    return;
                }
                let Some(handle) = session.slot_mut(role).as_mut() else {
                    return;
                };
                if !handle.awaiting_respawn(generation) {
                    return;
                }

                log::info!(
                    "Restarting {role} cam process (crashed generation {})",
                    handle.generation()
                );
                if let Err(err) =
                    handle.start(self.launcher.as_ref(), &self.events_tx, self.settings.stop_grace)
                {
                    log::error!("{err}");
                }
            }
        }
    }

    fn schedule_respawn(&self, role: Role, generation: u64) {
        let events_tx = self.events_tx.clone();
        let delay = self.settings.respawn_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events_tx.send(PublisherEvent::Respawn { role, generation });
        });
    }

    #[cfg(test)]
    async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&*self.session.read().await)
    }
}

async fn run_events(supervisor: Weak<Supervisor>, mut events_rx: mpsc::UnboundedReceiver<PublisherEvent>) {
    while let Some(event) = events_rx.recv().await {
        let Some(supervisor) = supervisor.upgrade() else {
            break;
        };
        supervisor.handle_event(event).await;
    }
}
