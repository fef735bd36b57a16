use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::error::SpawnError;
use crate::pipeline::PublisherArgs;
use crate::session::Role;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Builds the command that runs the publishing pipeline.
pub trait Launcher: Send + Sync {
    fn command(&self, args: &PublisherArgs) -> Command;
}

/// Runs the publisher executable with the composed argv.
pub struct ExecutableLauncher {
    program: PathBuf,
}

impl ExecutableLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ExecutableLauncher {
            program: program.into(),
        }
    }
}

impl Launcher for ExecutableLauncher {
    fn command(&self, args: &PublisherArgs) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args.argv());
        command
    }
}

#[derive(Debug)]
pub enum PublisherEvent {
    /// A spawned generation terminated, for whatever reason.
    Exited {
        role: Role,
        generation: u64,
        code: Option<i32>,
    },
    /// The respawn delay for a crashed generation elapsed.
    Respawn { role: Role, generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Stopped,
    Running,
    Crashed,
    StoppedByRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// The exit was asked for.
    Clean,
    /// The process died on its own and should be respawned.
    Crashed,
    /// The exit belongs to a generation this handle no longer tracks.
    Stale,
}

struct ProcessRef {
    pid: Option<u32>,
    stop_tx: oneshot::Sender<()>,
}

/// One supervised publisher process for a role.
pub struct PublisherHandle {
    args: PublisherArgs,
    display_label: String,
    generation: u64,
    process: Option<ProcessRef>,
    stop_requested: bool,
    state: PublisherState,
}

impl PublisherHandle {
    pub fn new(args: PublisherArgs, display_label: impl Into<String>) -> Self {
        PublisherHandle {
            args,
            display_label: display_label.into(),
            generation: 0,
            process: None,
            stop_requested: false,
            state: PublisherState::Stopped,
        }
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|process| process.pid)
    }

    /// Spawns a new generation, stopping the current one first if it is live.
    pub fn start(
        &mut self,
        launcher: &dyn Launcher,
        events: &mpsc::UnboundedSender<PublisherEvent>,
        stop_grace: Duration,
    ) -> Result<(), SpawnError> {
        let role = self.args.role;
        if self.stop() {
            log::info!("Stopping existing {role} cam process");
        }

        let mut command = launcher.command(&self.args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = PublisherState::Stopped;
                return Err(SpawnError { role, source });
            }
        };

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, role, false);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, role, true);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(watch(
            child,
            stop_rx,
            role,
            generation,
            events.clone(),
            stop_grace,
        ));

        log::info!(
            "Started {role} cam process (pid {}, generation {generation}, label {:?})",
            pid.map_or_else(|| "?".to_owned(), |pid| pid.to_string()),
            self.display_label
        );

        self.generation = generation;
        self.stop_requested = false;
        self.process = Some(ProcessRef { pid, stop_tx });
        self.state = PublisherState::Running;
        Ok(())
    }

    /// Flags the stop as intentional and signals the process. Returns whether a
    /// process was live.
    pub fn stop(&mut self) -> bool {
        match self.process.take() {
            Some(process) => {
                self.stop_requested = true;
                self.state = PublisherState::StoppedByRequest;
                // the watcher may already be gone if the process just exited
                let _ = process.stop_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Termination observer. Must be called with the session lock held so the
    /// flag check cannot interleave with `stop`.
    pub fn on_exit(&mut self, generation: u64, code: Option<i32>) -> ExitDisposition {
        let role = self.args.role;
        if generation != self.generation {
            log::debug!("Ignoring exit of superseded {role} generation {generation}");
            return ExitDisposition::Stale;
        }

        if self.stop_requested {
            self.stop_requested = false;
            log::info!("Process for {role} cam exited with code {code:?}");
            return ExitDisposition::Clean;
        }

        log::error!("Process for {role} cam closed unexpectedly (code {code:?})");
        self.process = None;
        self.state = PublisherState::Crashed;
        ExitDisposition::Crashed
    }

    /// Whether a respawn scheduled for `generation` still applies.
    pub fn awaiting_respawn(&self, generation: u64) -> bool {
        self.state() == PublisherState::Crashed && self.generation() == generation
    }
}

async fn watch(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    role: Role,
    generation: u64,
    events: mpsc::UnboundedSender<PublisherEvent>,
    stop_grace: Duration,
) {
    // a dropped sender counts as a stop request
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => terminate(&mut child, role, stop_grace).await,
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            log::error!("Failed to wait for {role} cam process: {err}");
            None
        }
    };

    if events
        .send(PublisherEvent::Exited {
            role,
            generation,
            code,
        })
        .is_err()
    {
        log::debug!("Supervisor gone, dropping exit of {role} generation {generation}");
    }
}

/// SIGTERM to the process group, SIGKILL once `grace` runs out.
async fn terminate(child: &mut Child, role: Role, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        return child.wait().await;
    };

    // the child leads its own process group, so -pid reaches the whole pipeline
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGTERM) };
    if rc == 0 {
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        log::warn!("{role} cam process {pid} ignored SIGTERM, killing");
    }

    child.kill().await?;
    child.wait().await
}

fn forward_output<R>(reader: R, role: Role, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(reader).lines());
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) if is_stderr => log::warn!("[{role}]: {line}"),
                Ok(line) => log::info!("[{role}]: {line}"),
                Err(err) => {
                    log::debug!("[{role}]: output closed: {err}");
                    break;
                }
            }
        }
    });
}
