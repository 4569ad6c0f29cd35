//! Wiring of one simulation instance
//!
//! Builds the supervisor and broker, optionally connects to a peer, starts
//! every in-process unit under supervision and waits for the supervisor's
//! verdict.

use std::time::Duration;

use eyre::{Context, Result};
use pidregistry::PidRegistry;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{BROKER_TAG, Broker};
use crate::config::Config;
use crate::message::{Message, WorkerPort, WorkerRole};
use crate::net::{self, SessionRole};
use crate::supervisor::{
    Enrolment, Supervisor, SupervisorHandle, SupervisorOutcome, SupervisorReport,
};

/// How long to wait for units to wind down after the supervisor returns
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Networking mode of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Standalone,
    /// Listen for the peer; protocol initiator
    Serve { port: u16 },
    /// Connect to the peer; protocol responder
    Connect { address: String, port: u16 },
}

impl Mode {
    pub fn role(&self) -> Option<SessionRole> {
        match self {
            Mode::Standalone => None,
            Mode::Serve { .. } => Some(SessionRole::Initiator),
            Mode::Connect { .. } => Some(SessionRole::Responder),
        }
    }
}

/// One simulation instance, ready to run
pub struct App {
    config: Config,
    mode: Mode,
    supervisor: Supervisor,
    broker: Broker,
}

impl App {
    pub fn new(config: Config, mode: Mode) -> Self {
        debug!(?mode, "App::new: called");
        let registry = PidRegistry::new(config.registry.path());
        if config.registry.reset_on_start
            && let Err(e) = registry.reset()
        {
            warn!(error = %e, "Failed to reset pid registry");
        }

        let supervisor = Supervisor::new(config.supervisor.clone()).with_pid_registry(registry);
        let broker = Broker::new(config.broker.clone()).with_supervisor(supervisor.handle());
        Self {
            config,
            mode,
            supervisor,
            broker,
        }
    }

    /// Handle for control requests, usable before and during [`App::run`]
    pub fn supervisor_handle(&self) -> SupervisorHandle {
        self.supervisor.handle()
    }

    /// Connect a worker to the broker before the run starts
    pub fn attach(&mut self, role: WorkerRole) -> WorkerPort {
        self.broker.attach(role)
    }

    async fn connect_peer(&self) -> Result<Option<TcpStream>> {
        match &self.mode {
            Mode::Standalone => Ok(None),
            Mode::Serve { port } => {
                let listener = net::listen(&format!("0.0.0.0:{}", port))
                    .await
                    .context("Failed to listen for peer")?;
                let stream = net::accept_one(&listener).await.context("Failed to accept peer")?;
                Ok(Some(stream))
            }
            Mode::Connect { address, port } => {
                let addr = format!("{}:{}", address, port);
                let stream = net::connect_with_retry(&addr, self.config.network.connect_retry(), None)
                    .await
                    .context(format!("Failed to connect to {}", addr))?;
                Ok(Some(stream))
            }
        }
    }

    /// Run until the supervisor decides; the report carries the exit code
    pub async fn run(self) -> Result<SupervisorReport> {
        info!(mode = ?self.mode, "Starting instance");
        let handle = self.supervisor.handle();

        let stream = tokio::select! {
            stream = self.connect_peer() => stream?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted while waiting for peer");
                return Ok(SupervisorReport {
                    outcome: SupervisorOutcome::Interrupted,
                    cycles: 0,
                    shutdowns: 0,
                    killed: Vec::new(),
                });
            }
        };

        let App {
            config,
            mode,
            supervisor,
            mut broker,
        } = self;

        let mut session = None;
        if let (Some(stream), Some(role)) = (stream, mode.role()) {
            let (bridge, link) = net::bridge(role, broker.state().window(), config.network.event_buffer);
            broker = broker.with_network(bridge);
            session = Some(
                net::spawn_session(stream, link, &config.network, Some(&handle))
                    .await
                    .context("Failed to start network session")?,
            );
        }

        let Enrolment {
            responder,
            stop,
            pending,
        } = handle.enrol(BROKER_TAG);
        let broker_task = tokio::spawn(broker.with_heartbeat(responder, stop).run());
        handle.register(pending.task(broker_task.abort_handle())).await?;

        let session_task = session.map(|session| {
            let handle = handle.clone();
            tokio::spawn(async move { session.finish(Some(&handle)).await })
        });

        let report = supervisor.run().await;

        match tokio::time::timeout(SETTLE_TIMEOUT, broker_task).await {
            Ok(Ok(state)) => debug!(drone = ?state.drone(), "App::run: broker settled"),
            Ok(Err(e)) => debug!(error = %e, "App::run: broker task ended abnormally"),
            Err(_) => warn!("Broker did not settle"),
        }
        if let Some(task) = session_task {
            match tokio::time::timeout(SETTLE_TIMEOUT, task).await {
                Ok(Ok(Ok(end))) => debug!(?end, "App::run: session settled"),
                Ok(Ok(Err(e))) => warn!(error = %e, "Session ended with an error"),
                Ok(Err(e)) => debug!(error = %e, "App::run: session task ended abnormally"),
                Err(_) => warn!("Session did not settle"),
            }
        }

        Ok(report)
    }
}

/// Feed operator keys to the broker as INPUT messages
///
/// The first character of each non-empty line is one key press. The pump is
/// a supervised unit; at end of input it deregisters and exits.
pub async fn spawn_input_pump<R>(reader: R, mut port: WorkerPort, handle: &SupervisorHandle) -> Result<JoinHandle<()>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    debug!("spawn_input_pump: called");
    let tag = WorkerRole::Input.tag();
    let Enrolment {
        mut responder,
        mut stop,
        pending,
    } = handle.enrol(tag);
    let supervisor = handle.clone();

    let task = tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some(key) = line.trim().chars().next() else {
                            continue;
                        };
                        if let Err(e) = port.send(&Message::Input(key)).await {
                            warn!(error = %e, "Broker gone, input pump stopping");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        if let Err(e) = supervisor.deregister(tag).await {
                            debug!(error = %e, "spawn_input_pump: supervisor gone");
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        if let Err(e) = supervisor.deregister(tag).await {
                            debug!(error = %e, "spawn_input_pump: supervisor gone");
                        }
                        break;
                    }
                },
                ping = responder.next_ping() => match ping {
                    Some(ping) => {
                        if let Err(e) = responder.respond(ping).await {
                            debug!(error = %e, "spawn_input_pump: supervisor gone");
                        }
                    }
                    None => break,
                },
                _ = stop.recv() => {
                    debug!("spawn_input_pump: stop requested");
                    break;
                }
            }
        }
    });

    handle.register(pending.task(task.abort_handle())).await?;
    Ok(task)
}
