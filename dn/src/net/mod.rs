//! Peer synchronization over TCP
//!
//! Two instances negotiate a window size and then exchange drone positions
//! in strict command / data / acknowledgement cycles. The protocol logic
//! lives in the sans-io [`Handshake`] and [`SessionMachine`]; [`blocking`]
//! and [`nonblocking`] are the two ways of driving them over a socket.
//!
//! ```ignore
//! let (bridge, link) = net::bridge(SessionRole::Initiator, window, 64);
//! let stream = net::accept_one(&net::listen("0.0.0.0:5000").await?).await?;
//! let session = net::spawn_session(stream, link, &config, Some(&supervisor)).await?;
//! broker.with_network(bridge);
//! session.finish(Some(&supervisor)).await?;
//! ```

pub mod blocking;
mod buffer;
mod config;
mod connect;
pub mod coords;
mod handshake;
mod link;
mod machine;
pub mod nonblocking;
mod wire;

pub use buffer::LineBuffer;
pub use config::{IoMode, NetworkConfig};
pub use connect::{accept_one, connect_with_retry, into_std, listen};
pub use coords::{from_virtual, to_virtual};
pub use handshake::{Handshake, HandshakeStep};
pub use link::{Liveness, NetworkBridge, SessionCommand, SessionEvent, SessionLink, bridge};
pub use machine::{Action, ProtocolState, SessionEnd, SessionMachine, SessionPhase, SessionRole};
pub use wire::{WireLine, frame_line};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Context, Result, eyre};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{SimError, SimResult};
use crate::supervisor::SupervisorHandle;

/// Supervisor id of the session unit
pub const SESSION_TAG: &str = "NET";

type Finished = (SimResult<SessionEnd>, Option<Liveness>);

enum Join {
    Task(JoinHandle<Finished>),
    Thread(oneshot::Receiver<Finished>),
}

/// A session running on its own task or thread
pub struct SessionTask {
    mode: IoMode,
    join: Join,
}

/// Start the configured driver on a connected socket
///
/// With a supervisor the unit is enrolled as [`SESSION_TAG`] and answers
/// heartbeat pings for as long as the session runs.
pub async fn spawn_session(
    stream: TcpStream,
    link: SessionLink,
    config: &NetworkConfig,
    supervisor: Option<&SupervisorHandle>,
) -> Result<SessionTask> {
    debug!(role = %link.role(), mode = %config.io_mode, "spawn_session: called");
    let enrolment = supervisor.map(|s| s.enrol(SESSION_TAG));
    let (liveness, pending) = match enrolment {
        Some(e) => (
            Some(Liveness {
                responder: e.responder,
                stop: e.stop,
            }),
            Some(e.pending),
        ),
        None => (None, None),
    };
    let max_line_len = config.max_line_len;

    let (join, registration) = match config.io_mode {
        IoMode::Nonblocking => {
            let handle = tokio::spawn(async move {
                let mut liveness = liveness;
                let result = nonblocking::run(stream, link, liveness.as_mut(), max_line_len).await;
                (result, liveness)
            });
            let registration = pending.map(|p| p.task(handle.abort_handle()));
            (Join::Task(handle), registration)
        }
        IoMode::Blocking => {
            let stream = into_std(stream).context("Failed to hand socket to session thread")?;
            let socket = stream.try_clone().context("Failed to clone session socket")?;
            let poll_interval = config.poll_interval();
            let finished = Arc::new(AtomicBool::new(false));
            let (tx, rx) = oneshot::channel();

            let done = finished.clone();
            std::thread::Builder::new()
                .name("net-session".to_string())
                .spawn(move || {
                    let mut liveness = liveness;
                    let result = blocking::run(stream, link, liveness.as_mut(), max_line_len, poll_interval);
                    let _ = tx.send((result, liveness));
                    done.store(true, Ordering::SeqCst);
                })
                .context("Failed to spawn session thread")?;

            let registration = pending.map(|p| p.thread(finished, Some(socket)));
            (Join::Thread(rx), registration)
        }
    };

    if let (Some(supervisor), Some(registration)) = (supervisor, registration) {
        supervisor.register(registration).await?;
    }
    info!(mode = %config.io_mode, "Session started");
    Ok(SessionTask {
        mode: config.io_mode,
        join,
    })
}

impl SessionTask {
    pub fn mode(&self) -> IoMode {
        self.mode
    }

    /// Wait for the session to end and settle with the supervisor
    ///
    /// A clean end deregisters the unit and asks for a clean quit. A failed
    /// handshake only ends the session: the unit is deregistered and the rest
    /// of the system keeps running. Any other failure drops the heartbeat
    /// responder while still registered, so the supervisor sees the unit go
    /// silent and shuts everything down.
    pub async fn finish(self, supervisor: Option<&SupervisorHandle>) -> Result<SessionEnd> {
        debug!(mode = %self.mode, "SessionTask::finish: called");
        let (result, liveness) = match self.join {
            Join::Task(handle) => handle.await.map_err(|e| eyre!("Session task failed: {}", e))?,
            Join::Thread(rx) => rx.await.map_err(|_| eyre!("Session thread exited without a result"))?,
        };

        match result {
            Ok(end) => {
                info!(?end, "Session ended");
                if let Some(supervisor) = supervisor {
                    if let Err(e) = supervisor.deregister(SESSION_TAG).await {
                        debug!(error = %e, "SessionTask::finish: supervisor already gone");
                    }
                    if let Err(e) = supervisor.request_quit(SESSION_TAG).await {
                        debug!(error = %e, "SessionTask::finish: supervisor already gone");
                    }
                }
                drop(liveness);
                Ok(end)
            }
            Err(SimError::Handshake { expected, received }) => {
                warn!(%expected, %received, "Handshake rejected, closing session");
                if let Some(supervisor) = supervisor
                    && let Err(e) = supervisor.deregister(SESSION_TAG).await
                {
                    debug!(error = %e, "SessionTask::finish: supervisor already gone");
                }
                drop(liveness);
                Err(SimError::Handshake { expected, received }.into())
            }
            Err(e) => {
                error!(error = %e, "Session failed");
                drop(liveness);
                Err(e.into())
            }
        }
    }
}
