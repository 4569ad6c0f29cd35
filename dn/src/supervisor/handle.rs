//! SupervisorHandle - Client interface for workers and the launcher

use eyre::{Result, eyre};
use pidregistry::PidRegistry;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::heartbeat::{self, HeartbeatResponder, StopSignal, stop_pair};
use super::messages::{Pong, SupervisorRequest, SupervisorStatus, WorkerId};
use super::registry::{PendingWorker, Registration};

/// The worker's side of a fresh enrolment
#[derive(Debug)]
pub struct Enrolment {
    /// Answer pings with this
    pub responder: HeartbeatResponder,
    /// Fires when the Supervisor asks for a graceful stop
    pub stop: StopSignal,
    /// Turn into a [`Registration`] once the worker is spawned
    pub pending: PendingWorker,
}

/// Cloneable handle to a running Supervisor
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorRequest>,
    pong_tx: mpsc::Sender<Pong>,
    /// Every registered unit is announced here as `<TAG> <PID>`
    pid_registry: Option<PidRegistry>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SupervisorRequest>,
        pong_tx: mpsc::Sender<Pong>,
        pid_registry: Option<PidRegistry>,
    ) -> Self {
        Self {
            tx,
            pong_tx,
            pid_registry,
        }
    }

    /// Create the heartbeat channel and stop signal for a new worker
    pub fn enrol(&self, id: impl Into<WorkerId>) -> Enrolment {
        let id = id.into();
        debug!(%id, "SupervisorHandle::enrol: called");
        let (link, responder) = heartbeat::channel(id.clone(), self.pong_tx.clone());
        let (trigger, stop) = stop_pair();
        Enrolment {
            responder,
            stop,
            pending: PendingWorker {
                id,
                link,
                stop: trigger,
                pid: None,
            },
        }
    }

    async fn send(&self, request: SupervisorRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| eyre!("Supervisor channel closed"))
    }

    /// Start polling a worker
    ///
    /// In-process units are published under the launcher's own pid.
    pub async fn register(&self, registration: Registration) -> Result<()> {
        debug!(id = %registration.id(), "SupervisorHandle::register: called");
        let id = registration.id().clone();
        let pid = registration.pid.unwrap_or_else(std::process::id);
        self.send(SupervisorRequest::Register(registration)).await?;
        self.publish(&id, pid);
        Ok(())
    }

    fn publish(&self, id: &WorkerId, pid: u32) {
        if let Some(registry) = &self.pid_registry
            && let Err(e) = registry.publish(id.as_str(), pid)
        {
            warn!(%id, pid, error = %e, "Failed to publish worker pid");
        }
    }

    /// Stop polling a worker that is exiting on purpose
    pub async fn deregister(&self, id: impl Into<WorkerId>) -> Result<()> {
        let id = id.into();
        debug!(%id, "SupervisorHandle::deregister: called");
        self.send(SupervisorRequest::Deregister { id }).await
    }

    pub async fn report_pid(&self, id: impl Into<WorkerId>, pid: u32) -> Result<()> {
        let id = id.into();
        debug!(%id, pid, "SupervisorHandle::report_pid: called");
        self.send(SupervisorRequest::ReportPid { id: id.clone(), pid }).await?;
        self.publish(&id, pid);
        Ok(())
    }

    /// Clean shutdown on the operator's behalf
    pub async fn request_quit(&self, from: impl Into<WorkerId>) -> Result<()> {
        let from = from.into();
        debug!(%from, "SupervisorHandle::request_quit: called");
        self.send(SupervisorRequest::Quit { from }).await
    }

    /// Immediate shutdown on operator cancellation
    pub async fn interrupt(&self) -> Result<()> {
        debug!("SupervisorHandle::interrupt: called");
        self.send(SupervisorRequest::Interrupt).await
    }

    pub async fn snapshot(&self) -> Result<SupervisorStatus> {
        debug!("SupervisorHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SupervisorRequest::Snapshot { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Supervisor stopped before replying"))
    }
}
