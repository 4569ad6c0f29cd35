//! Main Supervisor task implementation

use pidregistry::{PidRegistry, SUPERVISOR_TAG};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use super::config::SupervisorConfig;
use super::handle::SupervisorHandle;
use super::messages::{
    Pong, SupervisorOutcome, SupervisorReport, SupervisorRequest, SupervisorStatus, WorkerId,
};
use super::registry::WorkerRegistry;

/// The Supervisor polls every registered worker and owns the shutdown
pub struct Supervisor {
    config: SupervisorConfig,
    tx: mpsc::Sender<SupervisorRequest>,
    rx: mpsc::Receiver<SupervisorRequest>,
    pong_tx: mpsc::Sender<Pong>,
    pong_rx: mpsc::Receiver<Pong>,
    registry: WorkerRegistry,
    /// Where the Supervisor announces its own pid
    pid_registry: Option<PidRegistry>,
    cycles: u64,
    shutdowns: u64,
    killed: Vec<WorkerId>,
}

impl Supervisor {
    /// Create a new Supervisor with the given configuration
    pub fn new(config: SupervisorConfig) -> Self {
        debug!(?config, "Supervisor::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (pong_tx, pong_rx) = mpsc::channel(config.channel_buffer);
        Self {
            config,
            tx,
            rx,
            pong_tx,
            pong_rx,
            registry: WorkerRegistry::new(),
            pid_registry: None,
            cycles: 0,
            shutdowns: 0,
            killed: Vec::new(),
        }
    }

    /// Publish the Supervisor's pid in a rendezvous registry on start
    pub fn with_pid_registry(mut self, registry: PidRegistry) -> Self {
        debug!(path = %registry.path().display(), "Supervisor::with_pid_registry: called");
        self.pid_registry = Some(registry);
        self
    }

    /// Handle for registering workers and sending control requests
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle::new(self.tx.clone(), self.pong_tx.clone(), self.pid_registry.clone())
    }

    /// Run until a worker fails or a shutdown is requested
    pub async fn run(mut self) -> SupervisorReport {
        info!("Supervisor started");
        self.publish_pid();

        let outcome = loop {
            if let Some(outcome) = self.drain_requests() {
                break outcome;
            }
            if let Some(outcome) = self.poll_cycle().await {
                break outcome;
            }
            self.cycles += 1;
            if let Some(outcome) = self.idle().await {
                break outcome;
            }
        };

        if outcome.is_failure() {
            error!("{}", outcome);
        } else {
            info!(%outcome, "Supervisor shutting down");
        }

        let graceful = outcome != SupervisorOutcome::Interrupted;
        self.shutdown_all(graceful).await;

        info!(cycles = self.cycles, "Supervisor stopped");
        SupervisorReport {
            outcome,
            cycles: self.cycles,
            shutdowns: self.shutdowns,
            killed: self.killed,
        }
    }

    fn publish_pid(&self) {
        if let Some(registry) = &self.pid_registry
            && let Err(e) = registry.publish(SUPERVISOR_TAG, std::process::id())
        {
            warn!(error = %e, "Failed to publish supervisor pid");
        }
    }

    /// Handle every request already queued
    fn drain_requests(&mut self) -> Option<SupervisorOutcome> {
        while let Ok(request) = self.rx.try_recv() {
            if let Some(outcome) = self.handle_request(request) {
                return Some(outcome);
            }
        }
        None
    }

    /// One pass over the registry, one worker at a time
    async fn poll_cycle(&mut self) -> Option<SupervisorOutcome> {
        for id in self.registry.ids() {
            let Some(seq) = self.registry.arm(&id) else {
                continue;
            };
            let Some(worker) = self.registry.get(&id) else {
                continue;
            };
            if let Err(e) = worker.link().ping(seq) {
                debug!(%id, error = %e, "Supervisor::poll_cycle: ping failed");
                let pid = worker.pid;
                // A worker deregisters before dropping its responder
                if let Some(outcome) = self.drain_requests() {
                    return Some(outcome);
                }
                if self.registry.get(&id).is_none() {
                    continue;
                }
                return Some(SupervisorOutcome::WorkerLost { worker: id, pid });
            }
            if let Some(outcome) = self.await_pong(&id).await {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait for one worker's flag, in `poll_step` increments, up to `ping_timeout`
    async fn await_pong(&mut self, id: &WorkerId) -> Option<SupervisorOutcome> {
        let timeout = self.config.ping_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            let Some(worker) = self.registry.get(id) else {
                debug!(%id, "Supervisor::await_pong: worker deregistered while polled");
                return None;
            };
            if self.registry.is_alive_flag(id) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return Some(SupervisorOutcome::Timeout {
                    worker: id.clone(),
                    pid: worker.pid,
                    deadline: timeout,
                });
            }

            let step = self.config.poll_step().min(deadline - now);
            tokio::select! {
                Some(pong) = self.pong_rx.recv() => {
                    self.registry.acknowledge(&pong);
                }
                Some(request) = self.rx.recv() => {
                    if let Some(outcome) = self.handle_request(request) {
                        return Some(outcome);
                    }
                }
                _ = sleep(step) => {}
            }
        }
    }

    /// Inter-cycle delay; control requests are still served
    async fn idle(&mut self) -> Option<SupervisorOutcome> {
        let until = Instant::now() + self.config.cycle_delay();
        loop {
            tokio::select! {
                Some(pong) = self.pong_rx.recv() => {
                    // Nothing is outstanding here, so this is always stale
                    self.registry.acknowledge(&pong);
                }
                Some(request) = self.rx.recv() => {
                    if let Some(outcome) = self.handle_request(request) {
                        return Some(outcome);
                    }
                }
                _ = sleep_until(until) => return None,
            }
        }
    }

    /// Apply one control request; returns the outcome if it ends the run
    fn handle_request(&mut self, request: SupervisorRequest) -> Option<SupervisorOutcome> {
        match request {
            SupervisorRequest::Register(registration) => {
                self.registry.register(registration);
                None
            }
            SupervisorRequest::Deregister { id } => {
                self.registry.deregister(&id);
                None
            }
            SupervisorRequest::ReportPid { id, pid } => {
                if !self.registry.set_pid(&id, pid) {
                    warn!(%id, pid, "Pid reported for unknown worker");
                }
                None
            }
            SupervisorRequest::Quit { from } => {
                info!(%from, "Quit requested");
                Some(SupervisorOutcome::Quit { from })
            }
            SupervisorRequest::Interrupt => {
                info!("Interrupt received");
                Some(SupervisorOutcome::Interrupted)
            }
            SupervisorRequest::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.status());
                None
            }
        }
    }

    fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            workers: self.registry.statuses(),
            cycles: self.cycles,
            shutdowns: self.shutdowns,
        }
    }

    /// Stop every registered worker; only the first call does anything
    async fn shutdown_all(&mut self, graceful: bool) -> bool {
        if self.shutdowns > 0 {
            debug!("Supervisor::shutdown_all: shutdown already performed");
            return false;
        }
        self.shutdowns += 1;
        info!(graceful, workers = self.registry.len(), "Shutting down all workers");

        if graceful {
            for worker in self.registry.iter_mut() {
                debug!(id = %worker.id, "Supervisor::shutdown_all: requesting stop");
                worker.terminator_mut().terminate();
            }
            sleep(self.config.grace_period()).await;
        }

        for worker in self.registry.iter_mut() {
            if worker.terminator_mut().is_alive() {
                warn!(id = %worker.id, pid = ?worker.pid, "Worker still running, killing");
                worker.terminator_mut().kill();
                self.killed.push(worker.id.clone());
            } else {
                debug!(id = %worker.id, "Supervisor::shutdown_all: worker already exited");
            }
        }

        info!("All workers terminated");
        true
    }
}
