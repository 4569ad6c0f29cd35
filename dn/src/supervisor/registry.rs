//! Workers known to the Supervisor

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::heartbeat::{HeartbeatLink, StopTrigger};
use super::messages::{Pong, WorkerId, WorkerStatus};
use super::terminate::{ProcessTerminator, TaskTerminator, Terminate, ThreadTerminator};

/// A worker that has a heartbeat channel but no terminator yet
///
/// The terminator usually needs the spawned task or thread, which does not
/// exist until the worker's end of the channel has been moved into it.
#[derive(Debug)]
pub struct PendingWorker {
    pub(crate) id: WorkerId,
    pub(crate) link: HeartbeatLink,
    pub(crate) stop: StopTrigger,
    pub(crate) pid: Option<u32>,
}

impl PendingWorker {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Worker is a tokio task
    pub fn task(self, abort: AbortHandle) -> Registration {
        let terminator = TaskTerminator::new(self.stop, abort);
        Registration {
            id: self.id,
            link: self.link,
            pid: self.pid,
            terminator: Box::new(terminator),
        }
    }

    /// Worker is an OS thread that sets `finished` on exit
    pub fn thread(self, finished: Arc<AtomicBool>, socket: Option<std::net::TcpStream>) -> Registration {
        let terminator = ThreadTerminator::new(self.stop, finished, socket);
        Registration {
            id: self.id,
            link: self.link,
            pid: self.pid,
            terminator: Box::new(terminator),
        }
    }

    /// Worker is another process
    pub fn process(self, pid: u32) -> Registration {
        Registration {
            id: self.id,
            link: self.link,
            pid: Some(pid),
            terminator: Box::new(ProcessTerminator::new(pid)),
        }
    }

    /// Worker with its own termination strategy
    pub fn custom(self, terminator: Box<dyn Terminate>) -> Registration {
        Registration {
            id: self.id,
            link: self.link,
            pid: self.pid,
            terminator,
        }
    }
}

/// Everything the Supervisor needs to poll and stop one worker
#[derive(Debug)]
pub struct Registration {
    pub(crate) id: WorkerId,
    pub(crate) link: HeartbeatLink,
    pub(crate) pid: Option<u32>,
    pub(crate) terminator: Box<dyn Terminate>,
}

impl Registration {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }
}

/// One supervised worker
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub pid: Option<u32>,
    link: HeartbeatLink,
    terminator: Box<dyn Terminate>,
    last_seen: Option<Instant>,
    /// Ping sequence the worker currently owes a pong for
    outstanding: Option<u64>,
    alive: bool,
}

impl WorkerHandle {
    fn new(reg: Registration) -> Self {
        Self {
            id: reg.id,
            pid: reg.pid,
            link: reg.link,
            terminator: reg.terminator,
            last_seen: None,
            outstanding: None,
            alive: true,
        }
    }

    pub fn link(&self) -> &HeartbeatLink {
        &self.link
    }

    pub fn terminator_mut(&mut self) -> &mut dyn Terminate {
        self.terminator.as_mut()
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id.clone(),
            pid: self.pid,
            since_last_pong: self.last_seen.map(|t| t.elapsed()),
        }
    }
}

/// Registration-ordered set of workers
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Vec<WorkerHandle>,
    next_seq: u64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }

    pub fn get(&self, id: &WorkerId) -> Option<&WorkerHandle> {
        self.workers.iter().find(|w| &w.id == id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkerHandle> {
        self.workers.iter_mut()
    }

    fn position(&self, id: &WorkerId) -> Option<usize> {
        self.workers.iter().position(|w| &w.id == id)
    }

    /// Add a worker; a second registration under the same id replaces the first
    pub fn register(&mut self, reg: Registration) {
        debug!(id = %reg.id, pid = ?reg.pid, "WorkerRegistry::register: called");
        let handle = WorkerHandle::new(reg);
        match self.position(&handle.id) {
            Some(index) => {
                warn!(id = %handle.id, "Worker registered twice, replacing previous handle");
                self.workers[index] = handle;
            }
            None => {
                info!(id = %handle.id, pid = ?handle.pid, "Worker registered");
                self.workers.push(handle);
            }
        }
    }

    pub fn deregister(&mut self, id: &WorkerId) -> Option<WorkerHandle> {
        debug!(%id, "WorkerRegistry::deregister: called");
        let index = self.position(id)?;
        info!(%id, "Worker deregistered");
        Some(self.workers.remove(index))
    }

    pub fn set_pid(&mut self, id: &WorkerId, pid: u32) -> bool {
        debug!(%id, pid, "WorkerRegistry::set_pid: called");
        match self.workers.iter_mut().find(|w| &w.id == id) {
            Some(worker) => {
                worker.pid = Some(pid);
                true
            }
            None => false,
        }
    }

    /// Clear the worker's flag and issue a fresh ping sequence number
    pub fn arm(&mut self, id: &WorkerId) -> Option<u64> {
        let worker = self.workers.iter_mut().find(|w| &w.id == id)?;
        self.next_seq += 1;
        worker.alive = false;
        worker.outstanding = Some(self.next_seq);
        debug!(%id, seq = self.next_seq, "WorkerRegistry::arm: armed");
        Some(self.next_seq)
    }

    /// Accept a pong if it names a registered worker and the exact ping it owes
    pub fn acknowledge(&mut self, pong: &Pong) -> bool {
        let Some(worker) = self.workers.iter_mut().find(|w| w.id == pong.id) else {
            debug!(id = %pong.id, "WorkerRegistry::acknowledge: unknown worker");
            return false;
        };
        if worker.outstanding != Some(pong.seq) {
            debug!(id = %pong.id, seq = pong.seq, expected = ?worker.outstanding, "WorkerRegistry::acknowledge: stale pong");
            return false;
        }
        worker.outstanding = None;
        worker.alive = true;
        worker.last_seen = Some(Instant::now());
        true
    }

    pub fn is_alive_flag(&self, id: &WorkerId) -> bool {
        self.get(id).is_some_and(|w| w.alive)
    }

    /// How long ago the worker last answered
    pub fn since_last_seen(&self, id: &WorkerId) -> Option<Duration> {
        self.get(id)?.last_seen.map(|t| t.elapsed())
    }

    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.workers.iter().map(WorkerHandle::status).collect()
    }
}
