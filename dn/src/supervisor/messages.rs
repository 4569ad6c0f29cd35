//! Message types for the Supervisor

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::registry::Registration;
use crate::error::SimError;

/// Identity tag of a supervised worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Liveness probe sent to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub seq: u64,
}

/// Liveness acknowledgement, attributed by identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub id: WorkerId,
    pub seq: u64,
}

/// Requests to the Supervisor task
#[derive(Debug)]
pub enum SupervisorRequest {
    /// Start polling a worker
    Register(Registration),

    /// Stop polling a worker that exited on purpose
    Deregister { id: WorkerId },

    /// Record the OS process id a worker runs under
    ReportPid { id: WorkerId, pid: u32 },

    /// Operator asked to quit through a worker (graceful shutdown, exit 0)
    Quit { from: WorkerId },

    /// Operator cancellation (immediate shutdown, exit 0)
    Interrupt,

    /// Current view of the registry
    Snapshot {
        reply_tx: oneshot::Sender<SupervisorStatus>,
    },
}

/// Snapshot of one registered worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub pid: Option<u32>,
    /// Time since the last accepted pong
    pub since_last_pong: Option<Duration>,
}

/// Snapshot of the Supervisor
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorStatus {
    pub workers: Vec<WorkerStatus>,
    pub cycles: u64,
    pub shutdowns: u64,
}

/// Why the Supervisor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// A worker relayed the operator's quit
    Quit { from: WorkerId },

    /// Operator cancellation
    Interrupted,

    /// A worker missed its deadline
    Timeout {
        worker: WorkerId,
        pid: Option<u32>,
        deadline: Duration,
    },

    /// A worker's heartbeat channel closed underneath it
    WorkerLost { worker: WorkerId, pid: Option<u32> },
}

impl SupervisorOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SupervisorOutcome::Timeout { .. } | SupervisorOutcome::WorkerLost { .. })
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.is_failure() { 1 } else { 0 }
    }

    /// The error a failed run surfaces to its caller
    pub fn to_error(&self) -> Option<SimError> {
        match self {
            SupervisorOutcome::Timeout { worker, pid, deadline } => Some(SimError::LivenessTimeout {
                worker: worker.to_string(),
                pid: *pid,
                deadline: *deadline,
            }),
            SupervisorOutcome::WorkerLost { worker, .. } => {
                Some(SimError::ChannelClosed(format!("heartbeat of {}", worker)))
            }
            SupervisorOutcome::Quit { .. } | SupervisorOutcome::Interrupted => None,
        }
    }
}

impl fmt::Display for SupervisorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorOutcome::Quit { from } => write!(f, "quit requested by {}", from),
            SupervisorOutcome::Interrupted => write!(f, "interrupted by operator"),
            SupervisorOutcome::Timeout { worker, pid, deadline } => write!(
                f,
                "ALERT: worker {} (pid {}) missed its {} ms heartbeat deadline",
                worker,
                pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                deadline.as_millis()
            ),
            SupervisorOutcome::WorkerLost { worker, pid } => write!(
                f,
                "ALERT: worker {} (pid {}) closed its heartbeat channel",
                worker,
                pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
            ),
        }
    }
}

/// Final account of a Supervisor run
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub outcome: SupervisorOutcome,
    pub cycles: u64,
    /// Number of full-system shutdowns performed (always 1)
    pub shutdowns: u64,
    /// Workers that were still alive after the grace period and got killed
    pub killed: Vec<WorkerId>,
}
