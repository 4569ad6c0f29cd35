//! Liveness supervision
//!
//! The [`Supervisor`] pings every registered worker in turn and waits a
//! bounded time for the matching pong. A single missed deadline shuts the
//! whole system down.
//!
//! Workers enrol through a [`SupervisorHandle`]:
//!
//! ```ignore
//! let enrolment = handle.enrol("DRONE");
//! let task = tokio::spawn(worker(enrolment.responder, enrolment.stop));
//! handle.register(enrolment.pending.task(task.abort_handle())).await?;
//! ```

mod config;
mod core;
mod handle;
pub mod heartbeat;
mod messages;
mod registry;
pub mod terminate;

pub use config::SupervisorConfig;
pub use core::Supervisor;
pub use handle::{Enrolment, SupervisorHandle};
pub use heartbeat::{HeartbeatLink, HeartbeatResponder, StopSignal, StopTrigger};
pub use messages::{
    Ping, Pong, SupervisorOutcome, SupervisorReport, SupervisorRequest, SupervisorStatus, WorkerId,
    WorkerStatus,
};
pub use registry::{PendingWorker, Registration, WorkerHandle, WorkerRegistry};
pub use terminate::{ProcessTerminator, TaskTerminator, Terminate, ThreadTerminator};
