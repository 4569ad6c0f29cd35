//! How the Supervisor stops a worker

use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::heartbeat::StopTrigger;

/// Two-step termination: polite request first, forced kill for survivors
pub trait Terminate: Send + fmt::Debug {
    /// Ask the worker to stop
    fn terminate(&mut self);

    /// Whether the worker is still running
    fn is_alive(&self) -> bool;

    /// Stop the worker without cooperation
    fn kill(&mut self);
}

/// Worker running as a tokio task
#[derive(Debug)]
pub struct TaskTerminator {
    stop: StopTrigger,
    abort: AbortHandle,
}

impl TaskTerminator {
    pub fn new(stop: StopTrigger, abort: AbortHandle) -> Self {
        Self { stop, abort }
    }
}

impl Terminate for TaskTerminator {
    fn terminate(&mut self) {
        debug!("TaskTerminator::terminate: called");
        self.stop.fire();
    }

    fn is_alive(&self) -> bool {
        !self.abort.is_finished()
    }

    fn kill(&mut self) {
        debug!("TaskTerminator::kill: called");
        self.abort.abort();
    }
}

/// Worker running on a dedicated OS thread, usually parked in a socket read
#[derive(Debug)]
pub struct ThreadTerminator {
    stop: StopTrigger,
    finished: Arc<AtomicBool>,
    socket: Option<TcpStream>,
}

impl ThreadTerminator {
    /// `finished` is set by the thread on exit; `socket` is a clone of the stream it reads
    pub fn new(stop: StopTrigger, finished: Arc<AtomicBool>, socket: Option<TcpStream>) -> Self {
        Self { stop, finished, socket }
    }

    fn shutdown_socket(&self, how: Shutdown) {
        if let Some(socket) = &self.socket
            && let Err(e) = socket.shutdown(how)
        {
            debug!(error = %e, "ThreadTerminator: socket shutdown failed");
        }
    }
}

impl Terminate for ThreadTerminator {
    fn terminate(&mut self) {
        debug!("ThreadTerminator::terminate: called");
        self.stop.fire();
        // A blocked read returns EOF and the thread sees the stop request
        self.shutdown_socket(Shutdown::Read);
    }

    fn is_alive(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }

    fn kill(&mut self) {
        debug!("ThreadTerminator::kill: called");
        self.shutdown_socket(Shutdown::Both);
    }
}

/// Worker living in another OS process, known by its pid
///
/// Pids that `kill(2)` would read as a process group (0, or anything that
/// wraps negative as an `i32`) are never signalled.
#[derive(Debug, Clone, Copy)]
pub struct ProcessTerminator {
    pid: u32,
}

impl ProcessTerminator {
    pub fn new(pid: u32) -> Self {
        if Self::target_of(pid).is_none() {
            warn!(pid, "Refusing to signal pid outside the single-process range");
        }
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn target_of(pid: u32) -> Option<i32> {
        i32::try_from(pid).ok().filter(|&pid| pid > 0)
    }

    #[cfg(unix)]
    fn signal(&self, signal: Option<nix::sys::signal::Signal>) -> nix::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let target = Self::target_of(self.pid).ok_or(Errno::ESRCH)?;
        kill(Pid::from_raw(target), signal)
    }
}

impl Terminate for ProcessTerminator {
    fn terminate(&mut self) {
        debug!(pid = self.pid, "ProcessTerminator::terminate: called");
        #[cfg(unix)]
        {
            if let Err(e) = self.signal(Some(nix::sys::signal::Signal::SIGTERM)) {
                warn!(pid = self.pid, error = %e, "Failed to send SIGTERM");
            }
        }
        #[cfg(not(unix))]
        warn!(pid = self.pid, "Process termination is only supported on unix");
    }

    fn is_alive(&self) -> bool {
        // Signal 0 only checks that the process exists
        #[cfg(unix)]
        {
            self.signal(None).is_ok()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    fn kill(&mut self) {
        debug!(pid = self.pid, "ProcessTerminator::kill: called");
        #[cfg(unix)]
        {
            if let Err(e) = self.signal(Some(nix::sys::signal::Signal::SIGKILL)) {
                debug!(pid = self.pid, error = %e, "ProcessTerminator::kill: failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::heartbeat::stop_pair;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_terminator_graceful() {
        let (trigger, mut signal) = stop_pair();
        let task = tokio::spawn(async move {
            signal.recv().await;
        });
        let mut terminator = TaskTerminator::new(trigger, task.abort_handle());
        assert!(terminator.is_alive());

        terminator.terminate();
        task.await.unwrap();
        assert!(!terminator.is_alive());
    }

    #[tokio::test]
    async fn test_task_terminator_kill_ignores_cooperation() {
        let (trigger, _signal) = stop_pair();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let mut terminator = TaskTerminator::new(trigger, task.abort_handle());

        terminator.terminate();
        terminator.kill();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!terminator.is_alive());
    }

    #[test]
    fn test_thread_terminator_unblocks_read() {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (trigger, mut signal) = stop_pair();
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let socket = server.try_clone().unwrap();
        let thread = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let n = server.read(&mut buf).unwrap_or(0);
            let stopped = signal.is_fired();
            done.store(true, Ordering::Release);
            (n, stopped)
        });

        let mut terminator = ThreadTerminator::new(trigger, finished, Some(socket));
        terminator.terminate();
        let (n, stopped) = thread.join().unwrap();
        assert_eq!(n, 0);
        assert!(stopped);
        assert!(!terminator.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_terminator_sigterm() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut terminator = ProcessTerminator::new(child.id());
        assert!(terminator.is_alive());

        terminator.terminate();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!terminator.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_terminator_never_signals_a_group() {
        // Any of these reaching kill(2) would take down this test's own process group
        for pid in [0, i32::MAX as u32 + 1, u32::MAX] {
            let mut terminator = ProcessTerminator::new(pid);
            assert!(!terminator.is_alive(), "pid {} reported alive", pid);
            terminator.terminate();
            terminator.kill();
        }
        assert_eq!(ProcessTerminator::target_of(1), Some(1));
        assert_eq!(ProcessTerminator::target_of(i32::MAX as u32), Some(i32::MAX));
    }
}
