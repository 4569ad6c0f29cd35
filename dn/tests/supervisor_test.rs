//! Integration tests for supervision across real units
//!
//! Child processes, tokio tasks and network sessions registered with one
//! supervisor.

use std::time::Duration;

use dronenet::message::WindowSize;
use dronenet::net::{IoMode, NetworkConfig, SessionEnd, SessionRole, bridge, spawn_session};
use dronenet::supervisor::{
    Enrolment, Supervisor, SupervisorConfig, SupervisorHandle, SupervisorOutcome, WorkerId,
};
use pidregistry::PidRegistry;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        ping_timeout_ms: 150,
        poll_step_ms: 5,
        cycle_delay_ms: 20,
        grace_period_ms: 50,
        channel_buffer: 16,
    }
}

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let client = tokio::spawn(async move { TcpStream::connect(addr).await.expect("Failed to connect") });
    let (server, _) = listener.accept().await.expect("Failed to accept");
    (server, client.await.expect("Connect task panicked"))
}

/// A task unit that answers every ping until stopped
async fn spawn_healthy(handle: &SupervisorHandle, tag: &str) -> JoinHandle<&'static str> {
    let Enrolment {
        mut responder,
        mut stop,
        pending,
    } = handle.enrol(tag);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                ping = responder.next_ping() => match ping {
                    Some(ping) => {
                        let _ = responder.respond(ping).await;
                    }
                    None => return "orphaned",
                },
                _ = stop.recv() => return "stopped",
            }
        }
    });
    handle
        .register(pending.task(task.abort_handle()))
        .await
        .expect("Failed to register healthy unit");
    task
}

// =============================================================================
// Liveness timeout
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_silent_process_triggers_alert_and_full_shutdown() {
    use std::os::unix::process::ExitStatusExt;

    let supervisor = Supervisor::new(fast_config());
    let handle = supervisor.handle();

    let healthy = spawn_healthy(&handle, "OBST").await;

    // A worker process that never answers
    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("Failed to spawn child");
    let pid = child.id();
    let Enrolment {
        responder: _silent,
        pending,
        ..
    } = handle.enrol("DRONE");
    handle
        .register(pending.process(pid))
        .await
        .expect("Failed to register DRONE");

    let report = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("Supervisor hung");

    match &report.outcome {
        SupervisorOutcome::Timeout {
            worker,
            pid: reported,
            deadline,
        } => {
            assert_eq!(worker, &WorkerId::new("DRONE"));
            assert_eq!(*reported, Some(pid));
            assert_eq!(*deadline, Duration::from_millis(150));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(report.outcome.to_string().starts_with("ALERT"));
    assert!(report.outcome.to_string().contains(&pid.to_string()));
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(report.shutdowns, 1);

    assert_eq!(healthy.await.expect("Healthy worker panicked"), "stopped");
    let status = child.wait().expect("Failed to reap child");
    assert!(status.signal().is_some(), "child exited on its own: {:?}", status);
}

// =============================================================================
// Network session as a supervised unit
// =============================================================================

struct SupervisedSession {
    finished: JoinHandle<Option<SessionEnd>>,
    peer: JoinHandle<()>,
    events: JoinHandle<()>,
}

/// Responder session whose peer writes `peer_lines`, then reads until hung up on
async fn start_supervised_session(
    handle: &SupervisorHandle,
    peer_lines: &'static [&'static str],
) -> SupervisedSession {
    let (driver_side, peer_side) = socket_pair().await;
    let (mut bridge, link) = bridge(SessionRole::Responder, WindowSize::default(), 16);
    let config = NetworkConfig {
        io_mode: IoMode::Nonblocking,
        ..Default::default()
    };
    let session = spawn_session(driver_side, link, &config, Some(handle))
        .await
        .expect("Failed to start session");
    let finish_handle = handle.clone();
    let finished = tokio::spawn(async move { session.finish(Some(&finish_handle)).await.ok() });
    let events = tokio::spawn(async move { while bridge.next_event().await.is_some() {} });

    let peer = tokio::spawn(async move {
        let (read, mut write) = peer_side.into_split();
        let mut lines = BufReader::new(read).lines();
        for line in peer_lines {
            write
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .expect("Failed to write");
        }
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    SupervisedSession { finished, peer, events }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_peer_quit_ends_run_cleanly() {
    let supervisor = Supervisor::new(fast_config());
    let handle = supervisor.handle();
    let session = start_supervised_session(&handle, &["ok", "size 40 20", "q"]).await;

    let report = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("Supervisor hung");
    let end = session.finished.await.expect("Finish task panicked");
    let _ = session.peer.await;
    let _ = session.events.await;

    assert_eq!(
        report.outcome,
        SupervisorOutcome::Quit {
            from: WorkerId::new("NET")
        }
    );
    assert_eq!(report.outcome.exit_code(), 0);
    assert_eq!(end, Some(SessionEnd::PeerQuit));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_handshake_ends_only_the_session() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = PidRegistry::new(temp.path().join("pids.txt"));
    let supervisor = Supervisor::new(fast_config()).with_pid_registry(registry.clone());
    let handle = supervisor.handle();

    let _healthy = spawn_healthy(&handle, "OBST").await;
    let session = start_supervised_session(&handle, &["nope"]).await;
    let run = tokio::spawn(supervisor.run());

    let end = tokio::time::timeout(Duration::from_secs(5), session.finished)
        .await
        .expect("Session hung")
        .expect("Finish task panicked");
    assert_eq!(end, None);
    let _ = session.peer.await;
    let _ = session.events.await;

    // Several ping deadlines pass without the system going down
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!run.is_finished(), "supervisor stopped after a rejected handshake");

    let status = handle.snapshot().await.expect("Failed to take snapshot");
    let ids: Vec<_> = status.workers.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["OBST"]);
    assert_eq!(status.shutdowns, 0);
    assert_eq!(
        registry.lookup("NET").expect("Failed to read registry"),
        Some(std::process::id())
    );

    handle.interrupt().await.expect("Failed to interrupt");
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("Supervisor hung")
        .expect("Supervisor task panicked");
    assert_eq!(report.outcome, SupervisorOutcome::Interrupted);
    assert_eq!(report.outcome.exit_code(), 0);
    assert_eq!(report.shutdowns, 1);
    assert_eq!(report.killed, vec![WorkerId::new("OBST")]);
}
