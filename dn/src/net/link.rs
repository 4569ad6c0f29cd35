//! Channels between the broker and the network session

use std::future;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::machine::{SessionEnd, SessionRole};
use crate::error::{SimError, SimResult};
use crate::message::{Position, WindowSize};
use crate::supervisor::{HeartbeatResponder, StopSignal};

/// Broker to session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send `q` to the peer and wind the session down
    Quit,
}

/// Session to broker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// Handshake finished with this window size
    Negotiated(WindowSize),
    /// Peer's drone position, in the wire frame
    RemoteDrone(Position),
    Closed(SessionEnd),
}

/// Create the broker and session ends of one network link
pub fn bridge(role: SessionRole, proposed: WindowSize, buffer: usize) -> (NetworkBridge, SessionLink) {
    debug!(%role, ?proposed, buffer, "bridge: called");
    let (position_tx, position_rx) = watch::channel(Position::default());
    let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
    let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
    (
        NetworkBridge {
            role,
            position_tx,
            command_tx,
            event_rx,
        },
        SessionLink {
            role,
            proposed,
            position_rx,
            command_rx,
            commands_closed: false,
            event_tx,
        },
    )
}

/// Broker end
#[derive(Debug)]
pub struct NetworkBridge {
    role: SessionRole,
    position_tx: watch::Sender<Position>,
    command_tx: mpsc::Sender<SessionCommand>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl NetworkBridge {
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Replace the cached local position (wire frame); never blocks
    pub fn publish_position(&self, position: Position) {
        debug!(x = position.x, y = position.y, "NetworkBridge::publish_position: called");
        self.position_tx.send_replace(position);
    }

    /// Ask the session to send `q`
    pub fn request_quit(&self) {
        debug!("NetworkBridge::request_quit: called");
        if let Err(e) = self.command_tx.try_send(SessionCommand::Quit) {
            debug!(error = %e, "NetworkBridge::request_quit: not delivered");
        }
    }

    /// Next session event (`None` once the session is gone)
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }
}

/// Session end
#[derive(Debug)]
pub struct SessionLink {
    role: SessionRole,
    proposed: WindowSize,
    position_rx: watch::Receiver<Position>,
    command_rx: mpsc::Receiver<SessionCommand>,
    commands_closed: bool,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl SessionLink {
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Window size the initiator proposes
    pub fn proposed(&self) -> WindowSize {
        self.proposed
    }

    /// Latest local position published by the broker
    pub fn position(&self) -> Position {
        *self.position_rx.borrow()
    }

    /// Poll for a command; a dropped broker reads as one `Quit`
    pub fn try_command(&mut self) -> Option<SessionCommand> {
        if self.commands_closed {
            return None;
        }
        match self.command_rx.try_recv() {
            Ok(command) => Some(command),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.commands_closed = true;
                Some(SessionCommand::Quit)
            }
        }
    }

    /// Wait for a command; a dropped broker reads as one `Quit`, then nothing
    pub async fn next_command(&mut self) -> SessionCommand {
        if self.commands_closed {
            return future::pending().await;
        }
        match self.command_rx.recv().await {
            Some(command) => command,
            None => {
                self.commands_closed = true;
                SessionCommand::Quit
            }
        }
    }

    pub async fn emit(&self, event: SessionEvent) -> SimResult<()> {
        debug!(?event, "SessionLink::emit: called");
        self.event_tx
            .send(event)
            .await
            .map_err(|_| SimError::ChannelClosed("broker event channel".to_string()))
    }

    /// Emit from a session thread outside the runtime
    pub fn emit_blocking(&self, event: SessionEvent) -> SimResult<()> {
        debug!(?event, "SessionLink::emit_blocking: called");
        self.event_tx
            .blocking_send(event)
            .map_err(|_| SimError::ChannelClosed("broker event channel".to_string()))
    }
}

/// Supervisor hooks a session unit answers to
#[derive(Debug)]
pub struct Liveness {
    pub responder: HeartbeatResponder,
    pub stop: StopSignal,
}
