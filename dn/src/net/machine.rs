//! Steady-state session machine, shared by both I/O drivers
//!
//! The machine never touches a socket. Drivers feed it received lines and
//! the current local position, and carry out the [`Action`]s it returns.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::wire::WireLine;
use crate::error::{SimError, SimResult};
use crate::message::Position;

/// Which side of the protocol this instance plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    /// Listens for the peer and drives every cycle
    Initiator,
    /// Connects to the peer and answers its commands
    Responder,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Initiator => f.write_str("initiator"),
            SessionRole::Responder => f.write_str("responder"),
        }
    }
}

/// The nine protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    SendCmdDrone,
    SendDataDrone,
    WaitDok,
    SendCmdObst,
    WaitDataObst,
    WaitCommand,
    WaitDroneData,
    SendObstData,
    WaitPok,
}

impl ProtocolState {
    /// First state after the handshake
    pub fn initial(role: SessionRole) -> Self {
        match role {
            SessionRole::Initiator => ProtocolState::SendCmdDrone,
            SessionRole::Responder => ProtocolState::WaitCommand,
        }
    }

    /// Whether the state can only advance on a received line
    pub fn needs_input(&self) -> bool {
        matches!(
            self,
            ProtocolState::WaitDok
                | ProtocolState::WaitDataObst
                | ProtocolState::WaitCommand
                | ProtocolState::WaitDroneData
                | ProtocolState::WaitPok
        )
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionEnd {
    /// The peer sent `q`; we answered `qok`
    PeerQuit,
    /// We sent `q` and got `qok` (or the peer closed right after)
    LocalQuit,
    /// The peer went away mid-session
    Disconnected,
    /// Negotiation or socket failure
    Failed,
}

impl SessionEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::PeerQuit | SessionEnd::LocalQuit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Steady(ProtocolState),
    /// `q` sent, waiting for `qok`
    AwaitQuitAck,
    Closed(SessionEnd),
}

/// Something the driver must do
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write this line to the peer
    Send(WireLine),
    /// Report the peer's drone (wire frame) to the broker
    Remote(Position),
    /// Close the socket
    Close(SessionEnd),
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    role: SessionRole,
    phase: SessionPhase,
}

impl SessionMachine {
    pub fn new(role: SessionRole) -> Self {
        debug!(%role, "SessionMachine::new: called");
        Self {
            role,
            phase: SessionPhase::Steady(ProtocolState::initial(role)),
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> Option<ProtocolState> {
        match self.phase {
            SessionPhase::Steady(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, SessionPhase::Closed(_))
    }

    /// Whether the next transition needs a received line
    pub fn wants_input(&self) -> bool {
        match self.phase {
            SessionPhase::Steady(state) => state.needs_input(),
            SessionPhase::AwaitQuitAck => true,
            SessionPhase::Closed(_) => false,
        }
    }

    /// Take one input-free transition; `None` when the machine needs a line
    ///
    /// `local` is the cached local position, already in the wire frame.
    pub fn step(&mut self, local: Position) -> Option<Action> {
        let SessionPhase::Steady(state) = self.phase else {
            return None;
        };
        let (next, line) = match state {
            ProtocolState::SendCmdDrone => (ProtocolState::SendDataDrone, WireLine::Drone),
            ProtocolState::SendDataDrone => (ProtocolState::WaitDok, WireLine::Coords(local)),
            ProtocolState::SendCmdObst => (ProtocolState::WaitDataObst, WireLine::Obst),
            ProtocolState::SendObstData => (ProtocolState::WaitPok, WireLine::Coords(local)),
            _ => return None,
        };
        debug!(?state, ?next, "SessionMachine::step: advancing");
        self.phase = SessionPhase::Steady(next);
        Some(Action::Send(line))
    }

    /// Feed one received line
    ///
    /// A malformed or unexpected line is an error and leaves the state as it was.
    pub fn on_line(&mut self, line: &str) -> SimResult<Vec<Action>> {
        let parsed = WireLine::parse(line)?;
        match (self.phase, parsed) {
            (SessionPhase::Closed(_), _) => Ok(Vec::new()),
            (_, WireLine::Quit) => {
                info!(role = %self.role, "Peer quit");
                self.phase = SessionPhase::Closed(SessionEnd::PeerQuit);
                Ok(vec![
                    Action::Send(WireLine::QuitAck),
                    Action::Close(SessionEnd::PeerQuit),
                ])
            }
            (SessionPhase::AwaitQuitAck, WireLine::QuitAck) => {
                info!(role = %self.role, "Quit acknowledged");
                self.phase = SessionPhase::Closed(SessionEnd::LocalQuit);
                Ok(vec![Action::Close(SessionEnd::LocalQuit)])
            }
            (SessionPhase::AwaitQuitAck, other) => {
                debug!(line = %other, "SessionMachine::on_line: ignored while quitting");
                Ok(Vec::new())
            }
            (SessionPhase::Steady(state), parsed) => self.steady(state, parsed),
        }
    }

    fn steady(&mut self, state: ProtocolState, line: WireLine) -> SimResult<Vec<Action>> {
        let (next, actions) = match (state, line) {
            (ProtocolState::WaitDok, WireLine::Dok(_)) => (ProtocolState::SendCmdObst, Vec::new()),
            (ProtocolState::WaitDataObst, WireLine::Coords(p)) => (
                ProtocolState::SendCmdDrone,
                vec![Action::Remote(p), Action::Send(WireLine::Pok(p))],
            ),
            (ProtocolState::WaitCommand, WireLine::Drone) => (ProtocolState::WaitDroneData, Vec::new()),
            (ProtocolState::WaitCommand, WireLine::Obst) => (ProtocolState::SendObstData, Vec::new()),
            (ProtocolState::WaitDroneData, WireLine::Coords(p)) => (
                ProtocolState::WaitCommand,
                vec![Action::Remote(p), Action::Send(WireLine::Dok(p))],
            ),
            (ProtocolState::WaitPok, WireLine::Pok(_)) => (ProtocolState::WaitCommand, Vec::new()),
            (state, line) => {
                return Err(SimError::ProtocolViolation(format!(
                    "'{}' not expected in {:?}",
                    line, state
                )));
            }
        };
        debug!(?state, ?next, "SessionMachine::on_line: advancing");
        self.phase = SessionPhase::Steady(next);
        Ok(actions)
    }

    /// Local quit: send `q` and wait for `qok`
    pub fn quit(&mut self) -> Vec<Action> {
        match self.phase {
            SessionPhase::Steady(_) => {
                info!(role = %self.role, "Sending quit to peer");
                self.phase = SessionPhase::AwaitQuitAck;
                vec![Action::Send(WireLine::Quit)]
            }
            _ => Vec::new(),
        }
    }

    /// The peer closed the connection
    pub fn on_eof(&mut self) -> SessionEnd {
        let end = match self.phase {
            SessionPhase::Closed(end) => end,
            SessionPhase::AwaitQuitAck => SessionEnd::LocalQuit,
            SessionPhase::Steady(_) => SessionEnd::Disconnected,
        };
        self.phase = SessionPhase::Closed(end);
        end
    }
}
