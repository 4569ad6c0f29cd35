//! Session negotiation, before the steady-state machine starts
//!
//! Initiator: `ok` -> expect `ook` -> `size W H` -> expect `sok W H`.
//! Responder: expect `ok` -> `ook` -> expect `size W H` -> `sok W H`.
//! The initiator adopts whatever size the responder echoes.

use tracing::{debug, info};

use super::machine::SessionRole;
use super::wire::WireLine;
use crate::error::{SimError, SimResult};
use crate::message::WindowSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    AwaitOok,
    AwaitSok,
    AwaitOk,
    AwaitSize,
    Done,
}

/// Result of feeding one line to the handshake
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandshakeStep {
    /// Size agreed on; report it before sending `send`
    pub negotiated: Option<WindowSize>,
    /// Line to write to the peer
    pub send: Option<WireLine>,
}

#[derive(Debug, Clone)]
pub struct Handshake {
    role: SessionRole,
    proposed: WindowSize,
    stage: Stage,
    negotiated: Option<WindowSize>,
}

impl Handshake {
    /// `proposed` is only used by the initiator
    pub fn new(role: SessionRole, proposed: WindowSize) -> Self {
        debug!(%role, ?proposed, "Handshake::new: called");
        let stage = match role {
            SessionRole::Initiator => Stage::Start,
            SessionRole::Responder => Stage::AwaitOk,
        };
        Self {
            role,
            proposed,
            stage,
            negotiated: None,
        }
    }

    /// Opening line, if this role speaks first
    pub fn start(&mut self) -> Option<WireLine> {
        match self.stage {
            Stage::Start => {
                self.stage = Stage::AwaitOok;
                Some(WireLine::Ok)
            }
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn negotiated(&self) -> Option<WindowSize> {
        self.negotiated
    }

    /// Feed one received line; any unexpected token aborts the handshake
    pub fn on_line(&mut self, line: &str) -> SimResult<HandshakeStep> {
        debug!(role = %self.role, stage = ?self.stage, %line, "Handshake::on_line: called");
        let parsed = WireLine::parse(line).ok();
        match (self.stage, parsed) {
            (Stage::AwaitOok, Some(WireLine::Ook)) => {
                self.stage = Stage::AwaitSok;
                Ok(HandshakeStep {
                    negotiated: None,
                    send: Some(WireLine::Size(self.proposed)),
                })
            }
            (Stage::AwaitSok, Some(WireLine::Sok(size))) if valid(size) => {
                self.finish(size);
                Ok(HandshakeStep {
                    negotiated: Some(size),
                    send: None,
                })
            }
            (Stage::AwaitOk, Some(WireLine::Ok)) => {
                self.stage = Stage::AwaitSize;
                Ok(HandshakeStep {
                    negotiated: None,
                    send: Some(WireLine::Ook),
                })
            }
            (Stage::AwaitSize, Some(WireLine::Size(size))) if valid(size) => {
                self.finish(size);
                Ok(HandshakeStep {
                    negotiated: Some(size),
                    send: Some(WireLine::Sok(size)),
                })
            }
            (stage, _) => Err(SimError::Handshake {
                expected: expected(stage).to_string(),
                received: line.to_string(),
            }),
        }
    }

    fn finish(&mut self, size: WindowSize) {
        info!(role = %self.role, width = size.width, height = size.height, "Handshake complete");
        self.stage = Stage::Done;
        self.negotiated = Some(size);
    }
}

fn valid(size: WindowSize) -> bool {
    size.width > 0 && size.height > 0
}

fn expected(stage: Stage) -> &'static str {
    match stage {
        Stage::Start => "<nothing before ok is sent>",
        Stage::AwaitOok => "ook",
        Stage::AwaitSok => "sok <W> <H>",
        Stage::AwaitOk => "ok",
        Stage::AwaitSize => "size <W> <H>",
        Stage::Done => "<nothing after handshake>",
    }
}
