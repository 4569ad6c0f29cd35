//! Non-blocking driver: an async task over a receive buffer
//!
//! Every wake-up first runs the machine through all input-free states, then
//! waits on the socket, the broker's commands, heartbeat pings and the stop
//! signal at once.

use std::future;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

use super::buffer::LineBuffer;
use super::handshake::Handshake;
use super::link::{Liveness, SessionEvent, SessionLink};
use super::machine::{Action, SessionEnd, SessionMachine, SessionPhase};
use super::wire::WireLine;
use crate::error::{SimError, SimResult};
use crate::supervisor::{HeartbeatResponder, Ping, StopSignal};

const READ_CHUNK: usize = 1024;

enum Tick {
    Line(String),
    Eof,
    Quit,
}

struct AsyncSession<'a> {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    buffer: LineBuffer,
    link: SessionLink,
    responder: Option<&'a mut HeartbeatResponder>,
    stop: Option<&'a mut StopSignal>,
    stop_seen: bool,
}

async fn next_ping(responder: &mut Option<&mut HeartbeatResponder>) -> Option<Ping> {
    match responder {
        Some(r) => r.next_ping().await,
        None => future::pending().await,
    }
}

async fn stop_requested(stop: &mut Option<&mut StopSignal>) {
    match stop {
        Some(s) => s.recv().await,
        None => future::pending().await,
    }
}

impl AsyncSession<'_> {
    async fn send(&mut self, line: &WireLine) -> SimResult<()> {
        debug!(%line, "AsyncSession::send: called");
        self.writer.write_all(line.to_frame().as_bytes()).await?;
        Ok(())
    }

    async fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.link.emit(event).await {
            debug!(error = %e, "AsyncSession::emit: broker gone");
        }
    }

    async fn next(&mut self) -> SimResult<Tick> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(Tick::Line(line));
            }
            let stop_armed = !self.stop_seen;

            tokio::select! {
                read = self.reader.read(&mut chunk) => match read? {
                    0 => return Ok(Tick::Eof),
                    n => self.buffer.extend(&chunk[..n]),
                },
                ping = next_ping(&mut self.responder) => match ping {
                    Some(ping) => {
                        if let Some(r) = self.responder.as_deref()
                            && let Err(e) = r.respond(ping).await
                        {
                            debug!(error = %e, "AsyncSession::next: supervisor gone");
                        }
                    }
                    // Supervisor gone; stop polling the closed channel
                    None => self.responder = None,
                },
                _ = stop_requested(&mut self.stop), if stop_armed => {
                    info!("Stop requested");
                    self.stop_seen = true;
                    return Ok(Tick::Quit);
                }
                _ = self.link.next_command() => return Ok(Tick::Quit),
            }
        }
    }

    async fn handshake(&mut self) -> SimResult<Option<()>> {
        let mut handshake = Handshake::new(self.link.role(), self.link.proposed());
        if let Some(line) = handshake.start() {
            self.send(&line).await?;
        }
        while !handshake.is_done() {
            let line = match self.next().await? {
                Tick::Line(line) => line,
                Tick::Quit => return Ok(None),
                Tick::Eof => return Err(SimError::ChannelClosed("peer left during handshake".to_string())),
            };
            let step = handshake.on_line(&line)?;
            if let Some(size) = step.negotiated {
                self.emit(SessionEvent::Negotiated(size)).await;
            }
            if let Some(reply) = step.send {
                self.send(&reply).await?;
            }
        }
        Ok(Some(()))
    }

    async fn apply(&mut self, actions: Vec<Action>) -> SimResult<()> {
        for action in actions {
            match action {
                Action::Send(line) => self.send(&line).await?,
                Action::Remote(position) => self.emit(SessionEvent::RemoteDrone(position)).await,
                Action::Close(end) => debug!(?end, "AsyncSession::apply: closing"),
            }
        }
        Ok(())
    }

    async fn steady(&mut self) -> SimResult<SessionEnd> {
        let mut machine = SessionMachine::new(self.link.role());
        loop {
            // Do-while: drain every input-free transition before waiting
            while let Some(action) = machine.step(self.link.position()) {
                self.apply(vec![action]).await?;
            }
            if let SessionPhase::Closed(end) = machine.phase() {
                return Ok(end);
            }

            match self.next().await? {
                Tick::Line(line) => match machine.on_line(&line) {
                    Ok(actions) => self.apply(actions).await?,
                    Err(e) if e.is_recoverable() => warn!(error = %e, "Discarding peer line"),
                    Err(e) => return Err(e),
                },
                Tick::Quit => {
                    let actions = machine.quit();
                    self.apply(actions).await?;
                }
                Tick::Eof => return Ok(machine.on_eof()),
            }
        }
    }
}

/// Run a whole session on the current task
///
/// Same outcomes and the same bytes on the wire as [`super::blocking::run`].
pub async fn run(
    stream: TcpStream,
    link: SessionLink,
    liveness: Option<&mut Liveness>,
    max_line_len: usize,
) -> SimResult<SessionEnd> {
    debug!(role = %link.role(), "nonblocking::run: called");
    let (reader, writer) = stream.into_split();
    let (responder, stop) = match liveness {
        Some(l) => (Some(&mut l.responder), Some(&mut l.stop)),
        None => (None, None),
    };
    let mut session = AsyncSession {
        reader,
        writer,
        buffer: LineBuffer::new(max_line_len),
        link,
        responder,
        stop,
        stop_seen: false,
    };

    let result = match session.handshake().await {
        Ok(Some(())) => session.steady().await,
        Ok(None) => Ok(SessionEnd::LocalQuit),
        Err(e) => Err(e),
    };

    let end = match &result {
        Ok(end) => *end,
        Err(_) => SessionEnd::Failed,
    };
    session.emit(SessionEvent::Closed(end)).await;
    let _ = session.writer.shutdown().await;

    match result {
        Ok(SessionEnd::Disconnected) => Err(SimError::ChannelClosed("peer disconnected".to_string())),
        other => other,
    }
}
