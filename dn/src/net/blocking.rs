//! Blocking driver: one OS thread, one line read per step
//!
//! Reads use a short timeout so the thread can answer heartbeat pings and
//! notice stop requests between lines. A thread stuck anywhere else misses
//! its deadline like any other worker.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::buffer::LineBuffer;
use super::handshake::Handshake;
use super::link::{Liveness, SessionEvent, SessionLink};
use super::machine::{Action, SessionEnd, SessionMachine, SessionPhase};
use super::wire::WireLine;
use crate::error::{SimError, SimResult};

const READ_CHUNK: usize = 1024;

/// What one read attempt produced
#[derive(Debug, PartialEq)]
pub enum ReadOutcome {
    Line(String),
    /// Timed out without a complete line
    Idle,
    Eof,
}

/// Line reader over a socket with a read timeout
#[derive(Debug)]
pub struct LineReader {
    stream: TcpStream,
    buffer: LineBuffer,
}

impl LineReader {
    pub fn new(stream: TcpStream, max_line_len: usize, timeout: Duration) -> SimResult<Self> {
        stream.set_read_timeout(Some(timeout))?;
        Ok(Self {
            stream,
            buffer: LineBuffer::new(max_line_len),
        })
    }

    /// Return a buffered line, or read until one arrives, the timeout fires or the peer closes
    pub fn read_line(&mut self) -> SimResult<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(ReadOutcome::Line(line));
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(ReadOutcome::Idle);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

enum Tick {
    Line(String),
    Eof,
    /// Supervisor stop or broker quit, reported once each
    Quit,
}

struct BlockingSession<'a> {
    reader: LineReader,
    writer: TcpStream,
    link: SessionLink,
    liveness: Option<&'a mut Liveness>,
    stop_seen: bool,
}

impl BlockingSession<'_> {
    fn send(&mut self, line: &WireLine) -> SimResult<()> {
        debug!(%line, "BlockingSession::send: called");
        self.writer.write_all(line.to_frame().as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.link.emit_blocking(event) {
            debug!(error = %e, "BlockingSession::emit: broker gone");
        }
    }

    /// Answer pending pings; reports a stop request the first time it is seen
    fn service(&mut self) -> bool {
        let Some(liveness) = self.liveness.as_deref_mut() else {
            return false;
        };
        while let Some(ping) = liveness.responder.try_next_ping() {
            if let Err(e) = liveness.responder.respond_blocking(ping) {
                debug!(error = %e, "BlockingSession::service: supervisor gone");
                break;
            }
        }
        if !self.stop_seen && liveness.stop.is_fired() {
            self.stop_seen = true;
            return true;
        }
        false
    }

    fn next(&mut self) -> SimResult<Tick> {
        loop {
            if self.service() {
                info!("Stop requested");
                return Ok(Tick::Quit);
            }
            if self.link.try_command().is_some() {
                return Ok(Tick::Quit);
            }
            match self.reader.read_line()? {
                ReadOutcome::Line(line) => return Ok(Tick::Line(line)),
                ReadOutcome::Eof => return Ok(Tick::Eof),
                ReadOutcome::Idle => continue,
            }
        }
    }

    /// Negotiate the window size; `None` if asked to stop first
    fn handshake(&mut self) -> SimResult<Option<()>> {
        let mut handshake = Handshake::new(self.link.role(), self.link.proposed());
        if let Some(line) = handshake.start() {
            self.send(&line)?;
        }
        while !handshake.is_done() {
            let line = match self.next()? {
                Tick::Line(line) => line,
                Tick::Quit => return Ok(None),
                Tick::Eof => return Err(SimError::ChannelClosed("peer left during handshake".to_string())),
            };
            let step = handshake.on_line(&line)?;
            if let Some(size) = step.negotiated {
                self.emit(SessionEvent::Negotiated(size));
            }
            if let Some(reply) = step.send {
                self.send(&reply)?;
            }
        }
        Ok(Some(()))
    }

    fn apply(&mut self, actions: Vec<Action>) -> SimResult<()> {
        for action in actions {
            match action {
                Action::Send(line) => self.send(&line)?,
                Action::Remote(position) => self.emit(SessionEvent::RemoteDrone(position)),
                Action::Close(end) => debug!(?end, "BlockingSession::apply: closing"),
            }
        }
        Ok(())
    }

    fn steady(&mut self) -> SimResult<SessionEnd> {
        let mut machine = SessionMachine::new(self.link.role());
        loop {
            while let Some(action) = machine.step(self.link.position()) {
                self.apply(vec![action])?;
            }
            if let SessionPhase::Closed(end) = machine.phase() {
                return Ok(end);
            }

            match self.next()? {
                Tick::Line(line) => match machine.on_line(&line) {
                    Ok(actions) => self.apply(actions)?,
                    Err(e) if e.is_recoverable() => warn!(error = %e, "Discarding peer line"),
                    Err(e) => return Err(e),
                },
                Tick::Quit => {
                    let actions = machine.quit();
                    self.apply(actions)?;
                }
                Tick::Eof => return Ok(machine.on_eof()),
            }
        }
    }
}

/// Run a whole session on the calling thread
///
/// A mid-session disconnect or a failed handshake is an error; every way out
/// is also reported to the broker as [`SessionEvent::Closed`].
pub fn run(
    stream: TcpStream,
    link: SessionLink,
    liveness: Option<&mut Liveness>,
    max_line_len: usize,
    poll_interval: Duration,
) -> SimResult<SessionEnd> {
    debug!(role = %link.role(), "blocking::run: called");
    let writer = stream.try_clone()?;
    let reader = LineReader::new(stream, max_line_len, poll_interval)?;
    let mut session = BlockingSession {
        reader,
        writer,
        link,
        liveness,
        stop_seen: false,
    };

    let result = match session.handshake() {
        Ok(Some(())) => session.steady(),
        Ok(None) => Ok(SessionEnd::LocalQuit),
        Err(e) => Err(e),
    };

    let end = match &result {
        Ok(end) => *end,
        Err(_) => SessionEnd::Failed,
    };
    session.emit(SessionEvent::Closed(end));
    let _ = session.writer.shutdown(Shutdown::Both);

    match result {
        Ok(SessionEnd::Disconnected) => Err(SimError::ChannelClosed("peer disconnected".to_string())),
        other => other,
    }
}
