//! Local transport encoding
//!
//! Every message travels as an [`Envelope`]: a kind tag plus a text payload.
//! OBSTACLES and TARGETS carry only `"<count>"` in the envelope; the points
//! follow as a second, immediately-following [`Frame::Points`] transfer.
//!
//! | kind      | payload                  |
//! |-----------|--------------------------|
//! | SIZE      | `"<w> <h>"`              |
//! | POSITION  | `"<x> <y>"` (`%f`)       |
//! | FORCE     | eight `%f` values        |
//! | OBSTACLES | `"<count>"` + points     |
//! | TARGETS   | `"<count>"` + points     |
//! | INPUT     | one character            |
//! | PID       | `"<pid>"`                |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{Message, Point, Position, WindowSize};
use crate::error::{SimError, SimResult};

/// Envelope type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Size,
    Position,
    Force,
    Obstacles,
    Targets,
    Input,
    Pid,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Size => "SIZE",
            MessageKind::Position => "POSITION",
            MessageKind::Force => "FORCE",
            MessageKind::Obstacles => "OBSTACLES",
            MessageKind::Targets => "TARGETS",
            MessageKind::Input => "INPUT",
            MessageKind::Pid => "PID",
        }
    }

    /// Kinds whose envelope is followed by a points transfer
    pub fn carries_points(&self) -> bool {
        matches!(self, MessageKind::Obstacles | MessageKind::Targets)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIZE" => Ok(MessageKind::Size),
            "POSITION" => Ok(MessageKind::Position),
            "FORCE" => Ok(MessageKind::Force),
            "OBSTACLES" => Ok(MessageKind::Obstacles),
            "TARGETS" => Ok(MessageKind::Targets),
            "INPUT" => Ok(MessageKind::Input),
            "PID" => Ok(MessageKind::Pid),
            other => Err(SimError::ProtocolViolation(format!("unknown message kind {}", other))),
        }
    }
}

/// Fixed-shape record: kind tag plus text payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: MessageKind,
    pub data: String,
}

impl Envelope {
    pub fn new(kind: MessageKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }
}

/// One transfer on a local channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Envelope(Envelope),
    Points(Vec<Point>),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Size(_) => MessageKind::Size,
            Message::Position(_) => MessageKind::Position,
            Message::Force(_) => MessageKind::Force,
            Message::Obstacles(_) => MessageKind::Obstacles,
            Message::Targets(_) => MessageKind::Targets,
            Message::Input(_) => MessageKind::Input,
            Message::Pid(_) => MessageKind::Pid,
        }
    }

    /// Encode into the transfers that make up this message, in send order
    pub fn to_frames(&self) -> Vec<Frame> {
        let kind = self.kind();
        match self {
            Message::Size(size) => vec![Frame::Envelope(Envelope::new(
                kind,
                format!("{} {}", size.width, size.height),
            ))],
            Message::Position(p) => vec![Frame::Envelope(Envelope::new(kind, format!("{:.6} {:.6}", p.x, p.y)))],
            Message::Force(values) => {
                let data = values.iter().map(|v| format!("{:.6}", v)).collect::<Vec<_>>().join(" ");
                vec![Frame::Envelope(Envelope::new(kind, data))]
            }
            Message::Obstacles(points) | Message::Targets(points) => vec![
                Frame::Envelope(Envelope::new(kind, points.len().to_string())),
                Frame::Points(points.clone()),
            ],
            Message::Input(c) => vec![Frame::Envelope(Envelope::new(kind, c.to_string()))],
            Message::Pid(pid) => vec![Frame::Envelope(Envelope::new(kind, pid.to_string()))],
        }
    }
}

fn parse_numbers<T: FromStr, const N: usize>(data: &str) -> SimResult<[T; N]>
where
    T: Copy + Default,
{
    let mut out = [T::default(); N];
    let mut parts = data.split_whitespace();
    for slot in out.iter_mut() {
        let token = parts
            .next()
            .ok_or_else(|| SimError::Parse(format!("expected {} values in {:?}", N, data)))?;
        *slot = token
            .parse()
            .map_err(|_| SimError::Parse(format!("bad number {:?} in {:?}", token, data)))?;
    }
    if parts.next().is_some() {
        return Err(SimError::Parse(format!("trailing values in {:?}", data)));
    }
    Ok(out)
}

/// Decode an envelope that is complete on its own (every kind but OBSTACLES/TARGETS)
pub fn decode_envelope(envelope: &Envelope) -> SimResult<Message> {
    let data = envelope.data.as_str();
    match envelope.kind {
        MessageKind::Size => {
            let [w, h] = parse_numbers::<i32, 2>(data)?;
            Ok(Message::Size(WindowSize::new(w, h)))
        }
        MessageKind::Position => {
            let [x, y] = parse_numbers::<f32, 2>(data)?;
            Ok(Message::Position(Position::new(x, y)))
        }
        MessageKind::Force => Ok(Message::Force(parse_numbers::<f32, 8>(data)?)),
        MessageKind::Input => data
            .chars()
            .next()
            .map(Message::Input)
            .ok_or_else(|| SimError::Parse("empty input payload".to_string())),
        MessageKind::Pid => {
            let [pid] = parse_numbers::<u32, 1>(data)?;
            Ok(Message::Pid(pid))
        }
        MessageKind::Obstacles | MessageKind::Targets => Err(SimError::ProtocolViolation(format!(
            "{} envelope needs its points transfer",
            envelope.kind
        ))),
    }
}

/// Reassembles messages from a stream of frames
///
/// A count envelope arms the decoder; the very next frame must be the
/// matching points transfer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Option<(MessageKind, usize)>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a count envelope is waiting for its points
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one frame; returns a message once one is complete
    pub fn push(&mut self, frame: Frame) -> SimResult<Option<Message>> {
        match (self.pending.take(), frame) {
            (None, Frame::Envelope(env)) if env.kind.carries_points() => {
                let [count] = parse_numbers::<usize, 1>(&env.data)?;
                self.pending = Some((env.kind, count));
                Ok(None)
            }
            (None, Frame::Envelope(env)) => decode_envelope(&env).map(Some),
            (None, Frame::Points(points)) => Err(SimError::ProtocolViolation(format!(
                "points transfer of {} without a count envelope",
                points.len()
            ))),
            (Some((kind, count)), Frame::Points(points)) => {
                if points.len() != count {
                    return Err(SimError::ProtocolViolation(format!(
                        "{} announced {} points, got {}",
                        kind,
                        count,
                        points.len()
                    )));
                }
                Ok(Some(match kind {
                    MessageKind::Obstacles => Message::Obstacles(points),
                    _ => Message::Targets(points),
                }))
            }
            (Some((kind, _)), Frame::Envelope(env)) => Err(SimError::ProtocolViolation(format!(
                "{} envelope arrived while {} points were expected",
                env.kind, kind
            ))),
        }
    }
}
