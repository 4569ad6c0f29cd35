//! Line tokens of the peer protocol
//!
//! Every line is ASCII, space separated and `\n` terminated. Coordinates are
//! written with six decimals.

use std::fmt;
use std::str::FromStr;

use crate::error::{SimError, SimResult};
use crate::message::{Position, WindowSize};

/// One protocol line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireLine {
    Ok,
    Ook,
    Size(WindowSize),
    Sok(WindowSize),
    Drone,
    Obst,
    Quit,
    QuitAck,
    Dok(Position),
    Pok(Position),
    /// Bare `<x> <y>` drone data
    Coords(Position),
}

fn number<T: FromStr>(token: &str, line: &str) -> SimResult<T> {
    token
        .parse()
        .map_err(|_| SimError::Parse(format!("bad number {:?} in {:?}", token, line)))
}

fn size(w: &str, h: &str, line: &str) -> SimResult<WindowSize> {
    Ok(WindowSize::new(number(w, line)?, number(h, line)?))
}

fn coords(x: &str, y: &str, line: &str) -> SimResult<Position> {
    Ok(Position::new(number(x, line)?, number(y, line)?))
}

impl WireLine {
    /// Parse a line without its terminator
    pub fn parse(line: &str) -> SimResult<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["ok"] => Ok(WireLine::Ok),
            ["ook"] => Ok(WireLine::Ook),
            ["drone"] => Ok(WireLine::Drone),
            ["obst"] => Ok(WireLine::Obst),
            ["q"] => Ok(WireLine::Quit),
            ["qok"] => Ok(WireLine::QuitAck),
            ["size", w, h] => Ok(WireLine::Size(size(w, h, line)?)),
            ["sok", w, h] => Ok(WireLine::Sok(size(w, h, line)?)),
            ["dok", x, y] => Ok(WireLine::Dok(coords(x, y, line)?)),
            ["pok", x, y] => Ok(WireLine::Pok(coords(x, y, line)?)),
            [x, y] => Ok(WireLine::Coords(coords(x, y, line)?)),
            [] => Err(SimError::ProtocolViolation("empty line".to_string())),
            _ => Err(SimError::ProtocolViolation(format!("unexpected line {:?}", line))),
        }
    }

    /// Leading keyword, used in handshake error reports
    pub fn keyword(&self) -> &'static str {
        match self {
            WireLine::Ok => "ok",
            WireLine::Ook => "ook",
            WireLine::Size(_) => "size",
            WireLine::Sok(_) => "sok",
            WireLine::Drone => "drone",
            WireLine::Obst => "obst",
            WireLine::Quit => "q",
            WireLine::QuitAck => "qok",
            WireLine::Dok(_) => "dok",
            WireLine::Pok(_) => "pok",
            WireLine::Coords(_) => "<x> <y>",
        }
    }

    /// The line with its terminator, ready to write
    pub fn to_frame(&self) -> String {
        frame_line(&self.to_string())
    }
}

impl fmt::Display for WireLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireLine::Size(s) => write!(f, "size {} {}", s.width, s.height),
            WireLine::Sok(s) => write!(f, "sok {} {}", s.width, s.height),
            WireLine::Dok(p) => write!(f, "dok {:.6} {:.6}", p.x, p.y),
            WireLine::Pok(p) => write!(f, "pok {:.6} {:.6}", p.x, p.y),
            WireLine::Coords(p) => write!(f, "{:.6} {:.6}", p.x, p.y),
            other => f.write_str(other.keyword()),
        }
    }
}

impl FromStr for WireLine {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        WireLine::parse(s)
    }
}

/// Append the line terminator unless it is already there
pub fn frame_line(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}
