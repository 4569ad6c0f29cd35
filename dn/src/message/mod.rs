//! Typed messages and their local transport
//!
//! Workers talk to the broker through [`WorkerPort`]s. Every message is
//! carried as one or two [`Frame`]s (see [`envelope`] for the layout).

pub mod envelope;
mod port;
mod types;

pub use envelope::{Envelope, Frame, FrameDecoder, MessageKind, decode_envelope};
pub use port::{BrokerLink, WorkerPort, WorkerRole, port_pair};
pub use types::{Message, Point, Position, WindowSize};
