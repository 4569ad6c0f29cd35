//! dronenet - supervised drone simulation core
//!
//! The process-level plumbing of a two-instance drone simulation: a
//! heartbeat watchdog that shuts everything down when a unit goes silent, a
//! blackboard broker that routes world state between workers, and a
//! line-oriented TCP session that keeps two instances' drones in sync.
//!
//! # Modules
//!
//! - [`supervisor`] - Heartbeat polling, worker registry and shutdown
//! - [`broker`] - World state and message routing
//! - [`message`] - Typed messages and their envelope framing
//! - [`net`] - Peer handshake, session state machine and its two drivers
//! - [`app`] - Wiring of one instance
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod app;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod message;
pub mod net;
pub mod supervisor;

pub use error::{SimError, SimResult};
