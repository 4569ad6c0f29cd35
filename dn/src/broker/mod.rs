//! The blackboard broker
//!
//! One task owns the [`WorldState`] and routes typed messages between the
//! drone, obstacle, target and input workers. When networked it also feeds
//! the local drone position to the session and turns the peer's drone into
//! an obstacle.

mod config;
mod core;
mod state;

pub use config::BrokerConfig;
pub use core::{BROKER_TAG, Broker};
pub use state::WorldState;
