//! Job dispatcher for datadam.
//!
//! Payloads are hashed by routing key onto one of N regular lanes, batched
//! per lane and applied through the lane's own backend connection. A
//! separate DDL lane runs schema changes behind a global barrier.

pub mod dispatcher;
pub mod error;
mod job;
mod lane;

pub use dispatcher::{Dispatcher, DispatcherSettings, Lanes};
pub use error::DispatchError;
pub use lane::{LaneReport, LaneRole};
