//! Dispatch and health coordination for nodes.
//!
//! All writes to a node's status and running-job count go through this module.
//!
//! # Components
//!
//! - [`Dispatcher`]: reserves a slot on a node, runs a job through the node's
//!   transport, marks the node down on transport failure and always releases the slot
//! - [`health_check`]: probes one node and moves it between `up` and `down`
//! - [`HealthMonitor`]: probes every registered node on an interval
//!
//! # Locking
//!
//! Each node owns one readers-writer guard over its status and running-job count.
//! Status reads share it; every write is exclusive. Nothing locks across nodes, and no
//! guard is held while a command or probe is running.

pub mod dispatch;
pub mod health;

pub use dispatch::{DispatchPolicy, Dispatcher, JobRun};
pub use health::{health_check, HealthMonitor, MIN_HEALTH_INTERVAL};
