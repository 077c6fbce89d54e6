//! Nodes: the machines jobs run on.
//!
//! - [`connection`]: how a node is reached and what each connection type requires
//! - [`state`]: the [`Node`] entity and its guarded status / running-job count
//! - [`registry`]: the name-keyed [`NodeRegistry`] filled by the loader

pub mod connection;
pub mod registry;
pub mod state;

pub use connection::{Connection, ConnectionOptions, ConnectionType};
pub use registry::{NodeRegistry, NodeSink};
pub use state::{Node, NodeSnapshot, NodeStatus};
