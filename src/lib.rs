pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod loader;
pub mod node;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use error::{DistrunError, Result};
