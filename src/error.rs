use std::path::PathBuf;

use thiserror::Error;

/// Why a node or job declaration was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("name is empty")]
    EmptyName,

    #[error("invalid connection type {0:?} (must be either local or ssh)")]
    UnknownConnectionType(String),
}

#[derive(Error, Debug)]
pub enum DistrunError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ValidationError),

    #[error("Node {node} is unreachable: {reason}")]
    Unreachable { node: String, reason: String },

    #[error("Transport to node {node} failed: {reason}")]
    TransportFailed { node: String, reason: String },

    #[error("Command failed on node {node}: {reason}")]
    ExecutionFailed {
        node: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Node {node} already runs {limit} jobs")]
    NodeBusyLimitExceeded { node: String, limit: u32 },

    #[error("Node {node} lacks required role {role}")]
    MissingRole { node: String, role: String },

    #[error("Duplicate name: {0}")]
    Duplicate(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Error parsing file {}: {source}", .file.display())]
    Load {
        file: PathBuf,
        #[source]
        source: Box<DistrunError>,
    },

    #[error("Malformed declaration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DistrunError {
    /// Whether this error moves a node to `down` when it comes out of a dispatch.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            DistrunError::TransportFailed { .. } | DistrunError::Unreachable { .. }
        )
    }

    /// Innermost cause of a load error, for callers matching on the validation reason.
    pub fn root_cause(&self) -> &DistrunError {
        match self {
            DistrunError::Load { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DistrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_file_and_cause() {
        let err = DistrunError::Load {
            file: PathBuf::from("/etc/distrun/nodes/db1.json"),
            source: Box::new(ValidationError::MissingField("ssh_user").into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("db1.json"));
        assert!(msg.contains("ssh_user"));
        assert!(matches!(
            err.root_cause(),
            DistrunError::InvalidConfiguration(ValidationError::MissingField("ssh_user"))
        ));
    }

    #[test]
    fn test_transport_failures_are_classified() {
        let failed = DistrunError::TransportFailed {
            node: "db1".into(),
            reason: "connection refused".into(),
        };
        let exec = DistrunError::ExecutionFailed {
            node: "db1".into(),
            exit_code: Some(1),
            reason: "exit code 1".into(),
        };
        assert!(failed.is_transport_failure());
        assert!(!exec.is_transport_failure());
    }
}
