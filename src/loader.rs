//! Loading node and job declarations from a directory.
//!
//! Each regular file below the directory holds one JSON declaration; the file stem
//! becomes the node or job name (`nodes/db1.json` declares node `db1`). Hidden files and
//! directories are skipped. Subdirectories are walked in file-name order.
//!
//! A load stops at the first file that cannot be read, parsed, validated or inserted and
//! returns [`DistrunError::Load`] naming that file. Entries inserted before the failure
//! are kept, so a failed load leaves the target registry unusable.

use std::path::Path;

use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::error::{DistrunError, Result, ValidationError};
use crate::job::{Job, JobRegistry};
use crate::node::{Connection, ConnectionOptions, ConnectionType, Node, NodeSink};
use crate::transport::TransportFactory;

/// Contents of a node declaration file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeDeclaration {
    pub roles: Vec<String>,
    pub connection_type: Option<String>,
    pub connection_options: ConnectionOptions,
}

impl NodeDeclaration {
    /// Validate the declaration and bind a transport for it.
    ///
    /// Checks run in order: connection type, name, connection options.
    pub fn into_node(
        self,
        name: &str,
        factory: &TransportFactory,
    ) -> std::result::Result<Node, ValidationError> {
        let kind = match self.connection_type.as_deref() {
            None | Some("") => return Err(ValidationError::MissingField("connection_type")),
            Some(kind) => kind.parse::<ConnectionType>()?,
        };
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let connection = Connection::new(kind, self.connection_options)?;
        let transport = factory.bind(&connection);
        Node::new(name, self.roles, connection, transport)
    }
}

/// Contents of a job declaration file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobDeclaration {
    pub command: String,
    pub description: Option<String>,
    pub roles: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl JobDeclaration {
    /// A declared timeout below one second is raised to one second.
    pub fn into_job(self, name: &str) -> std::result::Result<Job, ValidationError> {
        let job = Job {
            name: name.to_string(),
            command: self.command,
            description: self.description,
            roles: self.roles,
            timeout_secs: self.timeout_secs.map(|secs| secs.max(1)),
        };
        job.validate()?;
        Ok(job)
    }
}

/// Reads node declarations and hands them to a [`NodeSink`].
#[derive(Debug, Clone, Default)]
pub struct NodeReader {
    factory: TransportFactory,
    fill_ssh_defaults: bool,
}

impl NodeReader {
    pub fn new(factory: TransportFactory) -> Self {
        Self {
            factory,
            fill_ssh_defaults: false,
        }
    }

    /// Fill empty ssh host/user/key fields with conventional values before validation.
    /// Meant for previewing incomplete declarations, not for production loads.
    pub fn with_ssh_defaults(mut self) -> Self {
        self.fill_ssh_defaults = true;
        self
    }

    /// Load every declaration under `dir` into `sink`. Returns the number of nodes added.
    pub fn read_from_directory(&self, dir: &Path, sink: &mut impl NodeSink) -> Result<usize> {
        tracing::info!(dir = %dir.display(), "Reading node configuration");
        let count = for_each_declaration(dir, |name, contents| {
            let mut decl: NodeDeclaration = serde_json::from_slice(contents)?;
            if self.fill_ssh_defaults {
                if let Some(Ok(kind)) = decl.connection_type.as_deref().map(str::parse::<ConnectionType>) {
                    decl.connection_options.apply_defaults(kind);
                }
            }
            let node = decl.into_node(name, &self.factory)?;
            sink.add_node(node)
        })?;
        tracing::info!(count, "Node configuration loaded");
        Ok(count)
    }
}

/// Reads job declarations into a [`JobRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JobReader;

impl JobReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_from_directory(&self, dir: &Path, registry: &mut JobRegistry) -> Result<usize> {
        tracing::info!(dir = %dir.display(), "Reading job configuration");
        let count = for_each_declaration(dir, |name, contents| {
            let decl: JobDeclaration = serde_json::from_slice(contents)?;
            registry.add_job(decl.into_job(name)?)
        })?;
        tracing::info!(count, "Job configuration loaded");
        Ok(count)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Call `handle(name, contents)` for each declaration file under `dir`, stopping at the
/// first error.
fn for_each_declaration<F>(dir: &Path, mut handle: F) -> Result<usize>
where
    F: FnMut(&str, &[u8]) -> Result<()>,
{
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    let mut count = 0;
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let wrap = |source: DistrunError| DistrunError::Load {
            file: path.to_path_buf(),
            source: Box::new(source),
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let contents = std::fs::read(path).map_err(|e| wrap(e.into()))?;

        handle(&name, &contents).map_err(wrap)?;
        tracing::debug!(file = %path.display(), name = %name, "Declaration loaded");
        count += 1;
    }
    Ok(count)
}
