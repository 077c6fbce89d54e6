use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DistrunError, Result, ValidationError};

/// A resolved command ready to be dispatched to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Roles a node must carry to run this job.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Job {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            description: None,
            roles: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.command.trim().is_empty() {
            return Err(ValidationError::MissingField("command"));
        }
        Ok(())
    }
}

/// Jobs known to this process, keyed by name.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job. Names are unique; a second job with the same name is rejected.
    pub fn add_job(&mut self, job: Job) -> Result<()> {
        if self.jobs.contains_key(&job.name) {
            return Err(DistrunError::Duplicate(job.name));
        }
        tracing::debug!(job = %job.name, "Job registered");
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// All jobs sorted by name.
    pub fn all_jobs(&self) -> Vec<&Job> {
        self.jobs.values().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new("backup", "pg_dump app > /backups/app.sql");
        assert_eq!(job.name, "backup");
        assert!(job.roles.is_empty());
        assert!(job.timeout().is_none());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_job_requires_command() {
        let job = Job::new("backup", "   ");
        assert_eq!(job.validate(), Err(ValidationError::MissingField("command")));
        let job = Job::new("", "true");
        assert_eq!(job.validate(), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_job_timeout_rounds_up_to_a_second() {
        let job = Job::new("quick", "true").with_timeout(Duration::from_millis(10));
        assert_eq!(job.timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = JobRegistry::new();
        registry.add_job(Job::new("backup", "true")).unwrap();
        let err = registry.add_job(Job::new("backup", "false")).unwrap_err();
        assert!(matches!(err, DistrunError::Duplicate(name) if name == "backup"));
        assert_eq!(registry.get("backup").unwrap().command, "true");
    }

    #[test]
    fn test_registry_lists_jobs_by_name() {
        let mut registry = JobRegistry::new();
        registry.add_job(Job::new("rotate-logs", "true")).unwrap();
        registry.add_job(Job::new("backup", "true")).unwrap();
        let names: Vec<&str> = registry.all_jobs().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["backup", "rotate-logs"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
