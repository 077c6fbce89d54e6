
use distrun::error::{DistrunError, ValidationError};
use distrun::job::JobRegistry;
use distrun::loader::{JobReader, NodeReader};
use distrun::node::{ConnectionType, NodeRegistry, NodeStatus};
use test_harness::{factory_with, local_declaration, ssh_declaration, write_file, FakeShell};

fn reader() -> NodeReader {
    NodeReader::new(factory_with(FakeShell::new()))
}

fn load_error_file(err: &DistrunError) -> String {
    match err {
        DistrunError::Load { file, .. } => file.file_name().unwrap().to_string_lossy().to_string(),
        other => panic!("expected a load error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_loads_local_and_ssh_nodes() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "web1.json", &local_declaration(&["web", "cron"]));
    write_file(
        dir.path(),
        "db1.json",
        &ssh_declaration(&["db"], "10.0.0.5", "deploy", "/keys/id_rsa"),
    );

    let mut registry = NodeRegistry::new();
    let count = reader().read_from_directory(dir.path(), &mut registry).unwrap();
    assert_eq!(count, 2);

    let web1 = registry.get("web1").unwrap();
    assert_eq!(web1.connection().kind(), ConnectionType::Local);
    assert_eq!(web1.roles(), ["web".to_string(), "cron".to_string()]);
    assert_eq!(web1.status().await, NodeStatus::Up);
    assert_eq!(web1.running_jobs().await, 0);

    let db1 = registry.get("db1").unwrap();
    assert_eq!(db1.connection().kind(), ConnectionType::Ssh);
    let opts = db1.connection().options();
    assert_eq!(opts.ssh_host, "10.0.0.5");
    assert_eq!(opts.ssh_user, "deploy");
    assert_eq!(opts.ssh_private_key_file, "/keys/id_rsa");
}

#[test]
fn test_skips_hidden_files_and_directories() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "web1.json", &local_declaration(&[]));
    write_file(dir.path(), ".web1.json.swp", "not json at all");
    write_file(dir.path(), ".git/config", "[core]");

    let mut registry = NodeRegistry::new();
    let count = reader().read_from_directory(dir.path(), &mut registry).unwrap();
    assert_eq!(count, 1);
    assert!(registry.get("web1").is_some());
}

#[test]
fn test_recurses_into_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "fra1/web1.json", &local_declaration(&["web"]));
    write_file(dir.path(), "ams1/web2.json", &local_declaration(&["web"]));
    write_file(dir.path(), "db1.json", &local_declaration(&["db"]));

    let mut registry = NodeRegistry::new();
    reader().read_from_directory(dir.path(), &mut registry).unwrap();

    let names: Vec<String> = registry
        .all_nodes()
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(names, vec!["db1", "web1", "web2"]);
}

#[test]
fn test_invalid_declaration_names_file_and_field() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a-web1.json", &local_declaration(&[]));
    write_file(
        dir.path(),
        "b-db1.json",
        &serde_json::json!({
            "connection_type": "ssh",
            "connection_options": {"ssh_host": "10.0.0.5", "ssh_private_key_file": "/keys/id_rsa"},
        })
        .to_string(),
    );

    let mut registry = NodeRegistry::new();
    let err = reader()
        .read_from_directory(dir.path(), &mut registry)
        .unwrap_err();

    assert_eq!(load_error_file(&err), "b-db1.json");
    assert!(matches!(
        err.root_cause(),
        DistrunError::InvalidConfiguration(ValidationError::MissingField("ssh_user"))
    ));
    let message = err.to_string();
    assert!(message.contains("b-db1.json"), "message: {message}");
    assert!(message.contains("ssh_user"), "message: {message}");
}

#[test]
fn test_unknown_connection_type_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "web1.json", r#"{"connection_type": "winrm"}"#);

    let mut registry = NodeRegistry::new();
    let err = reader()
        .read_from_directory(dir.path(), &mut registry)
        .unwrap_err();
    assert_eq!(load_error_file(&err), "web1.json");
    assert!(matches!(
        err.root_cause(),
        DistrunError::InvalidConfiguration(ValidationError::UnknownConnectionType(kind)) if kind == "winrm"
    ));
}

#[test]
fn test_malformed_json_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "web1.json", "{\"connection_type\": ");

    let mut registry = NodeRegistry::new();
    let err = reader()
        .read_from_directory(dir.path(), &mut registry)
        .unwrap_err();
    assert_eq!(load_error_file(&err), "web1.json");
    assert!(matches!(err.root_cause(), DistrunError::Parse(_)));
}

#[test]
fn test_duplicate_names_across_directories_fail_load() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a/web1.json", &local_declaration(&["web"]));
    write_file(dir.path(), "b/web1.json", &local_declaration(&["cron"]));

    let mut registry = NodeRegistry::new();
    let err = reader()
        .read_from_directory(dir.path(), &mut registry)
        .unwrap_err();

    match &err {
        DistrunError::Load { file, .. } => assert!(file.ends_with("b/web1.json")),
        other => panic!("expected a load error, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), DistrunError::Duplicate(name) if name == "web1"));
}

#[test]
fn test_missing_directory_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = NodeRegistry::new();
    let result = reader().read_from_directory(&dir.path().join("absent"), &mut registry);
    assert!(result.is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_loads_jobs() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "backup.json",
        r#"{"command": "pg_dump app", "roles": ["db"], "timeout_secs": 600, "schedule": "@daily"}"#,
    );
    write_file(dir.path(), "rotate-logs.json", r#"{"command": "logrotate /etc/logrotate.conf"}"#);

    let mut jobs = JobRegistry::new();
    let count = JobReader::new()
        .read_from_directory(dir.path(), &mut jobs)
        .unwrap();
    assert_eq!(count, 2);

    let backup = jobs.get("backup").unwrap();
    assert_eq!(backup.command, "pg_dump app");
    assert_eq!(backup.roles, vec!["db".to_string()]);
    assert_eq!(backup.timeout_secs, Some(600));
}

#[test]
fn test_zero_job_timeout_is_raised_to_one_second() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "noop.json", r#"{"command": "true", "timeout_secs": 0}"#);

    let mut jobs = JobRegistry::new();
    JobReader::new()
        .read_from_directory(dir.path(), &mut jobs)
        .unwrap();

    let noop = jobs.get("noop").unwrap();
    assert_eq!(noop.timeout_secs, Some(1));
    assert_eq!(noop.timeout(), Some(std::time::Duration::from_secs(1)));
}

#[test]
fn test_job_without_command_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "backup.json", r#"{"description": "nightly dump"}"#);

    let mut jobs = JobRegistry::new();
    let err = JobReader::new()
        .read_from_directory(dir.path(), &mut jobs)
        .unwrap_err();
    assert_eq!(load_error_file(&err), "backup.json");
    assert!(matches!(
        err.root_cause(),
        DistrunError::InvalidConfiguration(ValidationError::MissingField("command"))
    ));
}
