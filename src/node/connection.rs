use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_SSH_HOST: &str = "localhost";
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_KEY_FILE: &str = "~/.ssh/id_rsa";

/// How a node is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Local,
    Ssh,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Local => "local",
            ConnectionType::Ssh => "ssh",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConnectionType::Local),
            "ssh" => Ok(ConnectionType::Ssh),
            other => Err(ValidationError::UnknownConnectionType(other.to_string())),
        }
    }
}

/// Remote-shell parameters. Ignored for local nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub ssh_host: String,
    pub ssh_user: String,
    pub ssh_private_key_file: String,
}

impl ConnectionOptions {
    pub fn ssh(
        host: impl Into<String>,
        user: impl Into<String>,
        key_file: impl Into<String>,
    ) -> Self {
        Self {
            ssh_host: host.into(),
            ssh_user: user.into(),
            ssh_private_key_file: key_file.into(),
        }
    }

    /// Fill empty remote-shell fields with conventional values.
    ///
    /// Fields that are already set are left untouched, so calling this on a
    /// complete declaration is a no-op.
    pub fn apply_defaults(&mut self, kind: ConnectionType) {
        if kind != ConnectionType::Ssh {
            return;
        }
        if self.ssh_host.is_empty() {
            self.ssh_host = DEFAULT_SSH_HOST.to_string();
        }
        if self.ssh_user.is_empty() {
            self.ssh_user = DEFAULT_SSH_USER.to_string();
        }
        if self.ssh_private_key_file.is_empty() {
            self.ssh_private_key_file = DEFAULT_SSH_KEY_FILE.to_string();
        }
    }

    /// Check the fields `kind` requires. Reports host, user and key file in that order.
    pub fn validate(&self, kind: ConnectionType) -> Result<(), ValidationError> {
        match kind {
            ConnectionType::Local => Ok(()),
            ConnectionType::Ssh => {
                if self.ssh_host.is_empty() {
                    return Err(ValidationError::MissingField("ssh_host"));
                }
                if self.ssh_user.is_empty() {
                    return Err(ValidationError::MissingField("ssh_user"));
                }
                if self.ssh_private_key_file.is_empty() {
                    return Err(ValidationError::MissingField("ssh_private_key_file"));
                }
                Ok(())
            }
        }
    }
}

/// A connection kind paired with its options, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    #[serde(rename = "connection_type")]
    kind: ConnectionType,
    #[serde(rename = "connection_options")]
    options: ConnectionOptions,
}

impl Connection {
    pub fn new(kind: ConnectionType, options: ConnectionOptions) -> Result<Self, ValidationError> {
        options.validate(kind)?;
        Ok(Self { kind, options })
    }

    pub fn local() -> Self {
        Self {
            kind: ConnectionType::Local,
            options: ConnectionOptions::default(),
        }
    }

    pub fn kind(&self) -> ConnectionType {
        self.kind
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_ssh() -> ConnectionOptions {
        ConnectionOptions::ssh("10.0.0.5", "deploy", "/keys/id_rsa")
    }

    #[test]
    fn test_connection_type_display_honours_width() {
        assert_eq!(format!("[{:<6}]", ConnectionType::Ssh), "[ssh   ]");
        assert_eq!(ConnectionType::Local.to_string(), "local");
    }

    #[test]
    fn test_ssh_with_all_fields_is_valid() {
        assert_eq!(full_ssh().validate(ConnectionType::Ssh), Ok(()));
    }

    #[test]
    fn test_ssh_names_the_missing_field() {
        let mut opts = full_ssh();
        opts.ssh_host.clear();
        assert_eq!(
            opts.validate(ConnectionType::Ssh),
            Err(ValidationError::MissingField("ssh_host"))
        );

        let mut opts = full_ssh();
        opts.ssh_user.clear();
        assert_eq!(
            opts.validate(ConnectionType::Ssh),
            Err(ValidationError::MissingField("ssh_user"))
        );

        let mut opts = full_ssh();
        opts.ssh_private_key_file.clear();
        assert_eq!(
            opts.validate(ConnectionType::Ssh),
            Err(ValidationError::MissingField("ssh_private_key_file"))
        );
    }

    #[test]
    fn test_ssh_reports_host_before_user_and_key() {
        let opts = ConnectionOptions::default();
        assert_eq!(
            opts.validate(ConnectionType::Ssh),
            Err(ValidationError::MissingField("ssh_host"))
        );

        let opts = ConnectionOptions {
            ssh_host: "h".into(),
            ..Default::default()
        };
        assert_eq!(
            opts.validate(ConnectionType::Ssh),
            Err(ValidationError::MissingField("ssh_user"))
        );
    }

    #[test]
    fn test_local_is_always_valid() {
        assert_eq!(ConnectionOptions::default().validate(ConnectionType::Local), Ok(()));
        assert_eq!(full_ssh().validate(ConnectionType::Local), Ok(()));
        let partial = ConnectionOptions {
            ssh_user: "deploy".into(),
            ..Default::default()
        };
        assert_eq!(partial.validate(ConnectionType::Local), Ok(()));
    }

    #[test]
    fn test_apply_defaults_fills_only_empty_fields() {
        let mut opts = ConnectionOptions {
            ssh_host: "db.internal".into(),
            ..Default::default()
        };
        opts.apply_defaults(ConnectionType::Ssh);
        assert_eq!(opts.ssh_host, "db.internal");
        assert_eq!(opts.ssh_user, DEFAULT_SSH_USER);
        assert_eq!(opts.ssh_private_key_file, DEFAULT_SSH_KEY_FILE);

        let snapshot = opts.clone();
        opts.apply_defaults(ConnectionType::Ssh);
        assert_eq!(opts, snapshot);
    }

    #[test]
    fn test_apply_defaults_is_noop_for_local() {
        let mut opts = ConnectionOptions::default();
        opts.apply_defaults(ConnectionType::Local);
        assert_eq!(opts, ConnectionOptions::default());
    }

    #[test]
    fn test_connection_type_parses_known_kinds() {
        assert_eq!("local".parse::<ConnectionType>(), Ok(ConnectionType::Local));
        assert_eq!("ssh".parse::<ConnectionType>(), Ok(ConnectionType::Ssh));
        assert_eq!(
            "telnet".parse::<ConnectionType>(),
            Err(ValidationError::UnknownConnectionType("telnet".into()))
        );
    }

    #[test]
    fn test_connection_new_rejects_incomplete_ssh() {
        let err = Connection::new(ConnectionType::Ssh, ConnectionOptions::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("ssh_host"));
        let conn = Connection::new(ConnectionType::Ssh, full_ssh()).unwrap();
        assert_eq!(conn.kind(), ConnectionType::Ssh);
        assert_eq!(conn.options().ssh_user, "deploy");
    }
}
