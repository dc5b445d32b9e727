//! YAML configuration (`config.yml`).
//!
//! Shape:
//! ```yaml
//! ssh-client:
//!   user: audit
//!   pass: secret          # optional
//!   key-file: ~/.ssh/id   # optional, wins over pass
//!   num-workers: 4
//!   port: 22              # optional
//! ssh-hosts:
//!   - r1.example.net
//! whitelist:
//!   - "r1.example.net:system syslog"
//! ```

use crate::Result;
use anyhow::{Context, bail};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub ssh_client: SshClientConfig,

    #[serde(default)]
    pub ssh_hosts: Vec<String>,

    #[serde(default)]
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SshClientConfig {
    pub user: String,

    #[serde(default)]
    pub pass: Option<String>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    pub num_workers: usize,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// How a session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    KeyFile(PathBuf),
    Password(String),
}

// Keep passwords out of debug logs.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Auth::Password(_) => f.write_str("Password(..)"),
        }
    }
}

/// Read-only login data shared by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub auth: Auth,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("load config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ssh_client.user.trim().is_empty() {
            bail!("ssh-client.user must not be empty");
        }
        if self.ssh_client.num_workers == 0 {
            bail!("ssh-client.num-workers must be at least 1");
        }
        self.ssh_client.credentials()?;

        let mut seen = BTreeSet::new();
        for host in &self.ssh_hosts {
            if host.trim().is_empty() {
                bail!("ssh-hosts contains an empty entry");
            }
            if !seen.insert(host.as_str()) {
                bail!("duplicate host in ssh-hosts: {}", host);
            }
        }
        Ok(())
    }

    pub fn whitelist_set(&self) -> BTreeSet<String> {
        self.whitelist.iter().cloned().collect()
    }
}

impl SshClientConfig {
    /// Key file takes precedence when both a key and a password are set.
    pub fn credentials(&self) -> Result<Credentials> {
        let auth = match (&self.key_file, &self.pass) {
            (Some(key), _) if !key.as_os_str().is_empty() => Auth::KeyFile(key.clone()),
            (_, Some(pass)) => Auth::Password(pass.clone()),
            _ => bail!("ssh-client needs either key-file or pass"),
        };
        Ok(Credentials {
            user: self.user.clone(),
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_document() {
        let config = Config::from_yaml(
            r#"
ssh-client:
  user: audit
  pass: secret
  num-workers: 3
ssh-hosts:
  - r1
  - r2
whitelist:
  - "r1:system syslog"
"#,
        )
        .unwrap();

        assert_eq!(config.ssh_client.num_workers, 3);
        assert_eq!(config.ssh_client.port, DEFAULT_SSH_PORT);
        assert_eq!(config.ssh_hosts, vec!["r1".to_string(), "r2".to_string()]);
        assert!(config.whitelist_set().contains("r1:system syslog"));
        assert_eq!(
            config.ssh_client.credentials().unwrap().auth,
            Auth::Password("secret".to_string())
        );
    }

    #[test]
    fn key_file_wins_over_password() {
        let config = Config::from_yaml(
            "ssh-client: {user: audit, pass: secret, key-file: /keys/id, num-workers: 1}\n",
        )
        .unwrap();
        let creds = config.ssh_client.credentials().unwrap();
        assert_eq!(creds.auth, Auth::KeyFile(PathBuf::from("/keys/id")));
        assert!(config.ssh_hosts.is_empty());
        assert!(config.whitelist.is_empty());
    }

    #[test]
    fn num_workers_is_required() {
        let err = Config::from_yaml("ssh-client: {user: audit, pass: x}\n").unwrap_err();
        assert!(format!("{err:#}").contains("num-workers"));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = Config::from_yaml("ssh-client: {user: audit, pass: x, num-workers: 0}\n")
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn missing_auth_rejected() {
        let err = Config::from_yaml("ssh-client: {user: audit, num-workers: 2}\n").unwrap_err();
        assert!(err.to_string().contains("key-file or pass"));
    }

    #[test]
    fn duplicate_hosts_rejected() {
        let err = Config::from_yaml(
            "ssh-client: {user: audit, pass: x, num-workers: 2}\nssh-hosts: [r1, r1]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate host"));
    }

    #[test]
    fn empty_host_entry_rejected() {
        let err = Config::from_yaml(
            "ssh-client: {user: audit, pass: x, num-workers: 2}\nssh-hosts: [r1, \"  \"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty entry"));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let creds = Credentials {
            user: "audit".into(),
            auth: Auth::Password("hunter2".into()),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("config.yml")).unwrap_err();
        assert!(err.to_string().contains("read config file"));
    }
}
