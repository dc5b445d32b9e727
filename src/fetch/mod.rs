//! Retrieval of one host's configuration and extraction of its inactive paths.

pub mod ssh;

use crate::config::Credentials;
use crate::xml::{ParseError, find_inactive, parse_document};

pub use ssh::SshTransport;

/// Command returning the device configuration as XML.
pub const SHOW_CONFIG_COMMAND: &str = "show configuration | display xml";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("authentication failed for user {user}: {message}")]
    Auth { user: String, message: String },
    #[error("command `{command}` failed: {message}")]
    Exec { command: String, message: String },
    #[error("command `{command}` exited with status {status}: {stderr}")]
    ExitStatus {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] ParseError),
}

/// A failed host, with the stage that failed as its source.
#[derive(Debug, thiserror::Error)]
#[error("host {host} failed")]
pub struct HostError {
    pub host: String,
    #[source]
    pub source: FetchError,
}

/// Full identifiers (`<host>:<path>`) observed on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub host: String,
    pub ids: Vec<String>,
}

pub fn qualify(host: &str, path: &str) -> String {
    format!("{}:{}", host, path)
}

/// An open remote command session. Dropping it releases the connection.
pub trait Session {
    fn exec(&mut self, command: &str) -> Result<Vec<u8>, FetchError>;
}

/// Opens sessions to hosts. Shared by all workers.
pub trait Transport: Sync {
    type Session: Session;

    fn connect(&self, host: &str, credentials: &Credentials) -> Result<Self::Session, FetchError>;
}

pub struct HostFetcher<T> {
    transport: T,
    credentials: Credentials,
}

impl<T: Transport> HostFetcher<T> {
    pub fn new(transport: T, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Fetch `host`'s configuration and return its inactive identifiers.
    ///
    /// Any failure is tagged with the host and no partial list is returned.
    pub fn fetch(&self, host: &str) -> Result<HostPaths, HostError> {
        self.fetch_paths(host)
            .map(|paths| HostPaths {
                host: host.to_string(),
                ids: paths.iter().map(|p| qualify(host, p)).collect(),
            })
            .map_err(|source| HostError {
                host: host.to_string(),
                source,
            })
    }

    fn fetch_paths(&self, host: &str) -> Result<Vec<String>, FetchError> {
        let output = {
            let mut session = self.transport.connect(host, &self.credentials)?;
            session.exec(SHOW_CONFIG_COMMAND)?
        };
        tracing::debug!(host, bytes = output.len(), "received configuration");

        let doc = parse_document(&output)?;
        Ok(find_inactive(&doc))
    }
}
