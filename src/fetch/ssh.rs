//! SSH transport backed by libssh2.

use crate::config::{Auth, Credentials};
use crate::fetch::{FetchError, Session, Transport};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};

#[derive(Debug, Clone)]
pub struct SshTransport {
    port: u16,
}

impl SshTransport {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// `host:port` to dial. Hosts that already name a port are used as given.
fn target(host: &str, port: u16) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    match host.rsplit_once(':') {
        Some((name, p)) if !name.contains(':') && p.parse::<u16>().is_ok() => host.to_string(),
        // Bare IPv6 literal.
        Some(_) => format!("[{}]:{}", host, port),
        None => format!("{}:{}", host, port),
    }
}

fn exit_error(command: &str, status: i32, stderr: &[u8]) -> FetchError {
    FetchError::ExitStatus {
        command: command.to_string(),
        status,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

pub struct SshSession {
    session: ssh2::Session,
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "audit finished", None) {
            tracing::debug!(error = %e, "ssh disconnect failed");
        }
    }
}

impl Session for SshSession {
    fn exec(&mut self, command: &str) -> Result<Vec<u8>, FetchError> {
        let exec_err = |e: &dyn std::fmt::Display| FetchError::Exec {
            command: command.to_string(),
            message: e.to_string(),
        };

        let mut channel = self.session.channel_session().map_err(|e| exec_err(&e))?;
        channel.exec(command).map_err(|e| exec_err(&e))?;

        let mut out = Vec::new();
        channel.read_to_end(&mut out).map_err(|e| exec_err(&e))?;
        // Unread stderr keeps the channel window closed.
        let mut err = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut err)
            .map_err(|e| exec_err(&e))?;
        channel.wait_close().map_err(|e| exec_err(&e))?;

        let status = channel.exit_status().map_err(|e| exec_err(&e))?;
        if status != 0 {
            return Err(exit_error(command, status, &err));
        }
        if !err.is_empty() {
            let text = String::from_utf8_lossy(&err);
            tracing::debug!(stderr = %text.trim(), "command wrote to stderr");
        }
        Ok(out)
    }
}

impl Transport for SshTransport {
    type Session = SshSession;

    fn connect(&self, host: &str, credentials: &Credentials) -> Result<SshSession, FetchError> {
        let addr = target(host, self.port);
        let tcp =
            TcpStream::connect(&addr).map_err(|e| FetchError::Connect(format!("{}: {}", addr, e)))?;

        let mut session =
            ssh2::Session::new().map_err(|e| FetchError::Connect(format!("{}: {}", addr, e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| FetchError::Connect(format!("{}: handshake: {}", addr, e)))?;

        // From here on the guard disconnects on every exit path.
        let guard = SshSession { session };

        let user = credentials.user.as_str();
        let auth_err = |e: ssh2::Error| FetchError::Auth {
            user: user.to_string(),
            message: e.to_string(),
        };
        match &credentials.auth {
            Auth::KeyFile(key) => guard
                .session
                .userauth_pubkey_file(user, None, key, None)
                .map_err(auth_err)?,
            Auth::Password(pass) => guard
                .session
                .userauth_password(user, pass)
                .map_err(auth_err)?,
        }
        if !guard.session.authenticated() {
            return Err(FetchError::Auth {
                user: user.to_string(),
                message: "server did not accept credentials".to_string(),
            });
        }

        tracing::debug!(host, user, "ssh session established");
        Ok(guard)
    }
}
