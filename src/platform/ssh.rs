//! Linux remote session over SSH
//!
//! One authenticated `ssh2` session per host, shared by every command of that
//! host's audit. libssh2 is blocking, so all I/O runs on the blocking pool.

use crate::core::session::{CommandOutput, Connector, RemoteSession};
use crate::models::{Credentials, Host, SecureString};
use crate::utils::SessionError;
use ssh2::{ErrorCode, Session};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// libssh2's LIBSSH2_ERROR_TIMEOUT
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Opens password-authenticated SSH sessions
#[derive(Debug, Clone)]
pub struct SshConnector {
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            crate::constants::DEFAULT_COMMAND_TIMEOUT_SECS,
        ))
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        host: &Host,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        tracing::debug!(
            host = %host.name,
            target = %host.target(),
            user = %credentials.username(),
            "SSH connect START"
        );

        let address = host.address.clone();
        let port = host.port;
        let username = credentials.username().as_str().to_string();
        let password = credentials.password().clone();
        let command_timeout = self.command_timeout;

        let session = tokio::task::spawn_blocking(move || {
            open_session(&address, port, &username, &password, timeout, command_timeout)
        })
        .await
        .map_err(|e| SessionError::Connection(format!("SSH task failed: {e}")))??;

        tracing::debug!(host = %host.name, "SSH connect OK");
        Ok(Box::new(SshSession {
            server_name: host.name.clone(),
            session,
            command_timeout,
            closed: AtomicBool::new(false),
        }))
    }
}

fn open_session(
    address: &str,
    port: u16,
    username: &str,
    password: &SecureString,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> Result<Session, SessionError> {
    let addr = resolve(address, port)?;
    let tcp = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|e| {
        if is_timeout(&e) {
            SessionError::Timeout(connect_timeout)
        } else {
            SessionError::Connection(format!("SSH connect to {addr} failed: {e}"))
        }
    })?;
    tcp.set_read_timeout(Some(command_timeout)).ok();
    tcp.set_write_timeout(Some(command_timeout)).ok();

    let mut sess =
        Session::new().map_err(|e| SessionError::Connection(format!("SSH session init failed: {e}")))?;
    sess.set_tcp_stream(tcp);
    sess.set_timeout(millis(connect_timeout));
    sess.handshake()
        .map_err(|e| map_ssh_error(e, connect_timeout, "SSH handshake failed"))?;

    sess.userauth_password(username, password.as_str())
        .map_err(|_| SessionError::Authentication)?;
    if !sess.authenticated() {
        return Err(SessionError::Authentication);
    }

    sess.set_timeout(millis(command_timeout));
    Ok(sess)
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, SessionError> {
    (address, port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Connection(format!("cannot resolve {address}: {e}")))?
        .next()
        .ok_or_else(|| SessionError::Connection(format!("no address found for {address}")))
}

/// Wrap a command for `sh -c`, quoting it as one argument
pub fn wrap_command(command: &str) -> String {
    format!("sh -c {}", shell_escape::escape(command.into()))
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn map_ssh_error(err: ssh2::Error, limit: Duration, context: &str) -> SessionError {
    if err.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) {
        SessionError::Timeout(limit)
    } else {
        SessionError::Connection(format!("{context}: {err}"))
    }
}

fn map_io_error(err: io::Error, limit: Duration, context: &str) -> SessionError {
    if is_timeout(&err) {
        SessionError::Timeout(limit)
    } else {
        SessionError::CommandFailed(format!("{context}: {err}"))
    }
}

/// Authenticated SSH session bound to one host
pub struct SshSession {
    server_name: String,
    session: Session,
    command_timeout: Duration,
    closed: AtomicBool,
}

impl SshSession {
    async fn run(
        &self,
        command: &str,
        input: Option<&SecureString>,
    ) -> Result<CommandOutput, SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Connection("session already closed".to_string()));
        }

        let session = self.session.clone();
        let wrapped = wrap_command(command);
        let input = input.cloned();
        let limit = self.command_timeout;

        let task = tokio::task::spawn_blocking(move || {
            run_blocking(&session, &wrapped, input.as_ref(), limit)
        });

        match tokio::time::timeout(limit, task).await {
            Ok(joined) => {
                joined.map_err(|e| SessionError::CommandFailed(format!("SSH task failed: {e}")))?
            }
            Err(_) => Err(SessionError::Timeout(limit)),
        }
    }

    /// Disconnect without blocking an async worker
    ///
    /// An abandoned command may still hold the libssh2 session on the
    /// blocking pool, so inside a runtime the disconnect is queued there too.
    fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.session.clone();
        let name = self.server_name.clone();
        let task = move || {
            if let Err(e) = session.disconnect(None, "audit complete", None) {
                tracing::debug!(host = %name, error = %e, "SSH disconnect failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(_) => task(),
        }
    }
}

/// Decode command output, replacing invalid UTF-8 instead of failing
fn decode_output(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn run_blocking(
    session: &Session,
    command: &str,
    input: Option<&SecureString>,
    limit: Duration,
) -> Result<CommandOutput, SessionError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| map_ssh_error(e, limit, "SSH channel open failed"))?;
    channel
        .exec(command)
        .map_err(|e| map_ssh_error(e, limit, "SSH exec failed"))?;

    if let Some(secret) = input {
        channel
            .write_all(secret.as_str().as_bytes())
            .and_then(|_| channel.write_all(b"\n"))
            .and_then(|_| channel.flush())
            .map_err(|e| map_io_error(e, limit, "SSH stdin write failed"))?;
    }
    channel
        .send_eof()
        .map_err(|e| map_ssh_error(e, limit, "SSH send EOF failed"))?;

    let mut stdout = Vec::new();
    channel
        .read_to_end(&mut stdout)
        .map_err(|e| map_io_error(e, limit, "SSH read failed"))?;
    let mut stderr = Vec::new();
    let _ = channel.stderr().read_to_end(&mut stderr);

    channel.wait_close().ok();
    let exit_status = channel.exit_status().unwrap_or(-1);

    Ok(CommandOutput {
        stdout: decode_output(stdout),
        stderr: decode_output(stderr),
        exit_status,
    })
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError> {
        tracing::trace!(host = %self.server_name, command, "exec");
        self.run(command, None).await
    }

    async fn execute_with_input(
        &self,
        command: &str,
        input: &SecureString,
    ) -> Result<CommandOutput, SessionError> {
        tracing::trace!(host = %self.server_name, command, "exec with stdin");
        self.run(command, Some(input)).await
    }

    async fn close(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let session = self.session.clone();
        let name = self.server_name.clone();
        self.closed.store(true, Ordering::SeqCst);
        let result = tokio::task::spawn_blocking(move || {
            session.disconnect(None, "audit complete", None)
        })
        .await;
        if let Ok(Err(e)) = result {
            tracing::debug!(host = %name, error = %e, "SSH disconnect failed");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_command_quotes_single_argument() {
        assert_eq!(wrap_command("uptime"), "sh -c uptime");
        assert_eq!(
            wrap_command("df -P -h 2>/dev/null"),
            "sh -c 'df -P -h 2>/dev/null'"
        );
    }

    #[test]
    fn test_wrap_command_escapes_embedded_quotes() {
        let wrapped = wrap_command("sudo -S -p '' docker ps");
        assert!(wrapped.starts_with("sh -c '"));
        assert!(wrapped.contains(r"'\''"));
    }

    #[test]
    fn test_timeout_error_mapping() {
        let limit = Duration::from_secs(3);
        let err = ssh2::Error::new(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT), "timed out");
        assert_eq!(
            map_ssh_error(err, limit, "SSH exec failed"),
            SessionError::Timeout(limit)
        );

        let io_err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(
            map_io_error(io_err, limit, "SSH read failed"),
            SessionError::Timeout(limit)
        );
    }

    #[test]
    fn test_other_errors_keep_context() {
        let err = ssh2::Error::new(ErrorCode::Session(-13), "socket disconnect");
        match map_ssh_error(err, Duration::from_secs(1), "SSH handshake failed") {
            SessionError::Connection(msg) => assert!(msg.starts_with("SSH handshake failed")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_output_tolerates_invalid_utf8() {
        assert_eq!(decode_output(b"/dev/sda1 90% /\n".to_vec()), "/dev/sda1 90% /\n");

        let mut raw = b"/dev/sdb1 85% /mnt/".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(b"data\n");
        let text = decode_output(raw);
        assert!(text.starts_with("/dev/sdb1 85% /mnt/"));
        assert!(text.ends_with("data\n"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::from_secs(u64::MAX / 1000)), u32::MAX);
    }

    fn unconnected_session() -> SshSession {
        SshSession {
            server_name: "web01".to_string(),
            session: Session::new().unwrap(),
            command_timeout: Duration::from_secs(1),
            closed: AtomicBool::new(false),
        }
    }

    #[tokio::test]
    async fn test_drop_inside_runtime_hands_disconnect_to_blocking_pool() {
        let session = unconnected_session();
        session.disconnect();
        assert!(session.closed.load(Ordering::SeqCst));
        drop(session);

        let abandoned = unconnected_session();
        drop(abandoned);
    }

    #[test]
    fn test_drop_outside_runtime_disconnects_inline() {
        let session = unconnected_session();
        drop(session);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_commands() {
        let session = unconnected_session();
        session.close().await;
        let result = session.execute("uptime").await;
        assert!(matches!(result, Err(SessionError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_connection_error() {
        let connector = SshConnector::default();
        let host = Host::new("ghost", "host.invalid");
        let credentials = Credentials::new(
            crate::models::Username::new("ops").unwrap(),
            SecureString::new("pw"),
        );
        let result = connector
            .connect(&host, &credentials, Duration::from_millis(500))
            .await;
        assert!(matches!(result, Err(SessionError::Connection(_))));
    }
}
