//! Mock remote session for testing without real servers
//!
//! Responses are scripted per command: an exact command match wins, otherwise
//! the longest registered pattern contained in the command is used. Every
//! executed command (and any stdin payload) is recorded for assertions.

use super::session::{CommandOutput, Connector, RemoteSession};
use crate::models::{Credentials, Host, SecureString};
use crate::utils::SessionError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    Fail(SessionError),
}

/// One command seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub command: String,
    pub input: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<(String, MockResponse)>,
    executed: Mutex<Vec<ExecutedCommand>>,
    closed: AtomicBool,
}

/// Scripted session; clones share the same script and command log
#[derive(Debug, Clone)]
pub struct MockRemoteSession {
    server_name: String,
    state: Arc<MockState>,
}

impl MockRemoteSession {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            state: Arc::new(MockState::default()),
        }
    }

    /// Register a response; re-scripting a pattern replaces the earlier one
    fn push(mut self, pattern: &str, response: MockResponse) -> Self {
        let responses = &mut Arc::get_mut(&mut self.state)
            .expect("script mock sessions before cloning them")
            .responses;
        responses.retain(|(existing, _)| existing != pattern);
        responses.push((pattern.to_string(), response));
        self
    }

    /// Answer commands matching `pattern` with `stdout`
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, MockResponse::Output(CommandOutput::stdout(stdout)))
    }

    /// Answer commands matching `pattern` with a full output triple
    pub fn respond_output(self, pattern: &str, output: CommandOutput) -> Self {
        self.push(pattern, MockResponse::Output(output))
    }

    /// Make commands matching `pattern` fail at the transport level
    pub fn fail(self, pattern: &str, error: SessionError) -> Self {
        self.push(pattern, MockResponse::Fail(error))
    }

    /// Ubuntu host with one critical, one security and one regular update,
    /// Docker running two containers and a nearly full root filesystem
    pub fn ubuntu(server_name: impl Into<String>) -> Self {
        Self::new(server_name)
            .respond(
                "cat /etc/os-release",
                "NAME=\"Ubuntu\"\nVERSION=\"22.04.4 LTS (Jammy Jellyfish)\"\nID=ubuntu\nID_LIKE=debian\n",
            )
            .respond("apt-get update", "")
            .respond(
                "apt list --upgradable 2>/dev/null",
                "Listing...\nopenssl/jammy-updates,jammy-security 3.0.2-0ubuntu1.15 amd64 [upgradable from: 3.0.2-0ubuntu1.14]\nlibxml2/jammy-updates,jammy-security 2.9.13+dfsg-1ubuntu0.4 amd64 [upgradable from: 2.9.13+dfsg-1ubuntu0.3]\nvim/jammy-updates 2:8.2.3995-1ubuntu2.16 amd64 [upgradable from: 2:8.2.3995-1ubuntu2.15]\n",
            )
            .respond(
                "apt list --upgradable 2>/dev/null | grep -i security",
                "openssl/jammy-updates,jammy-security 3.0.2-0ubuntu1.15 amd64 [upgradable from: 3.0.2-0ubuntu1.14]\nlibxml2/jammy-updates,jammy-security 2.9.13+dfsg-1ubuntu0.4 amd64 [upgradable from: 2.9.13+dfsg-1ubuntu0.3]\n",
            )
            .respond("command -v docker", "yes\n")
            .respond(
                "docker ps --format '{{.Names}};;{{.Image}}'",
                "web;;nginx:1.25\ncache;;redis:latest\n",
            )
            .respond("docker ps --format '{{.Image}}'", "nginx:1.25\nredis:latest\n")
            .respond(
                "df -P",
                "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        50G   41G  5.0G  90% /\ntmpfs           1.9G     0  1.9G   0% /dev/shm\n",
            )
    }

    /// Commands executed so far, in order
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state
            .executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn lookup(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let exact = self
            .state
            .responses
            .iter()
            .find(|(pattern, _)| pattern == command);
        let best = exact.or_else(|| {
            self.state
                .responses
                .iter()
                .filter(|(pattern, _)| command.contains(pattern.as_str()))
                .max_by_key(|(pattern, _)| pattern.len())
        });

        match best {
            Some((_, MockResponse::Output(output))) => Ok(output.clone()),
            Some((_, MockResponse::Fail(err))) => Err(err.clone()),
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: "sh: 1: command not found".to_string(),
                exit_status: 127,
            }),
        }
    }

    fn record(&self, command: &str, input: Option<&SecureString>) {
        if let Ok(mut log) = self.state.executed.lock() {
            log.push(ExecutedCommand {
                command: command.to_string(),
                input: input.map(|s| s.as_str().to_string()),
            });
        }
    }
}

#[async_trait::async_trait]
impl RemoteSession for MockRemoteSession {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError> {
        self.record(command, None);
        self.lookup(command)
    }

    async fn execute_with_input(
        &self,
        command: &str,
        input: &SecureString,
    ) -> Result<CommandOutput, SessionError> {
        self.record(command, Some(input));
        self.lookup(command)
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
enum MockEndpoint {
    Session(MockRemoteSession),
    Refuse(SessionError),
    Hang,
}

/// Connector handing out scripted sessions by host name
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    endpoints: HashMap<String, MockEndpoint>,
    delay: Option<Duration>,
    /// Shared between clones so a test can keep a handle after boxing
    attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, host: &str, session: MockRemoteSession) -> Self {
        self.endpoints
            .insert(host.to_string(), MockEndpoint::Session(session));
        self
    }

    pub fn refusing(mut self, host: &str, error: SessionError) -> Self {
        self.endpoints
            .insert(host.to_string(), MockEndpoint::Refuse(error));
        self
    }

    /// Host whose connection attempt never completes
    pub fn hanging(mut self, host: &str) -> Self {
        self.endpoints.insert(host.to_string(), MockEndpoint::Hang);
        self
    }

    /// Delay every successful connection (to exercise deadlines)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Connection attempts made through this connector or any clone of it
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host: &Host,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.endpoints.get(&host.name) {
            Some(MockEndpoint::Session(session)) => {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(Box::new(session.clone()))
            }
            Some(MockEndpoint::Refuse(err)) => Err(err.clone()),
            Some(MockEndpoint::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(SessionError::Connection(format!(
                "no route to host {}",
                host.address
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_match_wins_over_substring() {
        let session = MockRemoteSession::new("SRV")
            .respond("apt list", "all")
            .respond("apt list | grep security", "sec");

        let all = session.execute("apt list").await.unwrap();
        let sec = session.execute("apt list | grep security").await.unwrap();
        assert_eq!(all.stdout, "all");
        assert_eq!(sec.stdout, "sec");
    }

    #[tokio::test]
    async fn test_rescripting_pattern_overrides_preset() {
        let session = MockRemoteSession::ubuntu("SRV").respond("command -v docker", "no\n");
        let output = session
            .execute("command -v docker >/dev/null 2>&1 && echo 'yes' || echo 'no'")
            .await
            .unwrap();
        assert_eq!(output.stdout, "no\n");
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_found() {
        let session = MockRemoteSession::new("SRV");
        let output = session.execute("frobnicate").await.unwrap();
        assert_eq!(output.exit_status, 127);
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_records_commands_and_input() {
        let session = MockRemoteSession::new("SRV").respond("whoami", "root\n");
        let observer = session.clone();

        session.execute("whoami").await.unwrap();
        session
            .execute_with_input("sudo -S true", &SecureString::new("pw"))
            .await
            .unwrap();
        session.close().await;

        let log = observer.executed();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].input, None);
        assert_eq!(log[1].input.as_deref(), Some("pw"));
        assert!(observer.is_closed());
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let session = MockRemoteSession::new("SRV")
            .fail("uptime", SessionError::CommandFailed("channel closed".to_string()));
        let result = session.execute("uptime").await;
        assert!(matches!(result, Err(SessionError::CommandFailed(_))));
    }
}
