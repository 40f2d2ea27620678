//! Remote session abstraction
//!
//! These traits allow testing without real servers by supporting mock implementations.
//! The SSH implementation lives in `src/platform/`.

use crate::models::{Credentials, Host, SecureString};
use crate::utils::SessionError;
use std::time::Duration;

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    /// Output with only stdout and a zero exit status
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            ..Self::default()
        }
    }

    /// stdout and stderr joined by a newline, the way a terminal would show them
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Remote session trait for abstraction over real/mock implementations
///
/// Commands are opaque shell strings. Callers are responsible for quoting
/// anything they interpolate; secrets are only ever passed through
/// [`RemoteSession::execute_with_input`].
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Host name this session is connected to
    fn server_name(&self) -> &str;

    /// Run a command and capture both output streams
    ///
    /// A non-zero exit status is not an error; only transport failures are.
    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Run a command, writing `input` followed by a newline to its stdin
    ///
    /// SECURITY: `input` never appears in the command line or in logs.
    async fn execute_with_input(
        &self,
        command: &str,
        input: &SecureString,
    ) -> Result<CommandOutput, SessionError>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self) {}
}

/// Opens authenticated sessions
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &Host,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_joins_streams() {
        let output = CommandOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_status: 1,
        };
        assert_eq!(output.combined(), "out\nerr");
    }

    #[test]
    fn test_stdout_constructor() {
        let output = CommandOutput::stdout("yes");
        assert_eq!(output.stdout, "yes");
        assert!(output.stderr.is_empty());
        assert_eq!(output.exit_status, 0);
    }
}
