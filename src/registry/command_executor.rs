//! SafeCommandExecutor: whitelisted command execution for registry calls
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved commands can execute
//! - **Injection prevention**: Arguments are passed as a vector, never
//!   interpolated into a shell string
//! - **Working directory validation**: Validates existence before execution
//! - **Timeout control**: The child is killed when the timeout elapses
//!
//! # Example
//!
//! ```rust,no_run
//! use workspace_publisher::registry::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute("cargo", &["--version"]).await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Allowed commands whitelist.
const ALLOWED_COMMANDS: &[&str] = &["cargo"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Working directory where commands will be executed
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
    /// Extra environment for the child process only
    env: BTreeMap<String, String>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            env: BTreeMap::new(),
        })
    }

    /// Set command execution timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Set environment variables passed to every spawned command.
    ///
    /// The current process environment is left untouched.
    pub fn set_env(&mut self, env: BTreeMap<String, String>) {
        self.env = env;
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Execute a command with whitelist validation.
    ///
    /// A non-zero exit status is not an error here; callers inspect
    /// `output.status`.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::ExecutionFailed` - Binary not found or execution error
    /// - `CommandError::Timeout` - The timeout elapsed before the command exited
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<Output, CommandError> {
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        tracing::debug!(
            "running `{} {}` in {}",
            command,
            args.join(" "),
            self.working_dir.display()
        );

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| CommandError::Timeout(timeout))?,
            None => child.wait_with_output().await,
        };

        output.map_err(|e| CommandError::ExecutionFailed(e.to_string()))
    }
}
