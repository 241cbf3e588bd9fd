pub mod mock;
pub mod ssh;

use std::time::Duration;

use async_trait::async_trait;

/// Exit status and captured output of one remote command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("command did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command execution channel to a device.
///
/// The transport is opaque to the coordinator: implementations deliver an
/// argv to the device at `addr` and report exit status and output. Every
/// call is bounded by `timeout`; there is no retry at this layer.
#[async_trait]
pub trait CommandChannel: Send + Sync + 'static {
    async fn execute(
        &self,
        addr: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, ChannelError>;
}
