use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ChannelError, CommandChannel, ExecOutput};

/// Command channel over ssh, the transport the provisioning layer already
/// set up on every hat (BatchMode: key auth only, never an interactive
/// prompt).
pub struct SshChannel {
    user: String,
    connect_timeout: Duration,
}

impl SshChannel {
    pub fn new(user: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            user: user.into(),
            connect_timeout,
        }
    }

    fn build(&self, addr: &str, argv: &[String]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ))
            .arg(format!("{}@{}", self.user, addr))
            .arg("--")
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandChannel for SshChannel {
    async fn execute(
        &self,
        addr: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, ChannelError> {
        debug!(%addr, ?argv, "Executing remote command");

        let child = self.build(addr, argv).spawn()?;

        // kill_on_drop reaps the child when the timeout branch wins
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ChannelError::TimedOut(timeout))??;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
