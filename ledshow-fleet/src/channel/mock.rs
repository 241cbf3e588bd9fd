use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ChannelError, CommandChannel, ExecOutput};

/// Scripted behavior for one address on the mock channel.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Simulated round trip before the result is produced.
    pub latency: Duration,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Connection refused instead of a result.
    pub unreachable: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            unreachable: false,
        }
    }
}

impl MockBehavior {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failing(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

/// In-memory command channel with per-address scripted behavior and a call
/// log. The test double for dispatch and clock-sync, and the demo backend
/// when no real fleet is on the network.
#[derive(Clone, Default)]
pub struct MockChannel {
    behaviors: Arc<Mutex<HashMap<String, MockBehavior>>>,
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uniform latency for every address without scripted behavior.
    pub fn with_latency(latency: Duration) -> Self {
        let default_behavior = MockBehavior {
            latency,
            ..MockBehavior::default()
        };
        Self {
            behaviors: Arc::new(Mutex::new(HashMap::from([(
                String::new(),
                default_behavior,
            )]))),
            calls: Arc::default(),
        }
    }

    pub async fn script(&self, addr: impl Into<String>, behavior: MockBehavior) {
        self.behaviors.lock().await.insert(addr.into(), behavior);
    }

    /// Every `(addr, argv)` executed so far, in arrival order.
    pub async fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().await.clone()
    }

    async fn behavior_for(&self, addr: &str) -> MockBehavior {
        let behaviors = self.behaviors.lock().await;
        behaviors
            .get(addr)
            .or_else(|| behaviors.get(""))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn execute(
        &self,
        addr: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, ChannelError> {
        self.calls
            .lock()
            .await
            .push((addr.to_owned(), argv.to_vec()));

        let behavior = self.behavior_for(addr).await;

        if behavior.unreachable {
            return Err(ChannelError::Unreachable(format!(
                "connection refused: {addr}"
            )));
        }

        if behavior.latency >= timeout {
            // honor the caller's bound the way a real transport would
            tokio::time::sleep(timeout).await;
            return Err(ChannelError::TimedOut(timeout));
        }

        tokio::time::sleep(behavior.latency).await;
        Ok(ExecOutput {
            exit_code: behavior.exit_code,
            stdout: behavior.stdout,
            stderr: behavior.stderr,
        })
    }
}
