use std::sync::Arc;

use ledshow_core::{
    Command, DeviceName, DispatchReport, DispatchResult, DispatchStatus, Reachability, Target,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::channel::{ChannelError, CommandChannel};
use crate::config::DispatchConfig;
use crate::registry::{FleetRegistry, RegistryError};
use crate::remote::RemoteCommands;

/// Sends a command to every resolved target concurrently and collects one
/// outcome per device.
///
/// Fan-out is bounded by the configured pool size and every execution by the
/// per-device timeout, so the call returns after at most one timeout window
/// per pool wave. Partial failure is normal and reported per device; there
/// are no retries at this layer.
pub struct Dispatcher<C> {
    registry: FleetRegistry,
    channel: Arc<C>,
    remote: RemoteCommands,
    config: DispatchConfig,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            channel: Arc::clone(&self.channel),
            remote: self.remote.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: CommandChannel> Dispatcher<C> {
    pub fn new(
        registry: FleetRegistry,
        channel: Arc<C>,
        remote: RemoteCommands,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            channel,
            remote,
            config,
        }
    }

    pub fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    /// Dispatch `command` to its target set. Returns only after every target
    /// has reported or timed out. `Err` only for an unknown explicit target
    /// name; device-level failures live in the report.
    pub async fn dispatch(&self, command: Command) -> Result<DispatchReport, RegistryError> {
        let handles = self.registry.resolve(&command.target).await?;

        if handles.is_empty() {
            warn!(command = command.kind.name(), "Dispatch matched no devices");
            return Ok(DispatchReport::default());
        }

        info!(
            command = command.kind.name(),
            targets = handles.len(),
            "Dispatching"
        );

        let argv = Arc::new(self.remote.argv(command.kind));
        let timeout = self.config.timeout();
        let pool = Arc::new(Semaphore::new(self.config.pool_size.max(1)));
        let kind = command.kind;

        let mut tasks = JoinSet::new();
        for handle in handles {
            let channel = Arc::clone(&self.channel);
            let argv = Arc::clone(&argv);
            let pool = Arc::clone(&pool);

            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await.expect("dispatch pool closed");

                let (name, addr) = {
                    let device = handle.lock().await;
                    (device.name.clone(), device.addr.to_string())
                };

                let outcome = channel.execute(&addr, &argv, timeout).await;
                let (status, detail) = {
                    let mut device = handle.lock().await;
                    match outcome {
                        Ok(out) if out.success() => {
                            device.reachability = Reachability::Reachable;
                            if let Some(next) = kind.light_effect() {
                                device.lights = next;
                            }
                            (DispatchStatus::Succeeded, None)
                        }
                        Ok(out) => {
                            // the device answered, the command itself failed
                            device.reachability = Reachability::Reachable;
                            let stderr = out.stderr.trim();
                            let detail = if stderr.is_empty() {
                                format!("exit code {}", out.exit_code)
                            } else {
                                format!("exit code {}: {stderr}", out.exit_code)
                            };
                            (DispatchStatus::Failed, Some(detail))
                        }
                        Err(ChannelError::TimedOut(t)) => {
                            device.reachability = Reachability::Unreachable;
                            (
                                DispatchStatus::TimedOut,
                                Some(format!("no response within {t:?}")),
                            )
                        }
                        Err(e) => {
                            device.reachability = Reachability::Unreachable;
                            (DispatchStatus::Failed, Some(e.to_string()))
                        }
                    }
                };

                DispatchResult {
                    device: name,
                    status,
                    detail: detail.map(Into::into),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = ?e, "Dispatch task panicked"),
            }
        }
        results.sort_by(|a, b| a.device.cmp(&b.device));

        let report = DispatchReport { results };
        info!(
            command = command.kind.name(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Dispatch complete"
        );

        Ok(report)
    }

    /// Dispatch a command to a single device.
    pub async fn dispatch_to(
        &self,
        kind: ledshow_core::CommandKind,
        device: DeviceName,
    ) -> Result<DispatchReport, RegistryError> {
        self.dispatch(Command::new(kind, Target::Devices(vec![device])))
            .await
    }
}
