use std::sync::Arc;

use ledshow_core::{ClockOffset, CommandKind, DeviceName, Reachability};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::CommandChannel;
use crate::config::ClockSyncConfig;
use crate::dispatch::Dispatcher;
use crate::registry::FleetFilter;
use crate::remote::{parse_offset_seconds, RemoteCommands};

/// Periodically verifies each device's clock offset against the reference
/// source and flags devices whose drift exceeds the tolerance.
///
/// Every query carries its own timeout and failures never abort the sweep:
/// one slow or dead device costs the sweep nothing but its own slot.
pub struct ClockSupervisor<C> {
    dispatcher: Dispatcher<C>,
    channel: Arc<C>,
    remote: RemoteCommands,
    config: ClockSyncConfig,
}

impl<C: CommandChannel> ClockSupervisor<C> {
    pub fn new(
        dispatcher: Dispatcher<C>,
        channel: Arc<C>,
        remote: RemoteCommands,
        config: ClockSyncConfig,
    ) -> Self {
        Self {
            dispatcher,
            channel,
            remote,
            config,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            threshold_ms = self.config.threshold_ms,
            "Clock supervisor started"
        );

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Clock supervisor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One sweep over every device not already marked unreachable.
    pub async fn sweep_once(&self) {
        let filter = FleetFilter {
            names: None,
            reachability: Some(vec![Reachability::Reachable, Reachability::Unknown]),
        };
        let devices = self.dispatcher.registry().list(&filter).await;
        if devices.is_empty() {
            debug!("Clock sweep found no queryable devices");
            return;
        }

        let query = Arc::new(self.remote.clock_query());
        let timeout = self.config.query_timeout();
        let threshold_secs = self.config.threshold().as_secs_f64();

        let mut tasks: JoinSet<Option<DeviceName>> = JoinSet::new();
        for device in devices {
            let Some(handle) = self.dispatcher.registry().get(&device.name).await else {
                continue;
            };
            let channel = Arc::clone(&self.channel);
            let query = Arc::clone(&query);

            tasks.spawn(async move {
                let (name, addr) = {
                    let device = handle.lock().await;
                    (device.name.clone(), device.addr.to_string())
                };

                let output = match channel.execute(&addr, &query, timeout).await {
                    Ok(out) if out.success() => out,
                    Ok(out) => {
                        warn!(device = %name, exit_code = out.exit_code, "Offset query failed");
                        return None;
                    }
                    Err(e) => {
                        warn!(device = %name, error = %e, "Offset query unreachable");
                        let mut device = handle.lock().await;
                        device.reachability = Reachability::Unreachable;
                        return None;
                    }
                };

                let Some(seconds) = parse_offset_seconds(&output.stdout) else {
                    warn!(device = %name, stdout = %output.stdout.trim(), "Unparseable offset reply");
                    return None;
                };

                let mut device = handle.lock().await;
                device.reachability = Reachability::Reachable;
                device.clock = Some(ClockOffset {
                    seconds,
                    measured_at: jiff::Timestamp::now(),
                });
                drop(device);

                if seconds.abs() > threshold_secs {
                    warn!(device = %name, offset_secs = seconds, "Device clock out of sync");
                    Some(name)
                } else {
                    debug!(device = %name, offset_secs = seconds, "Device clock in sync");
                    None
                }
            });
        }

        let mut drifted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(name)) => drifted.push(name),
                Ok(None) => {}
                Err(e) => error!(error = ?e, "Clock query task panicked"),
            }
        }

        if drifted.is_empty() || !self.config.step_on_drift {
            return;
        }

        // corrective step-adjust, one device at a time; a failure here is
        // already reflected in the dispatch report logging
        for name in drifted {
            info!(device = %name, "Issuing corrective step-clock");
            if let Err(e) = self
                .dispatcher
                .dispatch_to(CommandKind::StepClock, name.clone())
                .await
            {
                error!(device = %name, error = %e, "Step-clock dispatch failed");
            }
        }
    }
}
