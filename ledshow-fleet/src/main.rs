use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use ledshow_core::{
    Command, CommandError, CommandKind, Device, DeviceName, DispatchReport, DispatchStatus,
    ScheduleEntry, ScheduleId, Target, TimeSpec,
};
use ledshow_fleet::clocksync::ClockSupervisor;
use ledshow_fleet::remote::RemoteCommands;
use ledshow_fleet::schedule::run_schedule_loop;
use ledshow_fleet::{
    ChannelConfig, CommandChannel, Config, DeviceStore, Dispatcher, FleetRegistry, MemoryStore,
    MockChannel, ScheduleBook, ScheduleStore, SqliteStore, SshChannel, StorageConfig,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use ulid::Ulid;

#[derive(Parser)]
#[command(name = "ledshow-fleet")]
#[command(about = "Ledshow fleet coordinator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ledshow-fleet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the coordinator daemon (clock supervisor + schedule trigger)
    Run,
    /// Register or update a device in the fleet
    Register { name: String, addr: String },
    /// Start a light pattern on the target set (empty = whole fleet)
    RunPattern {
        pattern: String,
        targets: Vec<String>,
    },
    /// Stop the lights on the target set
    Stop { targets: Vec<String> },
    /// Reboot the target set
    Reboot { targets: Vec<String> },
    /// Power the target set off
    Shutdown { targets: Vec<String> },
    /// Show fleet status
    Status { targets: Vec<String> },
    /// Register a scheduled command, e.g. `schedule breathe every:5m`
    Schedule {
        /// Pattern name, or stop/step-clock/reboot/shutdown
        command: String,
        /// at:<timestamp>, in:<duration>, every:<duration> or align:<duration>
        time_spec: String,
        targets: Vec<String>,
    },
    /// Cancel a scheduled command
    Cancel { id: String },
    /// List pending schedule entries
    Schedules,
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,ledshow_fleet=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    match config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory store");
            let store = MemoryStore::default();
            run_with_store(config, store, cli.command).await
        }
        StorageConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite store");
            let store = SqliteStore::new(path).await?;
            run_with_store(config, store, cli.command).await
        }
    }
}

async fn run_with_store<S>(
    config: Config,
    store: S,
    command: CliCommand,
) -> color_eyre::Result<ExitCode>
where
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as ScheduleStore>::Error: std::error::Error + Send + Sync + 'static,
{
    match &config.channel {
        ChannelConfig::Ssh {
            user,
            connect_timeout_secs,
        } => {
            let channel = Arc::new(SshChannel::new(
                user.clone(),
                Duration::from_secs(*connect_timeout_secs),
            ));
            run_coordinator(config, store, channel, command).await
        }
        ChannelConfig::Mock { latency_ms } => {
            info!(latency_ms, "Using mock command channel");
            let channel = Arc::new(MockChannel::with_latency(Duration::from_millis(
                *latency_ms,
            )));
            run_coordinator(config, store, channel, command).await
        }
    }
}

async fn run_coordinator<S, C>(
    config: Config,
    store: S,
    channel: Arc<C>,
    command: CliCommand,
) -> color_eyre::Result<ExitCode>
where
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as ScheduleStore>::Error: std::error::Error + Send + Sync + 'static,
    C: CommandChannel,
{
    let registry = FleetRegistry::new();

    // reload the persisted fleet, then fold in the seed inventory
    for device in DeviceStore::load_devices(&store).await? {
        registry.register(device).await;
    }
    for seed in &config.devices {
        registry
            .register_if_absent(Device::new(
                DeviceName::new(seed.name.as_str()),
                seed.addr.as_str(),
            ))
            .await;
    }
    info!(devices = registry.len().await, "Fleet loaded");

    let remote = RemoteCommands::new(&config.remote);
    let dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::clone(&channel),
        remote.clone(),
        config.dispatch.clone(),
    );

    match command {
        CliCommand::Run => {
            run_daemon(config, store, channel, dispatcher, remote).await?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Register { name, addr } => {
            let device = Device::new(DeviceName::new(name.as_str()), addr.as_str());
            registry.register(device.clone()).await;
            DeviceStore::upsert_device(&store, &device).await?;
            println!("registered {name} at {addr}");
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::RunPattern { pattern, targets } => {
            let kind = CommandKind::parse("run-pattern", Some(&pattern))?;
            let command = Command::new(kind, Target::from_names(targets));
            dispatch_and_report(&dispatcher, &store, command).await
        }
        CliCommand::Stop { targets } => {
            let command = Command::new(CommandKind::Stop, Target::from_names(targets));
            dispatch_and_report(&dispatcher, &store, command).await
        }
        CliCommand::Reboot { targets } => {
            let command = Command::new(CommandKind::Reboot, Target::from_names(targets));
            dispatch_and_report(&dispatcher, &store, command).await
        }
        CliCommand::Shutdown { targets } => {
            let command = Command::new(CommandKind::Shutdown, Target::from_names(targets));
            dispatch_and_report(&dispatcher, &store, command).await
        }
        CliCommand::Status { targets } => {
            print_status(&registry, &config, targets).await;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Schedule {
            command,
            time_spec,
            targets,
        } => {
            let kind = parse_operator_command(&command)?;
            let now = jiff::Timestamp::now();
            let when = TimeSpec::parse(&time_spec, now)?;
            let entry = ScheduleEntry::new(when, Command::new(kind, Target::from_names(targets)));

            ScheduleStore::upsert_entry(&store, &entry).await?;
            match entry.when.next_fire(now) {
                Some(at) => println!("scheduled {} ({}), first fire {at}", entry.id, entry.when),
                None => println!("scheduled {} ({})", entry.id, entry.when),
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Cancel { id } => {
            let ulid: Ulid = id
                .parse()
                .map_err(|e| color_eyre::eyre::eyre!("invalid schedule id '{}': {}", id, e))?;
            if ScheduleStore::remove_entry(&store, ScheduleId(ulid)).await? {
                println!("canceled {id}");
            } else {
                println!("no pending entry {id}");
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Schedules => {
            let now = jiff::Timestamp::now();
            for entry in ScheduleStore::load_entries(&store).await? {
                let fire = entry
                    .when
                    .next_fire(now)
                    .map(|at| at.to_string())
                    .unwrap_or_else(|| "never".to_owned());
                println!(
                    "{}  {}  {}  next {}",
                    entry.id,
                    entry.command.kind.name(),
                    entry.when,
                    fire
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Operator shorthand for schedulable commands: a bare pattern name means
/// run-pattern.
fn parse_operator_command(name: &str) -> Result<CommandKind, CommandError> {
    match CommandKind::parse(name, None) {
        Err(CommandError::UnknownCommand(_)) => Ok(CommandKind::RunPattern {
            pattern: name.parse()?,
        }),
        other => other,
    }
}

async fn dispatch_and_report<S, C>(
    dispatcher: &Dispatcher<C>,
    store: &S,
    command: Command,
) -> color_eyre::Result<ExitCode>
where
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    C: CommandChannel,
{
    let report = dispatcher.dispatch(command).await?;

    let devices = dispatcher.registry().snapshot_all().await;
    DeviceStore::upsert_devices(store, &devices).await?;

    print_report(&report);
    Ok(ExitCode::from(report.outcome().exit_code()))
}

fn print_report(report: &DispatchReport) {
    for result in &report.results {
        let status = match result.status {
            DispatchStatus::Succeeded => "ok",
            DispatchStatus::Failed => "failed",
            DispatchStatus::TimedOut => "timed-out",
        };
        match &result.detail {
            Some(detail) => println!("{:<16} {status}: {detail}", result.device),
            None => println!("{:<16} {status}", result.device),
        }
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}

async fn print_status(registry: &FleetRegistry, config: &Config, targets: Vec<String>) {
    let filter = ledshow_fleet::FleetFilter {
        names: if targets.is_empty() {
            None
        } else {
            Some(targets.into_iter().map(DeviceName::new).collect())
        },
        reachability: None,
    };

    let now = jiff::Timestamp::now();
    let threshold = config.clocksync.threshold();
    let staleness = config.clocksync.staleness();

    for device in registry.list(&filter).await {
        let reach = match device.reachability {
            ledshow_core::Reachability::Reachable => "reachable",
            ledshow_core::Reachability::Unreachable => "unreachable",
            ledshow_core::Reachability::Unknown => "unknown",
        };
        let offset = match device.clock_offset(staleness, now) {
            Some(seconds) => format!("{:+.1}ms", seconds * 1000.0),
            None => "-".to_owned(),
        };
        let sync = match device.in_sync(threshold, staleness, now) {
            Some(true) => "in-sync",
            Some(false) => "drifted",
            None => "unknown",
        };
        println!(
            "{:<16} {:<20} {:<12} {:<12} {:<10} {}",
            device.name, device.addr, reach, device.lights, offset, sync
        );
    }
}

async fn run_daemon<S, C>(
    config: Config,
    store: S,
    channel: Arc<C>,
    dispatcher: Dispatcher<C>,
    remote: RemoteCommands,
) -> color_eyre::Result<()>
where
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as ScheduleStore>::Error: std::error::Error + Send + Sync + 'static,
    C: CommandChannel,
{
    let cancel = CancellationToken::new();

    // clock supervisor
    let supervisor = ClockSupervisor::new(
        dispatcher.clone(),
        channel,
        remote,
        config.clocksync.clone(),
    );
    let cancel_for_clock = cancel.clone();
    let clock_handle = tokio::spawn(async move {
        supervisor.run(cancel_for_clock).await;
    });

    // schedule trigger
    let book = ScheduleBook::new();
    let cancel_for_schedule = cancel.clone();
    let schedule_config = config.schedule.clone();
    let store_for_schedule = store.clone();
    let dispatcher_for_schedule = dispatcher.clone();
    let schedule_handle = tokio::spawn(async move {
        run_schedule_loop(
            book,
            dispatcher_for_schedule,
            store_for_schedule,
            schedule_config,
            cancel_for_schedule,
        )
        .await;
    });

    // HTTP server
    let http_addr = config.server.http_addr;
    let axum_app = Router::new().route("/health", get(health_handler));
    let axum_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(axum_listener, axum_app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    // Wait for background tasks to complete
    let _ = clock_handle.await;
    let _ = schedule_handle.await;

    // persist the final fleet snapshot
    let devices = dispatcher.registry().snapshot_all().await;
    if let Err(e) = DeviceStore::upsert_devices(&store, &devices).await {
        error!(error = %e, "Failed to persist fleet on shutdown");
    }

    info!("ledshow-fleet shut down complete");
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}
