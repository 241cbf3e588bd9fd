use std::sync::Arc;
use std::time::Duration;

use ledshow_core::{Command, CommandKind, Device, DeviceName, Pattern, TimeSpec};
use ledshow_fleet::config::{DispatchConfig, RemoteConfig, ScheduleConfig};
use ledshow_fleet::remote::RemoteCommands;
use ledshow_fleet::schedule::run_schedule_loop;
use ledshow_fleet::storage::ScheduleStore;
use ledshow_fleet::{Dispatcher, FleetRegistry, MemoryStore, MockChannel, ScheduleBook};
use tokio_util::sync::CancellationToken;

// These tests drive the loop against the wall clock, so ticks and periods
// stay short and the assertions stay coarse.

async fn loop_fixture() -> (Arc<MockChannel>, Dispatcher<MockChannel>, MemoryStore) {
    let registry = FleetRegistry::new();
    registry
        .register(Device::new(DeviceName::new("hat-a"), "hat-a.local"))
        .await;

    let channel = Arc::new(MockChannel::new());
    let dispatcher = Dispatcher::new(
        registry,
        Arc::clone(&channel),
        RemoteCommands::new(&RemoteConfig {
            program: "/home/pi/hat/lights.py".into(),
        }),
        DispatchConfig {
            timeout_secs: 2,
            pool_size: 4,
        },
    );

    (channel, dispatcher, MemoryStore::default())
}

fn breathe() -> Command {
    Command::broadcast(CommandKind::RunPattern {
        pattern: Pattern::Breathe,
    })
}

#[tokio::test]
async fn overdue_one_shot_fires_once_and_is_unpersisted() {
    let (channel, dispatcher, store) = loop_fixture().await;

    let entry = ledshow_core::ScheduleEntry::new(
        TimeSpec::At {
            time: jiff::Timestamp::now() - jiff::SignedDuration::from_secs(1),
        },
        breathe(),
    );
    store.upsert_entry(&entry).await.unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_schedule_loop(
        ScheduleBook::new(),
        dispatcher,
        store.clone(),
        ScheduleConfig { tick_ms: 20 },
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(channel.calls().await.len(), 1);
    assert!(store.load_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn recurring_entry_fires_until_removed_from_the_store() {
    let (channel, dispatcher, store) = loop_fixture().await;

    let entry = ledshow_core::ScheduleEntry::new(
        TimeSpec::Every {
            period: jiff::SignedDuration::from_millis(150),
            anchor: jiff::Timestamp::now(),
        },
        breathe(),
    );
    store.upsert_entry(&entry).await.unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_schedule_loop(
        ScheduleBook::new(),
        dispatcher,
        store.clone(),
        ScheduleConfig { tick_ms: 20 },
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(channel.calls().await.len() >= 2);

    // cancel path: dropping the persisted entry stops future fires
    store.remove_entry(entry.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let settled = channel.calls().await.len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(channel.calls().await.len(), settled);

    cancel.cancel();
    handle.await.unwrap();
}
