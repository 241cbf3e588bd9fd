use std::collections::HashMap;
use std::sync::Arc;

use ledshow_core::{ScheduleEntry, ScheduleId};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::channel::CommandChannel;
use crate::config::ScheduleConfig;
use crate::dispatch::Dispatcher;
use crate::storage::{DeviceStore, ScheduleStore};

struct Pending {
    entry: ScheduleEntry,
    next_fire: jiff::Timestamp,
}

/// The pending schedule set, each entry paired with its computed fire time.
#[derive(Clone, Default)]
pub struct ScheduleBook {
    inner: Arc<Mutex<HashMap<ScheduleId, Pending>>>,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry. Returns false when the spec can never fire.
    pub async fn insert(&self, entry: ScheduleEntry, now: jiff::Timestamp) -> bool {
        let Some(next_fire) = entry.when.next_fire(now) else {
            return false;
        };
        let mut map = self.inner.lock().await;
        map.insert(entry.id, Pending { entry, next_fire });
        true
    }

    /// Cancel a pending or recurring entry. Canceling a nonexistent id is a
    /// no-op; an in-flight fire is never rolled back.
    pub async fn cancel(&self, id: ScheduleId) -> bool {
        let mut map = self.inner.lock().await;
        map.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Pending entries with their next fire times, soonest first.
    pub async fn pending(&self) -> Vec<(ScheduleEntry, jiff::Timestamp)> {
        let map = self.inner.lock().await;
        let mut entries: Vec<_> = map
            .values()
            .map(|p| (p.entry.clone(), p.next_fire))
            .collect();
        entries.sort_by_key(|(_, at)| *at);
        entries
    }

    /// Mirror the persisted entry set: ids not yet in the book are added
    /// (fire time computed from `now`), ids no longer persisted are dropped.
    /// Entries already in the book keep their advanced fire times.
    pub async fn reconcile(&self, persisted: Vec<ScheduleEntry>, now: jiff::Timestamp) {
        let mut map = self.inner.lock().await;

        map.retain(|id, _| persisted.iter().any(|e| e.id == *id));

        for entry in persisted {
            if map.contains_key(&entry.id) {
                continue;
            }
            if let Some(next_fire) = entry.when.next_fire(now) {
                debug!(schedule = %entry.id, fire_at = %next_fire, "Schedule entry registered");
                map.insert(entry.id, Pending { entry, next_fire });
            }
        }
    }

    /// Remove and return every entry due at `now`. Recurring entries are
    /// advanced to their next wall-clock slot and stay in the book.
    pub async fn take_due(&self, now: jiff::Timestamp) -> Vec<ScheduleEntry> {
        let mut map = self.inner.lock().await;

        let due_ids: Vec<ScheduleId> = map
            .iter()
            .filter(|(_, p)| p.next_fire <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut due = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            if let Some(pending) = map.remove(&id) {
                if pending.entry.when.is_recurring()
                    && let Some(next_fire) = pending.entry.when.next_fire(now)
                {
                    map.insert(
                        id,
                        Pending {
                            entry: pending.entry.clone(),
                            next_fire,
                        },
                    );
                }
                due.push(pending.entry);
            }
        }
        due
    }
}

/// Timer-driven trigger loop: reconciles the book against the schedule
/// store each tick and fires due entries through the dispatcher.
///
/// Fires are spawned, never awaited under the book lock, so canceling an
/// entry stays responsive while a fire is in flight (and does not abort it).
pub async fn run_schedule_loop<C, S>(
    book: ScheduleBook,
    dispatcher: Dispatcher<C>,
    store: S,
    config: ScheduleConfig,
    cancel: CancellationToken,
) where
    C: CommandChannel,
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as ScheduleStore>::Error: std::error::Error + Send + Sync + 'static,
{
    info!(tick_ms = config.tick_ms, "Schedule trigger started");

    let mut interval = tokio::time::interval(config.tick());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Schedule trigger shutting down");
                break;
            }
            _ = interval.tick() => {
                let now = jiff::Timestamp::now();

                match ScheduleStore::load_entries(&store).await {
                    Ok(entries) => book.reconcile(entries, now).await,
                    Err(e) => error!(error = %e, "Failed to load schedule entries"),
                }

                for entry in book.take_due(now).await {
                    if !entry.when.is_recurring()
                        && let Err(e) = ScheduleStore::remove_entry(&store, entry.id).await
                    {
                        error!(schedule = %entry.id, error = %e, "Failed to remove fired entry");
                    }

                    fire(entry, dispatcher.clone(), store.clone());
                }
            }
        }
    }
}

fn fire<C, S>(entry: ScheduleEntry, dispatcher: Dispatcher<C>, store: S)
where
    C: CommandChannel,
    S: DeviceStore + ScheduleStore + Clone + Send + Sync + 'static,
    <S as DeviceStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as ScheduleStore>::Error: std::error::Error + Send + Sync + 'static,
{
    info!(
        schedule = %entry.id,
        command = entry.command.kind.name(),
        "Schedule entry firing"
    );

    tokio::spawn(async move {
        match dispatcher.dispatch(entry.command.clone()).await {
            Ok(report) => {
                info!(
                    schedule = %entry.id,
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    "Scheduled dispatch complete"
                );
                let devices = dispatcher.registry().snapshot_all().await;
                if let Err(e) = DeviceStore::upsert_devices(&store, &devices).await {
                    error!(error = %e, "Failed to persist fleet after scheduled dispatch");
                }
            }
            Err(e) => {
                error!(schedule = %entry.id, error = %e, "Scheduled dispatch failed");
            }
        }
    });
}
