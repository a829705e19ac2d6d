mod aggregate;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use aggregate::aggregate;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The weekly schedule store: seven independently locked days plus a record index.
///
/// A mutation holds its day's write lock across the conflict scan, the WAL
/// append and the in-memory apply, so same-day writers are fully serialized.
pub struct Engine {
    days: [SharedDayState; 7],
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: record id → day
    pub(super) record_to_day: DashMap<Ulid, Weekday>,
}

/// Apply an event directly to a DayState (no locking — caller holds the lock).
fn apply_to_day(ds: &mut DayState, event: &Event, index: &DashMap<Ulid, Weekday>) {
    match event {
        Event::RecordCreated { id, day, span, tags } => {
            ds.insert_record(Record {
                id: *id,
                day: *day,
                span: *span,
                tags: tags.clone(),
            });
            index.insert(*id, *day);
        }
        Event::RecordRescheduled { id, span, .. } => {
            if let Some(mut record) = ds.remove_record(*id) {
                record.span = *span;
                ds.insert_record(record);
            }
        }
        Event::RecordDeleted { id, .. } => {
            ds.remove_record(*id);
            index.remove(id);
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            days: Weekday::ALL.map(|day| Arc::new(RwLock::new(DayState::new(day)))),
            wal_tx,
            record_to_day: DashMap::new(),
        };

        // Replay: we're the sole owner of these Arcs, so try_write always succeeds.
        // Never use blocking_write here, this may run inside an async context.
        for event in &events {
            let mut guard = engine
                .day_state(event.day())
                .try_write()
                .map_err(|_| io::Error::other("replay: day state contended"))?;
            apply_to_day(&mut guard, event, &engine.record_to_day);
        }
        tracing::debug!(
            "replayed {} events, {} live records",
            events.len(),
            engine.record_to_day.len()
        );

        Ok(engine)
    }

    pub fn day_state(&self, day: Weekday) -> &SharedDayState {
        &self.days[day.index()]
    }

    pub fn get_day_for_record(&self, id: &Ulid) -> Option<Weekday> {
        self.record_to_day.get(id).map(|e| *e.value())
    }

    pub fn record_count(&self) -> usize {
        self.record_to_day.len()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. The caller holds the day's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        ds: &mut DayState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(ds, event, &self.record_to_day);
        Ok(())
    }

    /// Lookup record → day, acquire that day's write lock.
    ///
    /// The record is re-checked under the lock: a concurrent delete may have
    /// removed it between the index lookup and the acquire.
    pub(super) async fn resolve_record_write(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let day = self
            .get_day_for_record(id)
            .ok_or(EngineError::RecordNotFound(*id))?;
        let guard = self.day_state(day).clone().write_owned().await;
        if guard.get(id).is_none() {
            return Err(EngineError::RecordNotFound(*id));
        }
        Ok(guard)
    }
}
