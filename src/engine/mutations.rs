use tokio::sync::oneshot;
use ulid::Ulid;

use crate::model::*;

use super::conflict::{check_no_conflict, validate_bounds, validate_tags};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Validate and store a new record. The id is assigned here.
    pub async fn create_record(
        &self,
        day: Weekday,
        start: TimeOfDay,
        end: TimeOfDay,
        tags: Vec<i64>,
    ) -> Result<Record, EngineError> {
        let span = validate_bounds(start, end)?;
        validate_tags(&tags)?;

        let mut guard = self.day_state(day).write().await;
        check_no_conflict(&guard, &span, None)?;

        let id = Ulid::new();
        let event = Event::RecordCreated { id, day, span, tags: tags.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::debug!("created record {id} on {day} {span}");
        Ok(Record { id, day, span, tags })
    }

    /// Partial update of a record's bounds. Omitted bounds keep their stored value;
    /// day and tags never change.
    pub async fn update_record(
        &self,
        id: Ulid,
        start: Option<TimeOfDay>,
        end: Option<TimeOfDay>,
    ) -> Result<Record, EngineError> {
        let mut guard = self.resolve_record_write(&id).await?;
        let current = guard
            .get(&id)
            .cloned()
            .ok_or(EngineError::RecordNotFound(id))?;

        let span = validate_bounds(
            start.unwrap_or(current.span.start),
            end.unwrap_or(current.span.end),
        )?;
        if span == current.span {
            return Ok(current);
        }
        check_no_conflict(&guard, &span, Some(id))?;

        let event = Event::RecordRescheduled { id, day: current.day, span };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::debug!("rescheduled record {id} on {} to {span}", current.day);
        Ok(Record { span, ..current })
    }

    pub async fn delete_record(&self, id: Ulid) -> Result<Weekday, EngineError> {
        let mut guard = self.resolve_record_write(&id).await?;
        let day = guard.day;
        let event = Event::RecordDeleted { id, day };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::debug!("deleted record {id} from {day}");
        Ok(day)
    }

    /// Compact the WAL by rewriting it with one creation event per live record.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Hold every day's read lock (canonical order) so the snapshot and the
        // swap are not interleaved with a commit.
        let mut guards = Vec::with_capacity(7);
        for day in Weekday::ALL {
            guards.push(self.day_state(day).read().await);
        }

        let events: Vec<Event> = guards
            .iter()
            .flat_map(|ds| ds.records.iter())
            .map(|r| Event::RecordCreated {
                id: r.id,
                day: r.day,
                span: r.span,
                tags: r.tags.clone(),
            })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
