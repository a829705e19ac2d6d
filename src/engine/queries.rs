use ulid::Ulid;

use crate::model::*;

use super::aggregate::aggregate;
use super::{Engine, EngineError};

impl Engine {
    /// Snapshot every stored record. Days are read-locked one at a time in
    /// canonical order; records within a day come out sorted by start.
    pub async fn list_records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.record_count());
        for day in Weekday::ALL {
            let guard = self.day_state(day).read().await;
            records.extend(guard.records.iter().cloned());
        }
        records
    }

    pub async fn list_day(&self, day: Weekday) -> Vec<Record> {
        self.day_state(day).read().await.records.clone()
    }

    pub async fn get_record(&self, id: Ulid) -> Result<Record, EngineError> {
        let day = self
            .get_day_for_record(&id)
            .ok_or(EngineError::RecordNotFound(id))?;
        let guard = self.day_state(day).read().await;
        guard.get(&id).cloned().ok_or(EngineError::RecordNotFound(id))
    }

    /// The weekly view, rebuilt from the current records on every call.
    pub async fn weekly_schedule(&self) -> WeeklySchedule {
        aggregate(&self.list_records().await)
    }
}
