use ulid::Ulid;

use crate::model::{Span, TimeOfDay, Weekday};

#[derive(Debug)]
pub enum EngineError {
    InvalidBounds {
        start: TimeOfDay,
        end: TimeOfDay,
    },
    IntervalConflict {
        day: Weekday,
        requested: Span,
        existing_id: Ulid,
        existing: Span,
    },
    RecordNotFound(Ulid),
    MissingIdentifier,
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidBounds { start, end } => {
                write!(f, "end time must be greater than start time: {start} - {end}")
            }
            EngineError::IntervalConflict {
                day,
                requested,
                existing_id,
                existing,
            } => write!(
                f,
                "time interval {requested} overlaps with an existing interval on {day}: {existing} (record {existing_id})"
            ),
            EngineError::RecordNotFound(id) => write!(f, "record not found: {id}"),
            EngineError::MissingIdentifier => write!(f, "record id is required"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
