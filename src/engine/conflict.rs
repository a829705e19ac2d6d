use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_bounds(start: TimeOfDay, end: TimeOfDay) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidBounds { start, end });
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_tags(tags: &[i64]) -> Result<(), EngineError> {
    if tags.len() > crate::limits::MAX_TAGS_PER_RECORD {
        return Err(EngineError::LimitExceeded("too many tags on record"));
    }
    Ok(())
}

/// Scan the day for a record overlapping `span`. `exclude` skips the record being
/// moved so it is never tested against its own prior position.
pub(crate) fn check_no_conflict(
    ds: &DayState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let hit = ds
        .overlapping(span)
        .find(|r| Some(r.id) != exclude && overlaps(span.start, span.end, r.span.start, r.span.end));
    match hit {
        Some(existing) => {
            metrics::counter!(crate::observability::INTERVAL_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::IntervalConflict {
                day: ds.day,
                requested: *span,
                existing_id: existing.id,
                existing: existing.span,
            })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn day_with(spans: &[(&str, &str)]) -> (DayState, Vec<Ulid>) {
        let mut ds = DayState::new(Weekday::Monday);
        let mut ids = Vec::new();
        for (a, b) in spans {
            let id = Ulid::new();
            ids.push(id);
            ds.insert_record(Record {
                id,
                day: Weekday::Monday,
                span: Span::new(t(a), t(b)),
                tags: vec![],
            });
        }
        (ds, ids)
    }

    #[test]
    fn bounds_must_be_strictly_ordered() {
        assert!(validate_bounds(t("09:00"), t("10:00")).is_ok());
        assert!(matches!(
            validate_bounds(t("10:00"), t("10:00")),
            Err(EngineError::InvalidBounds { .. })
        ));
        assert!(matches!(
            validate_bounds(t("11:00"), t("10:00")),
            Err(EngineError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn conflict_reports_existing_bounds() {
        let (ds, ids) = day_with(&[("09:00", "10:00")]);
        let err = check_no_conflict(&ds, &Span::new(t("09:30"), t("11:00")), None).unwrap_err();
        match err {
            EngineError::IntervalConflict { day, existing_id, existing, .. } => {
                assert_eq!(day, Weekday::Monday);
                assert_eq!(existing_id, ids[0]);
                assert_eq!(existing, Span::new(t("09:00"), t("10:00")));
            }
            other => panic!("expected IntervalConflict, got {other:?}"),
        }
    }

    #[test]
    fn touching_is_not_a_conflict() {
        let (ds, _) = day_with(&[("09:00", "10:00"), ("11:00", "12:00")]);
        assert!(check_no_conflict(&ds, &Span::new(t("10:00"), t("11:00")), None).is_ok());
    }

    #[test]
    fn excluded_record_is_ignored() {
        let (ds, ids) = day_with(&[("09:00", "10:00"), ("12:00", "13:00")]);
        let moved = Span::new(t("09:30"), t("10:30"));
        assert!(check_no_conflict(&ds, &moved, Some(ids[0])).is_ok());
        assert!(check_no_conflict(&ds, &Span::new(t("09:30"), t("12:30")), Some(ids[0])).is_err());
    }

    #[test]
    fn too_many_tags_rejected() {
        let tags = vec![0; crate::limits::MAX_TAGS_PER_RECORD + 1];
        assert!(matches!(validate_tags(&tags), Err(EngineError::LimitExceeded(_))));
        assert!(validate_tags(&[1, 2, 3]).is_ok());
    }
}
