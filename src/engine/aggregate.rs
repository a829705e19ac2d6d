use crate::model::*;

/// Build the weekly view from an unordered set of records.
///
/// Records are bucketed into a fixed 7-slot array by weekday, each bucket is
/// stably sorted by start time (equal starts keep input order), and empty days
/// are left out. The result is rebuilt on every call.
pub fn aggregate<'a, I>(records: I) -> WeeklySchedule
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut buckets: [Vec<&Record>; 7] = Default::default();
    for record in records {
        buckets[record.day.index()].push(record);
    }

    let days = Weekday::ALL
        .into_iter()
        .zip(buckets)
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(day, mut bucket)| {
            bucket.sort_by_key(|r| r.span.start);
            DaySchedule {
                day,
                slots: bucket.into_iter().map(SlotView::from).collect(),
            }
        })
        .collect();

    WeeklySchedule { days }
}
