use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use ulid::Ulid;

/// Day of the week. Declaration order is the canonical week order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Position in the canonical week, 0 = monday.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .ok_or_else(|| format!("invalid day '{s}', expected monday..sunday"))
    }
}

/// Time of day with minute precision, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < Self::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Accepts `HH:MM`, or `HH:MM:SS` with zero seconds.
impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid time '{s}', expected HH:MM");
        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(invalid)?;
        let minute = parts.next().ok_or_else(invalid)?;
        if let Some(second) = parts.next() {
            if second.len() != 2 || second != "00" {
                return Err(format!("invalid time '{s}', seconds are not supported"));
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        let field = |p: &str| -> Result<u8, String> {
            if p.is_empty() || p.len() > 2 || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            p.parse().map_err(|_| invalid())
        };
        TimeOfDay::new(field(hour)?, field(minute)?).ok_or_else(invalid)
    }
}

/// `max(a_start, b_start) < min(a_end, b_end)`. Intervals that only touch do not overlap.
pub fn overlaps(a_start: TimeOfDay, a_end: TimeOfDay, b_start: TimeOfDay, b_end: TimeOfDay) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// Half-open interval `[start, end)` within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Span {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// One stored interval on a weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Ulid,
    pub day: Weekday,
    pub span: Span,
    pub tags: Vec<i64>,
}

/// All records of one weekday.
#[derive(Debug, Clone)]
pub struct DayState {
    pub day: Weekday,
    /// Sorted by `span.start`.
    pub records: Vec<Record>,
}

impl DayState {
    pub fn new(day: Weekday) -> Self {
        Self {
            day,
            records: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start; equal starts keep insertion order.
    pub fn insert_record(&mut self, record: Record) {
        let pos = self
            .records
            .partition_point(|r| r.span.start <= record.span.start);
        self.records.insert(pos, record);
    }

    pub fn remove_record(&mut self, id: Ulid) -> Option<Record> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    pub fn get(&self, id: &Ulid) -> Option<&Record> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Records whose span overlaps the query window.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Record> {
        // Everything at index >= right_bound starts at or after query.end.
        let right_bound = self.records.partition_point(|r| r.span.start < query.end);
        self.records[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RecordCreated {
        id: Ulid,
        day: Weekday,
        span: Span,
        tags: Vec<i64>,
    },
    RecordRescheduled {
        id: Ulid,
        day: Weekday,
        span: Span,
    },
    RecordDeleted {
        id: Ulid,
        day: Weekday,
    },
}

impl Event {
    pub fn day(&self) -> Weekday {
        match self {
            Event::RecordCreated { day, .. }
            | Event::RecordRescheduled { day, .. }
            | Event::RecordDeleted { day, .. } => *day,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A record as it appears in the weekly view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub record_id: Ulid,
    pub start: String,
    pub stop: String,
    pub tags: Vec<i64>,
}

impl From<&Record> for SlotView {
    fn from(record: &Record) -> Self {
        Self {
            record_id: record.id,
            start: record.span.start.to_string(),
            stop: record.span.end.to_string(),
            tags: record.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub day: Weekday,
    pub slots: Vec<SlotView>,
}

/// Populated days in canonical order, each with its slots ordered by start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub days: Vec<DaySchedule>,
}

impl WeeklySchedule {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day(&self, day: Weekday) -> Option<&DaySchedule> {
        self.days.iter().find(|d| d.day == day)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Serialized as a JSON object keyed by day name, keys in canonical order.
impl Serialize for WeeklySchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for day in &self.days {
            map.serialize_entry(day.day.name(), &day.slots)?;
        }
        map.end()
    }
}
