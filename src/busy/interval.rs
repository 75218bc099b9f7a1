use super::recurrence::Recurrence;
use crate::calendar::CalendarEvent;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Label used when a source event has no usable title.
pub const PLACEHOLDER_LABEL: &str = "Busy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    AuthenticatedCalendar,
    PublicFeed,
}

/// A start/end value as the source expressed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// Absolute instant (UTC or an explicit offset).
    Instant(DateTime<Utc>),
    /// Wall-clock time in a recognised zone. Kept local so recurrences
    /// repeat on the wall clock.
    Zoned { local: NaiveDateTime, tz: Tz },
    /// Wall-clock time with no zone; read in the studio zone.
    Floating(NaiveDateTime),
    /// All-day value; starts at local midnight in the studio zone.
    Date(NaiveDate),
}

impl EventTime {
    pub fn resolve(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            EventTime::Instant(at) => *at,
            EventTime::Zoned { local, tz } => resolve_local(tz, *local),
            EventTime::Floating(naive) => resolve_local(tz, *naive),
            EventTime::Date(date) => resolve_local(tz, date.and_time(chrono::NaiveTime::MIN)),
        }
    }
}

/// Local wall time to an instant. Ambiguous (fall-back) times take the earlier
/// instant; times inside a spring-forward gap are pushed past the gap.
pub fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(at) = tz.from_local_datetime(&naive).earliest() {
        return at.with_timezone(&Utc);
    }
    // No zone has a gap longer than a few hours.
    (1..=4)
        .find_map(|h| {
            let shifted = naive.checked_add_signed(TimeDelta::hours(h))?;
            tz.from_local_datetime(&shifted).earliest()
        })
        .map_or_else(|| naive.and_utc(), |at| at.with_timezone(&Utc))
}

/// One event parsed out of a public iCalendar feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub duration: Option<TimeDelta>,
    /// `RRULE`/`RDATE`/`EXDATE`, expanded per query window.
    pub recurrence: Option<Recurrence>,
}

/// Either source shape, before normalization.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Calendar(CalendarEvent),
    Feed(FeedEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyInterval {
    pub source: SourceKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl BusyInterval {
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        if self.start == self.end {
            return self.start >= from && self.start < to;
        }
        self.start < to && self.end > from
    }
}

/// The single mapping from either source shape to a [`BusyInterval`].
///
/// A missing end means one day for all-day starts, the event's `DURATION` when
/// given, otherwise a zero-length interval. An end before the start is clamped.
/// `None` when the end falls outside the representable time range.
pub fn normalize(event: SourceEvent, tz: &Tz) -> Option<BusyInterval> {
    let (source, summary, start, end, duration) = match event {
        SourceEvent::Calendar(ev) => (
            SourceKind::AuthenticatedCalendar,
            ev.summary,
            ev.start,
            ev.end,
            None,
        ),
        SourceEvent::Feed(ev) => (
            SourceKind::PublicFeed,
            ev.summary,
            ev.start,
            ev.end,
            ev.duration,
        ),
    };

    let start_at = start.resolve(tz);
    let end_at = match (end, duration) {
        (Some(end), _) => end.resolve(tz),
        (None, Some(duration)) => start_at.checked_add_signed(duration)?,
        (None, None) => match start {
            EventTime::Date(date) => EventTime::Date(date.succ_opt()?).resolve(tz),
            _ => start_at,
        },
    };

    let label = summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_LABEL.to_string());

    Some(BusyInterval {
        source,
        start: start_at,
        end: end_at.max(start_at),
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::London;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn feed(start: EventTime, end: Option<EventTime>) -> SourceEvent {
        SourceEvent::Feed(FeedEvent {
            uid: None,
            summary: None,
            start,
            end,
            duration: None,
            recurrence: None,
        })
    }

    #[test]
    fn floating_time_reads_in_studio_zone() {
        let summer = EventTime::Floating(naive("2026-07-01 10:00:00"));
        assert_eq!(summer.resolve(&London), utc("2026-07-01T09:00:00Z"));

        let winter = EventTime::Floating(naive("2026-01-15 10:00:00"));
        assert_eq!(winter.resolve(&London), utc("2026-01-15T10:00:00Z"));
    }

    #[test]
    fn dst_edges_resolve_deterministically() {
        // 01:30 happens twice on 2026-10-25 in London.
        let ambiguous = resolve_local(&London, naive("2026-10-25 01:30:00"));
        assert_eq!(ambiguous, utc("2026-10-25T00:30:00Z"));

        // 01:30 does not exist on 2026-03-29 in London.
        let gap = resolve_local(&London, naive("2026-03-29 01:30:00"));
        assert_eq!(gap, utc("2026-03-29T01:30:00Z"));
    }

    #[test]
    fn missing_end_and_title_fall_back() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let all_day = normalize(feed(EventTime::Date(date), None), &London).unwrap();
        assert_eq!(all_day.start, utc("2026-01-10T00:00:00Z"));
        assert_eq!(all_day.end, utc("2026-01-11T00:00:00Z"));
        assert_eq!(all_day.label, PLACEHOLDER_LABEL);
        assert_eq!(all_day.source, SourceKind::PublicFeed);

        let at = utc("2026-01-10T12:00:00Z");
        let instant = normalize(feed(EventTime::Instant(at), None), &London).unwrap();
        assert_eq!(instant.start, instant.end);
    }

    #[test]
    fn end_before_start_is_clamped() {
        let start = utc("2026-01-10T12:00:00Z");
        let end = utc("2026-01-10T11:00:00Z");
        let interval = normalize(
            SourceEvent::Calendar(CalendarEvent {
                id: "e1".to_string(),
                summary: Some("  Sleeve session ".to_string()),
                start: EventTime::Instant(start),
                end: Some(EventTime::Instant(end)),
            }),
            &London,
        )
        .unwrap();
        assert_eq!(interval.end, start);
        assert_eq!(interval.label, "Sleeve session");
        assert_eq!(interval.source, SourceKind::AuthenticatedCalendar);
    }

    #[test]
    fn out_of_range_end_is_rejected_not_panicking() {
        let at = utc("2026-07-01T10:00:00Z");
        let huge = SourceEvent::Feed(FeedEvent {
            uid: None,
            summary: None,
            start: EventTime::Instant(at),
            end: None,
            duration: Some(TimeDelta::days(100_000_000)),
            recurrence: None,
        });
        assert_eq!(normalize(huge, &London), None);
    }

    #[test]
    fn zoned_time_keeps_its_own_zone() {
        let zoned = EventTime::Zoned {
            local: naive("2026-07-02 10:00:00"),
            tz: chrono_tz::America::New_York,
        };
        assert_eq!(zoned.resolve(&London), utc("2026-07-02T14:00:00Z"));
    }
}
