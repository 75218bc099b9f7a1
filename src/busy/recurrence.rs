//! `RRULE`/`RDATE`/`EXDATE` expansion for public feed events.
//!
//! Rules run on the event's wall clock, so a weekly 10:00 stays at 10:00 on
//! both sides of a DST change. Each occurrence is resolved to an instant only
//! afterwards, by the same path a one-off event takes.

use super::interval::{EventTime, FeedEvent, SourceEvent, normalize};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::{RRuleSet, Tz as RuleTz};
use thiserror::Error as ThisError;
use tracing::debug;

/// Occurrences produced per event and query.
const MAX_OCCURRENCES: u16 = 1000;

/// Covers the widest UTC offset on either side of the query window.
const ZONE_SLACK_HOURS: i64 = 26;

const WALL_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recurrence {
    /// Raw `RRULE` values.
    pub rules: Vec<String>,
    pub rdates: Vec<EventTime>,
    pub exdates: Vec<EventTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("recurring event {uid}: {message}")]
pub struct RecurrenceError {
    pub uid: String,
    pub message: String,
}

/// Every occurrence of `event` that can overlap `[from, to)`, each as a
/// one-off event. Events without a recurrence come back unchanged.
pub fn expand(
    event: FeedEvent,
    studio_tz: &Tz,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<FeedEvent>, RecurrenceError> {
    let Some(recurrence) = event.recurrence.clone() else {
        return Ok(vec![event]);
    };
    let fail = |message: String| RecurrenceError {
        uid: event.uid.clone().unwrap_or_else(|| "<no uid>".to_string()),
        message,
    };

    let first = FeedEvent {
        recurrence: None,
        ..event.clone()
    };
    let span = normalize(SourceEvent::Feed(first), studio_tz)
        .map(|interval| interval.end - interval.start)
        .ok_or_else(|| fail("first occurrence is out of range".to_string()))?;

    let slack = TimeDelta::hours(ZONE_SLACK_HOURS);
    let lo = from
        .naive_utc()
        .checked_sub_signed(span)
        .and_then(|t| t.checked_sub_signed(slack))
        .unwrap_or(NaiveDateTime::MIN);
    let hi = to
        .naive_utc()
        .checked_add_signed(slack)
        .unwrap_or(NaiveDateTime::MAX);

    let (start_wall, zone) = wall_clock(&event.start, studio_tz);
    let mut walls = vec![start_wall];

    if !recurrence.rules.is_empty() {
        let mut text = format!("DTSTART:{}Z", start_wall.format(WALL_FORMAT));
        for rule in &recurrence.rules {
            text.push_str("\nRRULE:");
            text.push_str(&rule_on_wall_clock(rule, zone).map_err(fail)?);
        }
        let set: RRuleSet = text.parse().map_err(|e: rrule::RRuleError| fail(e.to_string()))?;
        let result = set
            .after(RuleTz::UTC.from_utc_datetime(&lo))
            .before(RuleTz::UTC.from_utc_datetime(&hi))
            .all(MAX_OCCURRENCES);
        if result.limited {
            debug!(uid = ?event.uid, max = MAX_OCCURRENCES, "recurrence truncated");
        }
        walls.extend(result.dates.iter().map(DateTime::naive_utc));
    }

    walls.extend(
        recurrence
            .rdates
            .iter()
            .map(|t| zone.from_utc_datetime(&t.resolve(studio_tz).naive_utc()).naive_local()),
    );
    walls.retain(|wall| (lo..=hi).contains(wall));
    walls.sort_unstable();
    walls.dedup();

    let excluded: Vec<DateTime<Utc>> = recurrence
        .exdates
        .iter()
        .map(|t| t.resolve(studio_tz))
        .collect();

    let mut occurrences = Vec::with_capacity(walls.len());
    for wall in walls {
        let shift = wall - start_wall;
        let Some(start) = shift_time(event.start, shift) else {
            continue;
        };
        if excluded.contains(&start.resolve(studio_tz)) {
            continue;
        }
        let end = match event.end {
            Some(end) => match shift_time(end, shift) {
                Some(end) => Some(end),
                None => continue,
            },
            None => None,
        };
        occurrences.push(FeedEvent {
            uid: event.uid.clone(),
            summary: event.summary.clone(),
            start,
            end,
            duration: event.duration,
            recurrence: None,
        });
    }
    Ok(occurrences)
}

/// Wall-clock reading of a start time and the zone that clock runs in.
fn wall_clock(time: &EventTime, studio_tz: &Tz) -> (NaiveDateTime, Tz) {
    match *time {
        EventTime::Instant(at) => (at.naive_utc(), Tz::UTC),
        EventTime::Zoned { local, tz } => (local, tz),
        EventTime::Floating(local) => (local, *studio_tz),
        EventTime::Date(date) => (date.and_time(NaiveTime::MIN), *studio_tz),
    }
}

fn shift_time(time: EventTime, by: TimeDelta) -> Option<EventTime> {
    Some(match time {
        EventTime::Instant(at) => EventTime::Instant(at.checked_add_signed(by)?),
        EventTime::Zoned { local, tz } => EventTime::Zoned {
            local: local.checked_add_signed(by)?,
            tz,
        },
        EventTime::Floating(local) => EventTime::Floating(local.checked_add_signed(by)?),
        EventTime::Date(date) => {
            EventTime::Date(date.checked_add_signed(TimeDelta::try_days(by.num_days())?)?)
        }
    })
}

/// Rewrites `UNTIL` onto the same wall clock as `DTSTART`.
fn rule_on_wall_clock(rule: &str, zone: Tz) -> Result<String, String> {
    let parts = rule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("UNTIL") => {
                let wall = until_wall(value.trim(), zone)
                    .ok_or_else(|| format!("invalid UNTIL '{value}'"))?;
                Ok(format!("UNTIL={}Z", wall.format(WALL_FORMAT)))
            }
            _ => Ok(part.to_string()),
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(parts.join(";"))
}

fn until_wall(value: &str, zone: Tz) -> Option<NaiveDateTime> {
    if let Some(utc) = value.strip_suffix('Z') {
        let at = NaiveDateTime::parse_from_str(utc, WALL_FORMAT).ok()?;
        return Some(zone.from_utc_datetime(&at).naive_local());
    }
    if value.len() == 8 {
        // A date UNTIL includes that whole day.
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()?
            .and_hms_opt(23, 59, 59);
    }
    NaiveDateTime::parse_from_str(value, WALL_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::London;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn local(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn recurring(start: EventTime, rules: &[&str], exdates: Vec<EventTime>) -> FeedEvent {
        FeedEvent {
            uid: Some("series@studio".to_string()),
            summary: Some("Walk-ins".to_string()),
            start,
            end: None,
            duration: Some(TimeDelta::hours(2)),
            recurrence: Some(Recurrence {
                rules: rules.iter().map(ToString::to_string).collect(),
                rdates: Vec::new(),
                exdates,
            }),
        }
    }

    fn starts(events: &[FeedEvent]) -> Vec<DateTime<Utc>> {
        events.iter().map(|e| e.start.resolve(&London)).collect()
    }

    #[test]
    fn one_off_events_pass_through() {
        let event = FeedEvent {
            recurrence: None,
            ..recurring(EventTime::Floating(local("2026-07-02 10:00")), &[], Vec::new())
        };
        let out = expand(
            event.clone(),
            &London,
            utc("2026-07-01T00:00:00Z"),
            utc("2026-07-08T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(out, vec![event]);
    }

    #[test]
    fn weekly_series_started_long_ago_reaches_the_window() {
        // Thursdays at 10:00 studio time since New Year.
        let event = recurring(
            EventTime::Floating(local("2026-01-01 10:00")),
            &["FREQ=WEEKLY"],
            Vec::new(),
        );
        let out = expand(
            event,
            &London,
            utc("2026-07-01T00:00:00Z"),
            utc("2026-07-15T00:00:00Z"),
        )
        .unwrap();

        let inside: Vec<_> = starts(&out)
            .into_iter()
            .filter(|s| *s >= utc("2026-07-01T00:00:00Z") && *s < utc("2026-07-15T00:00:00Z"))
            .collect();
        assert_eq!(
            inside,
            vec![utc("2026-07-02T09:00:00Z"), utc("2026-07-09T09:00:00Z")]
        );
        assert!(out.iter().all(|e| e.recurrence.is_none()));
        assert!(out.iter().all(|e| e.duration == Some(TimeDelta::hours(2))));
    }

    #[test]
    fn wall_clock_survives_the_autumn_change() {
        let event = recurring(
            EventTime::Zoned {
                local: local("2026-10-20 10:00"),
                tz: London,
            },
            &["FREQ=WEEKLY;COUNT=3"],
            Vec::new(),
        );
        let out = expand(
            event,
            &London,
            utc("2026-10-19T00:00:00Z"),
            utc("2026-11-10T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(
            starts(&out),
            vec![
                utc("2026-10-20T09:00:00Z"),
                utc("2026-10-27T10:00:00Z"),
                utc("2026-11-03T10:00:00Z"),
            ]
        );
    }

    #[test]
    fn exdates_and_until_trim_the_series() {
        let event = recurring(
            EventTime::Instant(utc("2026-07-01T17:00:00Z")),
            &["FREQ=DAILY;UNTIL=20260705T170000Z"],
            vec![EventTime::Instant(utc("2026-07-03T17:00:00Z"))],
        );
        let out = expand(
            event,
            &London,
            utc("2026-07-01T00:00:00Z"),
            utc("2026-07-31T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(
            starts(&out),
            vec![
                utc("2026-07-01T17:00:00Z"),
                utc("2026-07-02T17:00:00Z"),
                utc("2026-07-04T17:00:00Z"),
                utc("2026-07-05T17:00:00Z"),
            ]
        );
    }

    #[test]
    fn until_is_read_on_the_event_clock() {
        assert_eq!(
            rule_on_wall_clock("FREQ=DAILY;UNTIL=20260705T090000Z", London).unwrap(),
            "FREQ=DAILY;UNTIL=20260705T100000Z"
        );
        assert_eq!(
            rule_on_wall_clock("FREQ=DAILY;UNTIL=20260705", London).unwrap(),
            "FREQ=DAILY;UNTIL=20260705T235959Z"
        );
        assert!(rule_on_wall_clock("FREQ=DAILY;UNTIL=soon", London).is_err());
    }

    #[test]
    fn unparseable_rules_are_errors() {
        let event = recurring(
            EventTime::Floating(local("2026-07-01 10:00")),
            &["FREQ=FORTNIGHTLY"],
            Vec::new(),
        );
        let err = expand(
            event,
            &London,
            utc("2026-07-01T00:00:00Z"),
            utc("2026-07-08T00:00:00Z"),
        )
        .unwrap_err();
        assert_eq!(err.uid, "series@studio");
    }
}
