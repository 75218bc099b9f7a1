//! Minimal iCalendar (RFC 5545) reader for public busy feeds.
//!
//! Reads `VEVENT` start/end/duration/summary/status plus the recurrence
//! properties. Expansion happens per query window, in `recurrence`.

use super::interval::{EventTime, FeedEvent};
use super::recurrence::Recurrence;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("line {line}: {message}")]
pub struct IcsError {
    pub line: usize,
    pub message: String,
}

impl IcsError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// One unfolded content line.
#[derive(Debug)]
struct Property<'a> {
    line: usize,
    name: String,
    params: Vec<(String, &'a str)>,
    value: &'a str,
}

impl Property<'_> {
    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    duration: Option<TimeDelta>,
    recurrence: Recurrence,
    cancelled: bool,
}

/// Parse a feed body into events, skipping cancelled ones.
pub fn parse_feed(body: &str) -> Result<Vec<FeedEvent>, IcsError> {
    let lines = unfold(body);
    let mut props = lines
        .iter()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, l)| parse_property(*n, l));

    match props.next().transpose()? {
        Some(p) if p.name == "BEGIN" && p.value.eq_ignore_ascii_case("VCALENDAR") => {}
        Some(p) => return Err(IcsError::new(p.line, "expected BEGIN:VCALENDAR")),
        None => return Err(IcsError::new(0, "empty feed")),
    }

    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;
    let mut event_line = 0;
    // Components nested below the calendar (or below the current event) that we skip.
    let mut skip_depth = 0usize;
    let mut closed = false;

    for prop in props {
        let prop = prop?;
        if closed {
            return Err(IcsError::new(prop.line, "content after END:VCALENDAR"));
        }

        match prop.name.as_str() {
            "BEGIN" => {
                if skip_depth > 0 || current.is_some() {
                    skip_depth += 1;
                } else if prop.value.eq_ignore_ascii_case("VEVENT") {
                    current = Some(EventBuilder::default());
                    event_line = prop.line;
                } else {
                    skip_depth += 1;
                }
            }
            "END" => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if let Some(builder) = current.take() {
                    if !prop.value.eq_ignore_ascii_case("VEVENT") {
                        return Err(IcsError::new(prop.line, "mismatched END inside VEVENT"));
                    }
                    if let Some(event) = finish(builder, event_line)? {
                        events.push(event);
                    }
                } else if prop.value.eq_ignore_ascii_case("VCALENDAR") {
                    closed = true;
                } else {
                    let message = format!("unexpected END:{}", prop.value);
                    return Err(IcsError::new(prop.line, message));
                }
            }
            _ => {
                if skip_depth == 0
                    && let Some(builder) = current.as_mut()
                {
                    apply(builder, &prop)?;
                }
            }
        }
    }

    if current.is_some() {
        return Err(IcsError::new(event_line, "unterminated VEVENT"));
    }
    if !closed {
        return Err(IcsError::new(lines.len(), "unterminated VCALENDAR"));
    }
    Ok(events)
}

fn apply(builder: &mut EventBuilder, prop: &Property<'_>) -> Result<(), IcsError> {
    match prop.name.as_str() {
        "UID" => builder.uid = Some(prop.value.to_string()),
        "SUMMARY" => builder.summary = Some(unescape_text(prop.value)),
        "DTSTART" => builder.start = Some(parse_time(prop, prop.value)?),
        "DTEND" => builder.end = Some(parse_time(prop, prop.value)?),
        "RRULE" => builder.recurrence.rules.push(prop.value.to_string()),
        "RDATE" => builder.recurrence.rdates.extend(parse_time_list(prop)?),
        "EXDATE" => builder.recurrence.exdates.extend(parse_time_list(prop)?),
        "DURATION" => {
            builder.duration = Some(
                parse_duration(prop.value)
                    .ok_or_else(|| IcsError::new(prop.line, "invalid DURATION"))?,
            );
        }
        "STATUS" => builder.cancelled = prop.value.eq_ignore_ascii_case("CANCELLED"),
        _ => {}
    }
    Ok(())
}

fn finish(builder: EventBuilder, line: usize) -> Result<Option<FeedEvent>, IcsError> {
    if builder.cancelled {
        return Ok(None);
    }
    let start = builder
        .start
        .ok_or_else(|| IcsError::new(line, "VEVENT without DTSTART"))?;
    let recurs = !builder.recurrence.rules.is_empty() || !builder.recurrence.rdates.is_empty();
    Ok(Some(FeedEvent {
        uid: builder.uid,
        summary: builder.summary,
        start,
        end: builder.end,
        duration: builder.duration,
        recurrence: recurs.then_some(builder.recurrence),
    }))
}

/// Join continuation lines (leading space or tab) onto their predecessor.
/// Keeps the 1-based line number where each logical line starts.
fn unfold(body: &str) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    for (idx, raw) in body.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix([' ', '\t'])
            && let Some((_, last)) = out.last_mut()
        {
            last.push_str(rest);
            continue;
        }
        out.push((idx + 1, raw.to_string()));
    }
    out
}

fn parse_property(line: usize, raw: &str) -> Result<Property<'_>, IcsError> {
    // The value starts at the first ':' outside a quoted parameter value.
    let mut in_quotes = false;
    let colon = raw
        .char_indices()
        .find(|&(_, c)| {
            if c == '"' {
                in_quotes = !in_quotes;
            }
            c == ':' && !in_quotes
        })
        .map(|(i, _)| i)
        .ok_or_else(|| IcsError::new(line, "content line without ':'"))?;

    let (head, value) = (&raw[..colon], &raw[colon + 1..]);
    let mut parts = head.split(';');
    let name = parts.next().unwrap_or_default().trim().to_ascii_uppercase();
    if name.is_empty() {
        return Err(IcsError::new(line, "content line without a name"));
    }

    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
        .collect();

    Ok(Property {
        line,
        name,
        params,
        value: value.trim(),
    })
}

/// Comma-separated `RDATE`/`EXDATE` values sharing one set of parameters.
/// `RDATE` periods contribute their start.
fn parse_time_list(prop: &Property<'_>) -> Result<Vec<EventTime>, IcsError> {
    prop.value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse_time(prop, v.split('/').next().unwrap_or(v)))
        .collect()
}

fn parse_time(prop: &Property<'_>, value: &str) -> Result<EventTime, IcsError> {
    let bad = || IcsError::new(prop.line, format!("invalid {} value '{value}'", prop.name));

    let is_date = prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'));
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EventTime::Date)
            .map_err(|_| bad());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| bad())?;
        return Ok(EventTime::Instant(naive.and_utc()));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| bad())?;
    let zone = prop
        .param("TZID")
        .and_then(|tzid| tzid.trim_start_matches('/').parse::<Tz>().ok());
    Ok(match zone {
        Some(tz) => EventTime::Zoned { local: naive, tz },
        // Unknown or absent zone: treat as studio-local wall time.
        None => EventTime::Floating(naive),
    })
}

/// `[+|-]P[nW][nD][T[nH][nM][nS]]`
fn parse_duration(raw: &str) -> Option<TimeDelta> {
    let (negative, rest) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = TimeDelta::zero();
    let mut in_time = false;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in rest.chars() {
        match c {
            'T' if !in_time && digits.is_empty() => in_time = true,
            '0'..='9' => digits.push(c),
            unit => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                let part = match (unit, in_time) {
                    ('W', false) => TimeDelta::try_weeks(n)?,
                    ('D', false) => TimeDelta::try_days(n)?,
                    ('H', true) => TimeDelta::try_hours(n)?,
                    ('M', true) => TimeDelta::try_minutes(n)?,
                    ('S', true) => TimeDelta::try_seconds(n)?,
                    _ => return None,
                };
                total = total.checked_add(&part)?;
                saw_component = true;
            }
        }
    }

    if !digits.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}

fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
