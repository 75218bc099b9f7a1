use crate::busy::EventTime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the artist's calendar list, as returned to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub access_role: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// An event from the authenticated calendar API, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: EventTime,
    pub end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListPage {
    #[serde(default)]
    pub items: Vec<CalendarSummary>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsPage {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: Option<ApiEventTime>,
    #[serde(default)]
    pub end: Option<ApiEventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEventTime {
    #[serde(default)]
    pub date_time: Option<DateTime<chrono::FixedOffset>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl ApiEventTime {
    fn to_event_time(&self) -> Option<EventTime> {
        match (self.date_time, self.date) {
            (Some(at), _) => Some(EventTime::Instant(at.with_timezone(&Utc))),
            (None, Some(date)) => Some(EventTime::Date(date)),
            (None, None) => None,
        }
    }
}

impl ApiEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// `None` when the event carries no usable start.
    pub fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start.as_ref()?.to_event_time()?;
        let end = self.end.as_ref().and_then(ApiEventTime::to_event_time);
        Some(CalendarEvent {
            id: self.id,
            summary: self.summary,
            start,
            end,
        })
    }
}
