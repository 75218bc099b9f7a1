use super::ics::parse_feed;
use super::interval::{BusyInterval, SourceEvent, normalize};
use super::recurrence::expand;
use crate::calendar::{CalendarClientFactory, ClientLookup};
use crate::config::{FeedSource, FeedsResolvedConfig};
use crate::db::DbActorHandle;
use crate::error::AtelierError;
use crate::http::body_preview;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Source name used for the authenticated calendar in failure reports.
pub const CALENDAR_SOURCE: &str = "calendar";

/// Calendar id used when the artist has not chosen one.
const DEFAULT_CALENDAR_ID: &str = "primary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source: String,
    /// Taxonomy bucket (`FeedUnavailable`, `ExternalProviderError`, ...).
    pub kind: &'static str,
    pub message: String,
}

impl SourceFailure {
    fn from_error(source: &str, err: &AtelierError) -> Self {
        Self {
            source: source.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Union of every source that answered, plus the ones that did not.
#[derive(Debug, Clone, Default)]
pub struct BusyReport {
    /// Ordered by start, then end. Overlaps are passed through.
    pub intervals: Vec<BusyInterval>,
    pub failures: Vec<SourceFailure>,
    /// Sources actually queried. An unlinked calendar is not counted.
    pub attempted: usize,
}

impl BusyReport {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failures.len() == self.attempted
    }
}

#[derive(Clone)]
pub struct BusyAggregator {
    db: DbActorHandle,
    calendars: CalendarClientFactory,
    feeds: Arc<FeedsResolvedConfig>,
    feed_http: reqwest::Client,
    calendar_timeout: Duration,
    lookahead: TimeDelta,
}

impl BusyAggregator {
    pub fn new(
        db: DbActorHandle,
        calendars: CalendarClientFactory,
        feeds: Arc<FeedsResolvedConfig>,
        feed_http: reqwest::Client,
        calendar_timeout: Duration,
        lookahead: TimeDelta,
    ) -> Self {
        Self {
            db,
            calendars,
            feeds,
            feed_http,
            calendar_timeout,
            lookahead,
        }
    }

    pub fn studio_timezone(&self) -> Tz {
        self.feeds.studio_timezone
    }

    /// Busy time from now through the configured look-ahead.
    pub async fn busy_for_artist(&self, artist_id: i64) -> Result<BusyReport, AtelierError> {
        let from = Utc::now();
        self.busy_between(artist_id, from, from + self.lookahead).await
    }

    /// Query every source concurrently. Only an unknown artist fails the call;
    /// per-source failures are reported alongside whatever succeeded.
    pub async fn busy_between(
        &self,
        artist_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BusyReport, AtelierError> {
        let artist = self
            .db
            .get_artist(artist_id)
            .await?
            .ok_or_else(|| AtelierError::not_found("artist", artist_id))?;
        let calendar_id = artist
            .linked_calendar_id
            .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string());

        let feeds: Vec<&FeedSource> = self
            .feeds
            .sources
            .iter()
            .filter(|f| f.applies_to(artist_id))
            .collect();

        let (calendar, feed_results) = tokio::join!(
            self.calendar_source(artist_id, &calendar_id, from, to),
            join_all(feeds.iter().map(|feed| self.feed_source(feed, from, to)))
        );

        let mut report = BusyReport::default();
        if let Some(result) = calendar {
            report.attempted += 1;
            match result {
                Ok(intervals) => report.intervals.extend(intervals),
                Err(e) => {
                    warn!(artist_id, source = CALENDAR_SOURCE, error = %e, "busy source failed");
                    report.failures.push(SourceFailure::from_error(CALENDAR_SOURCE, &e));
                }
            }
        }
        for (feed, result) in feeds.iter().zip(feed_results) {
            report.attempted += 1;
            match result {
                Ok(intervals) => report.intervals.extend(intervals),
                Err(e) => {
                    warn!(artist_id, source = %feed.name, error = %e, "busy source failed");
                    report.failures.push(SourceFailure::from_error(&feed.name, &e));
                }
            }
        }

        report
            .intervals
            .sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

        debug!(
            artist_id,
            intervals = report.intervals.len(),
            attempted = report.attempted,
            failed = report.failures.len(),
            "busy time aggregated"
        );
        Ok(report)
    }

    /// `None` when the artist has no calendar linked.
    async fn calendar_source(
        &self,
        artist_id: i64,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<Result<Vec<BusyInterval>, AtelierError>> {
        let tz = self.feeds.studio_timezone;
        let fetch = async {
            let client = match self.calendars.get_client_for_artist(artist_id).await? {
                ClientLookup::NotLinked => return Ok(None),
                ClientLookup::Client(client) => client,
            };
            let events = client.list_events(calendar_id, from, to).await?;
            Ok::<_, AtelierError>(Some(
                events
                    .into_iter()
                    .filter_map(|ev| {
                        let id = ev.id.clone();
                        let interval = normalize(SourceEvent::Calendar(ev), &tz);
                        if interval.is_none() {
                            warn!(artist_id, event_id = %id, "calendar event out of range, skipped");
                        }
                        interval
                    })
                    .collect(),
            ))
        };

        match tokio::time::timeout(self.calendar_timeout, fetch).await {
            Ok(result) => result.transpose(),
            Err(_) => Some(Err(AtelierError::provider(
                CALENDAR_SOURCE,
                format!("timed out after {:?}", self.calendar_timeout),
            ))),
        }
    }

    async fn feed_source(
        &self,
        feed: &FeedSource,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, AtelierError> {
        let tz = self.feeds.studio_timezone;
        let timeout = self.feeds.http.request_timeout;
        let body = tokio::time::timeout(timeout, self.fetch_feed(feed))
            .await
            .map_err(|_| AtelierError::FeedUnavailable {
                feed: feed.name.clone(),
                message: format!("timed out after {timeout:?}"),
            })??;

        let malformed = |message: String| AtelierError::FeedMalformed {
            feed: feed.name.clone(),
            message,
        };
        let events = parse_feed(&body).map_err(|e| malformed(e.to_string()))?;

        let mut intervals = Vec::new();
        for event in events {
            for occurrence in expand(event, &tz, from, to).map_err(|e| malformed(e.to_string()))? {
                let uid = occurrence.uid.clone();
                let interval = normalize(SourceEvent::Feed(occurrence), &tz).ok_or_else(|| {
                    malformed(format!(
                        "event {} ends outside the representable range",
                        uid.as_deref().unwrap_or("<no uid>")
                    ))
                })?;
                if interval.overlaps(from, to) {
                    intervals.push(interval);
                }
            }
        }
        Ok(intervals)
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> Result<String, AtelierError> {
        let unavailable = |message: String| AtelierError::FeedUnavailable {
            feed: feed.name.clone(),
            message,
        };

        let resp = self
            .feed_http
            .get(feed.url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(unavailable(format!("status {status}: {}", body_preview(&body))));
        }
        Ok(body)
    }
}
