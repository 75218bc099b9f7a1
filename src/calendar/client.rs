use super::models::{CalendarEvent, CalendarListPage, CalendarSummary, EventsPage};
use crate::error::AtelierError;
use crate::http::body_preview;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

const PROVIDER: &str = "calendar";
const PAGE_SIZE: &str = "250";

/// Authenticated calendar API client for one artist.
///
/// Built by [`super::CalendarClientFactory`] from a token that was fresh at
/// construction time; short-lived, one per request.
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    api_url: Url,
    access_token: String,
    max_pages: usize,
}

impl std::fmt::Debug for CalendarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarClient")
            .field("api_url", &self.api_url.as_str())
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl CalendarClient {
    pub(crate) fn new(
        http: reqwest::Client,
        api_url: Url,
        access_token: String,
        max_pages: usize,
    ) -> Self {
        Self {
            http,
            api_url,
            access_token,
            max_pages,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, AtelierError> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut query: Vec<(&str, String)> = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: CalendarListPage = self.get_json(url.clone(), &query).await?;
            calendars.extend(page.items);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(calendars),
            }
        }

        warn!(max_pages = self.max_pages, "calendar list truncated at page limit");
        Ok(calendars)
    }

    /// Non-cancelled events on `calendar_id` overlapping `[from, to)`, recurring
    /// events expanded by the provider.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AtelierError> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let time_min = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = to.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut query: Vec<(&str, String)> = vec![
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: EventsPage = self.get_json(url.clone(), &query).await?;
            for item in page.items {
                if item.is_cancelled() {
                    continue;
                }
                let id = item.id.clone();
                match item.into_event() {
                    Some(event) => events.push(event),
                    None => debug!(event_id = %id, "skipping event without start"),
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(events),
            }
        }

        warn!(
            calendar_id,
            max_pages = self.max_pages,
            "event listing truncated at page limit"
        );
        Ok(events)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AtelierError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| AtelierError::invalid_config("calendar.api_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, AtelierError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AtelierError::provider(
                PROVIDER,
                format!("status {status}: {}", body_preview(&body)),
            ));
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AtelierError::provider(
                PROVIDER,
                format!(
                    "unparsable response: {e}; body: {}",
                    body_preview(&String::from_utf8_lossy(&bytes))
                ),
            )
        })
    }
}
