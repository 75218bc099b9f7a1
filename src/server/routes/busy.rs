use crate::busy::{BusyInterval, SourceFailure};
use crate::error::AtelierError;
use crate::server::router::AtelierState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BusyEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<BusyInterval> for BusyEvent {
    fn from(i: BusyInterval) -> Self {
        Self {
            title: i.label,
            start: i.start,
            end: i.end,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyResponse {
    pub events: Vec<BusyEvent>,
    pub failed_sources: Vec<SourceFailure>,
}

/// GET /artists/{artist_id}/busy
///
/// Succeeds as long as one source answered; fails only when all did not.
pub async fn busy_handler(
    State(state): State<AtelierState>,
    Path(artist_id): Path<i64>,
) -> Result<Json<BusyResponse>, AtelierError> {
    let report = state.core.busy.busy_for_artist(artist_id).await?;

    if report.all_failed() {
        let failed = report
            .failures
            .iter()
            .map(|f| format!("{} ({})", f.source, f.kind))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AtelierError::provider(
            "busy",
            format!("every busy source failed: {failed}"),
        ));
    }

    Ok(Json(BusyResponse {
        events: report.intervals.into_iter().map(BusyEvent::from).collect(),
        failed_sources: report.failures,
    }))
}
