use crate::error::AtelierError;
use crate::pricing::Quote;
use crate::server::router::AtelierState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub artist_id: Option<i64>,
    pub service_id: Option<i64>,
}

/// `pricePence` is the configured currency's minor unit, whatever its name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub price_pence: i64,
    pub duration_min: i64,
    pub buffer_before_min: i64,
    pub buffer_after_min: i64,
}

impl From<Quote> for QuoteResponse {
    fn from(q: Quote) -> Self {
        Self {
            price_pence: q.price,
            duration_min: q.duration_minutes,
            buffer_before_min: q.buffer_before_minutes,
            buffer_after_min: q.buffer_after_minutes,
        }
    }
}

/// POST /quote
pub async fn quote_handler(
    State(state): State<AtelierState>,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<QuoteResponse>, AtelierError> {
    let Json(req) = payload.map_err(|e| AtelierError::invalid_config(e.body_text()))?;
    let (Some(artist_id), Some(service_id)) = (req.artist_id, req.service_id) else {
        return Err(AtelierError::invalid_config(
            "artistId and serviceId are required",
        ));
    };

    let quote = state.core.quotes.resolve(artist_id, service_id).await?;
    Ok(Json(quote.into()))
}
