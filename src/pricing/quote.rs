use crate::db::{DbActorHandle, DbService, DbServiceOverride};
use crate::error::AtelierError;
use serde::Serialize;
use tracing::debug;

const DEFAULT_DURATION_MINUTES: i64 = 60;
const DEFAULT_BUFFER_MINUTES: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Base,
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Minor currency units; always positive.
    pub price: i64,
    pub duration_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub price_source: PriceSource,
}

#[derive(Clone)]
pub struct QuoteResolver {
    db: DbActorHandle,
}

impl QuoteResolver {
    pub fn new(db: DbActorHandle) -> Self {
        Self { db }
    }

    pub async fn resolve(&self, artist_id: i64, service_id: i64) -> Result<Quote, AtelierError> {
        if self.db.get_artist(artist_id).await?.is_none() {
            return Err(AtelierError::not_found("artist", artist_id));
        }
        let service = self
            .db
            .get_service(service_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| AtelierError::not_found("service", service_id))?;
        let service_override = self.db.get_service_override(artist_id, service_id).await?;

        let quote = compute(&service, service_override.as_ref())?;
        debug!(
            artist_id,
            service_id,
            price = quote.price,
            price_source = ?quote.price_source,
            "quote resolved"
        );
        Ok(quote)
    }
}

/// An active override with a price wins; otherwise the base price.
fn compute(
    service: &DbService,
    service_override: Option<&DbServiceOverride>,
) -> Result<Quote, AtelierError> {
    let (price, price_source) = match service_override
        .filter(|o| o.active)
        .and_then(|o| o.price)
    {
        Some(price) => (Some(price), PriceSource::Override),
        None => (service.base_price, PriceSource::Base),
    };

    let price = match price {
        Some(p) if p > 0 => p,
        Some(p) => {
            return Err(AtelierError::invalid_config(format!(
                "service {} resolves to non-positive price {p}",
                service.id
            )));
        }
        None => {
            return Err(AtelierError::invalid_config(format!(
                "service {} has no price",
                service.id
            )));
        }
    };

    let duration_minutes = service.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    if duration_minutes <= 0 {
        return Err(AtelierError::invalid_config(format!(
            "service {} has non-positive duration {duration_minutes}",
            service.id
        )));
    }

    let buffer_before_minutes = service.buffer_before_minutes.unwrap_or(DEFAULT_BUFFER_MINUTES);
    let buffer_after_minutes = service.buffer_after_minutes.unwrap_or(DEFAULT_BUFFER_MINUTES);
    if buffer_before_minutes < 0 || buffer_after_minutes < 0 {
        return Err(AtelierError::invalid_config(format!(
            "service {} has a negative buffer",
            service.id
        )));
    }

    Ok(Quote {
        price,
        duration_minutes,
        buffer_before_minutes,
        buffer_after_minutes,
        price_source,
    })
}
