//! Price, duration and buffer resolution for an artist and service.

mod quote;

pub use quote::{PriceSource, Quote, QuoteResolver};
