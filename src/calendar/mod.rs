//! Authenticated calendar API access.

mod client;
mod factory;
mod models;

pub use client::CalendarClient;
pub use factory::{CalendarClientFactory, ClientLookup};
pub use models::{CalendarEvent, CalendarSummary};
