//! Busy-time aggregation across the authenticated calendar and public feeds.

mod aggregator;
pub mod ics;
mod interval;
mod recurrence;

pub use aggregator::{BusyAggregator, BusyReport, CALENDAR_SOURCE, SourceFailure};
pub use interval::{
    BusyInterval, EventTime, FeedEvent, PLACEHOLDER_LABEL, SourceEvent, SourceKind, normalize,
    resolve_local,
};
pub use recurrence::{Recurrence, RecurrenceError};
