pub mod busy;
pub mod calendars;
pub mod oauth;
pub mod quote;
