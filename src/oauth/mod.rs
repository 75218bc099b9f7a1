//! Authorization-code flow against the calendar provider.

mod endpoints;
mod flow;

pub use endpoints::OauthEndpoints;
pub use flow::OauthFlow;
