pub mod bootstrap;
pub mod busy;
pub mod calendar;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod http;
pub mod oauth;
pub mod pricing;
pub mod server;
pub mod signing;

pub use bootstrap::Core;
pub use error::AtelierError;
