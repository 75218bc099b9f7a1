pub mod guards;
pub mod router;
pub mod routes;

pub use guards::admin::{AdminGate, RequireAdmin, SignedTokenGate};
pub use router::{AtelierState, atelier_router};
