use crate::error::AtelierError;
use crate::server::router::AtelierState;
use crate::signing::Signer;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

/// Injected admin check. The server only asks "is this request an admin?".
pub trait AdminGate: Send + Sync {
    fn is_admin(&self, parts: &Parts) -> bool;
}

/// Accepts a bearer token minted by [`Signer::issue_admin_token`], verified
/// in-process against the shared secret.
pub struct SignedTokenGate {
    signer: Signer,
}

impl SignedTokenGate {
    pub fn new(signer: Signer) -> Self {
        Self { signer }
    }
}

impl AdminGate for SignedTokenGate {
    fn is_admin(&self, parts: &Parts) -> bool {
        parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .is_some_and(|auth| self.signer.verify_admin_token(auth.token()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AtelierState> for RequireAdmin {
    type Rejection = AtelierError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AtelierState,
    ) -> Result<Self, Self::Rejection> {
        if state.admin.is_admin(parts) {
            Ok(RequireAdmin)
        } else {
            Err(AtelierError::Unauthorized)
        }
    }
}
