//! HMAC-signed, expiring tokens.
//!
//! Wire form: `base64url(json envelope) "." base64url(hmac-sha256)`. The envelope
//! carries a purpose tag so an OAuth `state` can never be replayed as an admin
//! bearer token (and vice versa).

use crate::error::AtelierError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use ring::hmac;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;

pub const PURPOSE_OAUTH_STATE: &str = "oauth_state";
pub const PURPOSE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum TokenRejection {
    #[error("token is not well-formed")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token issued for a different purpose")]
    WrongPurpose,
    #[error("token expired")]
    Expired,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    purpose: String,
    /// Unix seconds.
    exp: i64,
    body: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    sub: String,
}

#[derive(Clone)]
pub struct Signer {
    key: hmac::Key,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    pub fn sign<T: Serialize>(
        &self,
        purpose: &str,
        body: &T,
        ttl: Duration,
    ) -> Result<String, AtelierError> {
        self.sign_at(purpose, body, ttl, Utc::now())
    }

    pub fn sign_at<T: Serialize>(
        &self,
        purpose: &str,
        body: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AtelierError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            purpose: purpose.to_string(),
            exp: now.timestamp().saturating_add(ttl),
            body,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&envelope)?);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    pub fn verify<T: DeserializeOwned>(
        &self,
        purpose: &str,
        token: &str,
    ) -> Result<T, TokenRejection> {
        self.verify_at(purpose, token, Utc::now())
    }

    /// Signature is checked before anything in the payload is decoded.
    pub fn verify_at<T: DeserializeOwned>(
        &self,
        purpose: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<T, TokenRejection> {
        let (payload, sig) = token.split_once('.').ok_or(TokenRejection::Malformed)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| TokenRejection::Malformed)?;
        hmac::verify(&self.key, payload.as_bytes(), &sig)
            .map_err(|_| TokenRejection::BadSignature)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenRejection::Malformed)?;
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_slice(&raw).map_err(|_| TokenRejection::Malformed)?;

        if envelope.purpose != purpose {
            return Err(TokenRejection::WrongPurpose);
        }
        if now.timestamp() >= envelope.exp {
            return Err(TokenRejection::Expired);
        }
        serde_json::from_value(envelope.body).map_err(|_| TokenRejection::Malformed)
    }

    /// Mint an admin bearer token (operator tooling and tests).
    pub fn issue_admin_token(&self, ttl: Duration) -> Result<String, AtelierError> {
        let claims = AdminClaims {
            sub: PURPOSE_ADMIN.to_string(),
        };
        self.sign(PURPOSE_ADMIN, &claims, ttl)
    }

    pub fn verify_admin_token(&self, token: &str) -> bool {
        self.verify::<AdminClaims>(PURPOSE_ADMIN, token).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Body {
        artist_id: i64,
        nonce: String,
    }

    fn body() -> Body {
        Body {
            artist_id: 7,
            nonce: "n-1".to_string(),
        }
    }

    #[test]
    fn signed_body_verifies_before_expiry() {
        let signer = Signer::new("secret");
        let now = Utc::now();
        let token = signer
            .sign_at(PURPOSE_OAUTH_STATE, &body(), Duration::from_secs(60), now)
            .unwrap();

        let got: Body = signer
            .verify_at(PURPOSE_OAUTH_STATE, &token, now + TimeDelta::seconds(59))
            .unwrap();
        assert_eq!(got, body());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = Signer::new("secret");
        let now = Utc::now();
        let token = signer
            .sign_at(PURPOSE_OAUTH_STATE, &body(), Duration::from_secs(60), now)
            .unwrap();

        let err = signer
            .verify_at::<Body>(PURPOSE_OAUTH_STATE, &token, now + TimeDelta::seconds(60))
            .unwrap_err();
        assert_eq!(err, TokenRejection::Expired);
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let signer = Signer::new("secret");
        let token = signer
            .sign(PURPOSE_OAUTH_STATE, &body(), Duration::from_secs(60))
            .unwrap();
        let (_, sig) = token.split_once('.').unwrap();

        let forged = Body {
            artist_id: 8,
            nonce: "n-1".to_string(),
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Envelope {
                purpose: PURPOSE_OAUTH_STATE.to_string(),
                exp: i64::MAX,
                body: forged,
            })
            .unwrap(),
        );

        let err = signer
            .verify::<Body>(PURPOSE_OAUTH_STATE, &format!("{forged_payload}.{sig}"))
            .unwrap_err();
        assert_eq!(err, TokenRejection::BadSignature);
    }

    #[test]
    fn other_secret_and_purpose_are_rejected() {
        let signer = Signer::new("secret");
        let token = signer.issue_admin_token(Duration::from_secs(60)).unwrap();

        assert!(signer.verify_admin_token(&token));
        assert!(!Signer::new("other").verify_admin_token(&token));
        assert_eq!(
            signer
                .verify::<Body>(PURPOSE_OAUTH_STATE, &token)
                .unwrap_err(),
            TokenRejection::WrongPurpose
        );
        assert!(!signer.verify_admin_token("garbage"));
    }
}
