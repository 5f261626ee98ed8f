//! Signed, time-boxed QR payloads.
//!
//! A token binds an operation kind, an event and the event's current gate
//! code at the moment it was minted. It is serialized as an HS256 JWT so the
//! payload cannot be edited or forged without the server secret. Freshness
//! is checked separately by [`QrTokenCodec::validate`] against the caller's
//! clock rather than through a JWT `exp` claim.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::attendance::ScanKind;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed QR token: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign QR token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("QR token carries an invalid timestamp")]
    BadTimestamp,
}

/// Decoded token payload. Lives only for the duration of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanToken {
    #[serde(rename = "type")]
    pub kind: ScanKind,
    pub event_id: u64,
    pub code: String,
    /// Unix seconds.
    pub iat: i64,
}

impl ScanToken {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }
}

#[derive(Clone)]
pub struct QrTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    max_age: TimeDelta,
}

impl QrTokenCodec {
    pub fn new(secret: &str, max_age: TimeDelta) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            max_age,
        }
    }

    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    pub fn mint(
        &self,
        kind: ScanKind,
        event_id: u64,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let payload = ScanToken {
            kind,
            event_id,
            code: code.to_owned(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn decode(&self, raw: &str) -> Result<ScanToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let token = decode::<ScanToken>(raw.trim(), &self.decoding, &validation)
            .map_err(TokenError::Malformed)?
            .claims;

        if token.issued_at().is_none() {
            return Err(TokenError::BadTimestamp);
        }
        Ok(token)
    }

    /// True iff the token is of the expected kind, for the expected event and
    /// no older than the configured maximum age.
    pub fn validate(
        &self,
        token: &ScanToken,
        expected_event_id: u64,
        expected_kind: ScanKind,
        now: DateTime<Utc>,
    ) -> bool {
        if token.kind != expected_kind || token.event_id != expected_event_id {
            return false;
        }
        match token.issued_at() {
            Some(issued_at) => now - issued_at <= self.max_age,
            None => false,
        }
    }
}
