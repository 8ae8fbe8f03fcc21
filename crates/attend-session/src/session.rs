//! The credential pair held by the session store

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::coordinator::RenewedAccess;

/// Access + refresh token pair with the access token's expiry.
///
/// Tokens are never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    access_expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session, reading the access expiry from the token's `exp` claim.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let access_expiry = jwt_expiry(&access_token);
        Self {
            access_token,
            refresh_token: refresh_token.into(),
            access_expiry,
        }
    }

    /// Override the access expiry (opaque tokens, tests).
    #[inline]
    #[must_use]
    pub fn with_access_expiry(mut self, expiry: Option<DateTime<Utc>>) -> Self {
        self.access_expiry = expiry;
        self
    }

    /// Current access token
    #[inline]
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Refresh token
    #[inline]
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Access expiry, if the token carried one
    #[inline]
    #[must_use]
    pub fn access_expiry(&self) -> Option<DateTime<Utc>> {
        self.access_expiry
    }

    /// An unknown expiry counts as valid until the server rejects the token.
    #[inline]
    #[must_use]
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Session after a successful renewal.
    ///
    /// A rotated refresh token replaces the old one; otherwise it is kept.
    #[must_use]
    pub fn renewed(&self, renewed: RenewedAccess) -> Self {
        let refresh_token = renewed
            .refresh_token
            .unwrap_or_else(|| self.refresh_token.clone());
        Self::new(renewed.access_token, refresh_token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expiry", &self.access_expiry)
            .finish()
    }
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// Returns `None` for anything that is not a three-segment JWT with a
/// numeric `exp`. Verification is the server's job; the client only needs
/// to know when to stop trusting its own copy.
#[must_use]
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: JsonValue = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned JWT-shaped token with the given `exp`.
    pub(crate) fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"user_id":7,"exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn session_reads_expiry_from_jwt() {
        let session = Session::new(token_with_exp(1_700_000_000), "refresh");
        assert_eq!(
            session.access_expiry(),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn opaque_token_has_no_expiry() {
        let session = Session::new("opaque-token", "refresh");
        assert_eq!(session.access_expiry(), None);
        assert!(!session.is_access_expired(Utc::now()));
    }

    #[test]
    fn jwt_expiry_rejects_malformed_tokens() {
        assert_eq!(jwt_expiry("a.b"), None);
        assert_eq!(jwt_expiry("a.b.c.d"), None);
        assert_eq!(jwt_expiry("a.!!!.c"), None);

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(br#"{"user_id":7}"#));
        assert_eq!(jwt_expiry(&no_exp), None);
    }

    #[test]
    fn expiry_comparison() {
        let session = Session::new(token_with_exp(1_000), "refresh");
        let before = DateTime::from_timestamp(999, 0).unwrap();
        let after = DateTime::from_timestamp(1_000, 0).unwrap();

        assert!(!session.is_access_expired(before));
        assert!(session.is_access_expired(after));
    }

    #[test]
    fn renewed_keeps_refresh_unless_rotated() {
        let session = Session::new("old", "refresh-1");

        let kept = session.renewed(RenewedAccess::new("new"));
        assert_eq!(kept.access_token(), "new");
        assert_eq!(kept.refresh_token(), "refresh-1");

        let rotated = session.renewed(RenewedAccess::new("newer").with_refresh_token("refresh-2"));
        assert_eq!(rotated.refresh_token(), "refresh-2");
    }

    #[test]
    fn debug_redacts_tokens() {
        let session = Session::new("secret-access", "secret-refresh");
        let printed = format!("{session:?}");
        assert!(!printed.contains("secret"));
    }
}
