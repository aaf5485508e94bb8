use super::user::User;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

/// An authenticated user session.
///
/// Created by logging in, registering, or restoring a saved token; dropped on
/// logout or when the backend rejects the token.
#[derive(Clone, PartialEq)]
pub struct Session {
    token: String,
    user: Option<User>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Session for a token the backend has just issued.
    pub fn issued(token: String, user: User) -> Self {
        let expires_at = token_expiry(&token).ok().flatten();
        Self {
            token,
            user: Some(user),
            expires_at,
        }
    }

    /// Restores a previously saved token, refusing it if it cannot be decoded
    /// or has expired. The signature is not checked; the backend does that.
    pub fn restore(token: &str, user: Option<User>, now: DateTime<Utc>) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::SessionError("empty token".to_string()));
        }
        let expires_at = token_expiry(token)?;
        if let Some(expiry) = expires_at
            && expiry <= now
        {
            return Err(Error::SessionError(format!("token expired at {expiry}")));
        }
        Ok(Self {
            token: token.to_string(),
            user,
            expires_at,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

// Keeps the bearer token out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user.as_ref().map(|u| &u.id))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn token_expiry(token: &str) -> Result<Option<DateTime<Utc>>> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::SessionError("token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::SessionError(format!("invalid token payload: {e}")))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| Error::SessionError(format!("invalid token claims: {e}")))?;

    match claims.exp {
        Some(exp) => DateTime::from_timestamp(exp, 0)
            .map(Some)
            .ok_or_else(|| Error::SessionError(format!("invalid expiry {exp}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_restore_valid_token() {
        let exp = now().timestamp() + 3600;
        let session = Session::restore(&jwt_with_exp(exp), None, now()).unwrap();
        assert_eq!(session.expires_at().unwrap().timestamp(), exp);
        assert!(!session.is_expired(now()));
        assert!(session.user().is_none());
    }

    #[test]
    fn test_restore_rejects_expired_token() {
        let exp = now().timestamp() - 1;
        assert!(matches!(
            Session::restore(&jwt_with_exp(exp), None, now()),
            Err(Error::SessionError(_))
        ));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        for token in ["", "not-a-token", "a.!!!.c", "a.bm90anNvbg.c"] {
            assert!(
                Session::restore(token, None, now()).is_err(),
                "accepted {token:?}"
            );
        }
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1"}"#);
        let token = format!("{header}.{payload}.");

        let session = Session::restore(&token, None, now()).unwrap();
        assert!(session.expires_at().is_none());
        assert!(!session.is_expired(now()));
    }

    #[test]
    fn test_debug_hides_token() {
        let token = jwt_with_exp(now().timestamp() + 60);
        let session = Session::restore(&token, None, now()).unwrap();
        assert!(!format!("{session:?}").contains(&token));
    }
}
