// auth/token.rs — Stateless signed access tokens.
//
// Format: "{user_id}:{session_id|-}:{expires_unix}:{hmac_hex}"
//
// The token carries the authenticated user and, when a usage session is
// open, its id.  There is no server-side token store: possession of a token
// with a valid signature and unexpired timestamp is the whole credential.
// Login issues a token with no session part; session-start issues a fresh
// token embedding the new session id; session-end issues one with the
// session cleared.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Placeholder for the session field when no usage session is open.
/// Session ids are UUIDs, so "-" can never collide with a real id.
const NO_SESSION: &str = "-";

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub user_id: String,
    pub session_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Sign a new access token for `user_id`, optionally carrying an open
/// usage session.
pub fn issue(
    user_id: &str,
    session_id: Option<&str>,
    ttl: Duration,
    secret: &[u8],
) -> Result<String> {
    let expires_unix = (Utc::now() + ttl).timestamp();
    let session = session_id.unwrap_or(NO_SESSION);

    let payload = format!("{user_id}:{session}:{expires_unix}");
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{payload}:{sig}"))
}

/// Verify a raw token string: signature first, then expiry.
pub fn verify(raw: &str, secret: &[u8]) -> Result<AccessToken> {
    let parts: Vec<&str> = raw.splitn(4, ':').collect();
    if parts.len() != 4 {
        return Err(anyhow!("malformed access token"));
    }
    let (user_id, session, expires_str, sig_hex) = (parts[0], parts[1], parts[2], parts[3]);

    let payload = format!("{user_id}:{session}:{expires_str}");
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| anyhow!("invalid token signature hex"))?;
    if expected.as_slice() != sig_bytes.as_slice() {
        return Err(anyhow!("access token signature invalid"));
    }

    let expires_unix: i64 = expires_str
        .parse()
        .map_err(|_| anyhow!("invalid token expiry timestamp"))?;
    let expires_at = DateTime::<Utc>::from_timestamp(expires_unix, 0)
        .ok_or_else(|| anyhow!("invalid token expiry timestamp"))?;
    if expires_at <= Utc::now() {
        return Err(anyhow!("access token expired"));
    }

    let session_id = if session == NO_SESSION {
        None
    } else {
        Some(session.to_string())
    };

    Ok(AccessToken {
        user_id: user_id.to_string(),
        session_id,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key";

    #[test]
    fn round_trip_without_session() {
        let raw = issue("user-1", None, Duration::hours(1), SECRET).unwrap();
        let token = verify(&raw, SECRET).unwrap();
        assert_eq!(token.user_id, "user-1");
        assert_eq!(token.session_id, None);
    }

    #[test]
    fn round_trip_with_session() {
        let raw = issue("user-1", Some("sess-9"), Duration::hours(1), SECRET).unwrap();
        let token = verify(&raw, SECRET).unwrap();
        assert_eq!(token.session_id.as_deref(), Some("sess-9"));
    }

    #[test]
    fn tampered_payload_rejected() {
        let raw = issue("user-1", None, Duration::hours(1), SECRET).unwrap();
        let forged = raw.replacen("user-1", "user-2", 1);
        assert!(verify(&forged, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let raw = issue("user-1", None, Duration::hours(1), SECRET).unwrap();
        assert!(verify(&raw, b"other-secret").is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let raw = issue("user-1", None, Duration::seconds(-5), SECRET).unwrap();
        let err = verify(&raw, SECRET).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn garbage_rejected() {
        assert!(verify("", SECRET).is_err());
        assert!(verify("a:b", SECRET).is_err());
        assert!(verify("a:b:c:nothex", SECRET).is_err());
    }
}
