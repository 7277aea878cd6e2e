use anyhow::Context as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::UserRecord;

pub const SESSION_ISSUER: &str = "kinshipd";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Application user id.
    pub sub: String,
    /// Platform user id.
    pub tid: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks HS256 bearer tokens keyed by the application user id.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user: &UserRecord) -> anyhow::Result<IssuedSession> {
        let now = Utc::now();
        let exp = now + self.ttl;
        let claims = SessionClaims {
            sub: user.id.clone(),
            tid: user.telegram_id.to_string(),
            iat: now.timestamp().max(0) as usize,
            exp: exp.timestamp().max(0) as usize,
            iss: SESSION_ISSUER.to_string(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("encode session jwt")?;
        Ok(IssuedSession {
            token,
            expires_at: exp,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .context("decode session jwt")?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: "8d3c0f4e-1111-4c1c-9a55-000000000001".to_string(),
            telegram_id: 279058397,
            first_name: "A".to_string(),
            last_name: None,
            username: None,
            photo_url: None,
            language_code: None,
            created_at: now,
            last_login_at: now,
        }
    }

    #[test]
    fn issued_token_verifies_and_carries_ids() -> anyhow::Result<()> {
        let issuer = SessionIssuer::new(b"test-secret-test-secret-test-sec", chrono::Duration::hours(1));
        let issued = issuer.issue(&user())?;
        let claims = issuer.verify(&issued.token)?;
        assert_eq!(claims.sub, user().id);
        assert_eq!(claims.tid, "279058397");
        assert_eq!(claims.iss, SESSION_ISSUER);
        assert_eq!(claims.exp as i64, issued.expires_at.timestamp());
        Ok(())
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() -> anyhow::Result<()> {
        let issuer = SessionIssuer::new(b"test-secret-test-secret-test-sec", chrono::Duration::hours(1));
        let other = SessionIssuer::new(b"other-secret-other-secret-other-", chrono::Duration::hours(1));
        let foreign = other.issue(&user())?;
        assert!(issuer.verify(&foreign.token).is_err());

        // Past the default 60s leeway.
        let expired_issuer =
            SessionIssuer::new(b"test-secret-test-secret-test-sec", chrono::Duration::minutes(-5));
        let expired = expired_issuer.issue(&user())?;
        assert!(issuer.verify(&expired.token).is_err());

        assert!(issuer.verify("not-a-jwt").is_err());
        Ok(())
    }
}
