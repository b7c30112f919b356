use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Signing and verification keys with the issuance policy.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

/// A freshly signed token plus the facts needed to record its session.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn sign(&self, subject: &str) -> jsonwebtoken::errors::Result<IssuedToken> {
        self.sign_at(subject, crate::db::now_utc())
    }

    pub(crate) fn sign_at(
        &self,
        subject: &str,
        issued_at: OffsetDateTime,
    ) -> jsonwebtoken::errors::Result<IssuedToken> {
        let expires_at = issued_at + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let jti = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: jti.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(sub = %subject, jti = %jti, "jwt signed");
        Ok(IssuedToken {
            token,
            jti,
            issued_at,
            expires_at,
        })
    }

    /// Check signature, issuer, audience and expiry (no leeway).
    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(sub = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 30,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let issued = keys.sign("a@x.com").expect("sign");
        let claims = keys.verify(&issued.token).expect("verify token");
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn expiry_is_thirty_minutes_after_issuance() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = keys.sign("a@x.com").unwrap();
        assert_eq!(issued.expires_at - issued.issued_at, TimeDuration::minutes(30));
    }

    #[test]
    fn each_token_gets_its_own_jti() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let a = keys.sign("a@x.com").unwrap();
        let b = keys.sign("a@x.com").unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - TimeDuration::minutes(31);
        let issued = keys.sign_at("a@x.com", long_ago).unwrap();
        let err = keys.verify(&issued.token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let good = make_keys("secret-one", "iss", "aud");
        let other = make_keys("secret-two", "iss", "aud");
        let issued = other.sign("a@x.com").unwrap();
        let err = good.verify(&issued.token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSignature));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let issued = good.sign("a@x.com").unwrap();
        assert!(bad.verify(&issued.token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(keys.verify("not.a.jwt").is_err());
    }
}
