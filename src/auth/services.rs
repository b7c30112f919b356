use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::auth::{
    dto::SignupRequest,
    jwt::{IssuedToken, JwtKeys},
    password::{hash_password, verify_password},
    repo_types::{Session, User},
};
use crate::error::{AppError, AppResult};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Create an account. The email is stored exactly as given.
pub async fn register(db: &SqlitePool, req: SignupRequest) -> AppResult<User> {
    if !is_valid_email(&req.email) {
        warn!(email = %req.email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(AppError::BadRequest("First and last name are required".into()));
    }

    if User::find_by_email(db, &req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!(error = %e, "hashing task failed");
            AppError::Internal
        })?
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AppError::Internal
        })?;

    // a concurrent signup can still win the race; the UNIQUE constraint catches it
    let user = User::create(db, &req.email, &req.first_name, &req.last_name, &hash).await?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

lazy_static! {
    /// Stand-in hash for unknown emails so both login failures cost one Argon2 verify.
    static ref DUMMY_HASH: String = hash_password("scriptsense-absent-user").unwrap();
}

/// Resolve credentials to a user. Unknown email and wrong password are
/// reported identically and take the same time.
pub async fn authenticate(db: &SqlitePool, email: &str, password: &str) -> AppResult<User> {
    let user = User::find_by_email(db, email).await?;
    let stored = match &user {
        Some(u) => u.password_hash.clone(),
        None => DUMMY_HASH.clone(),
    };
    let ok = check_password(password, stored).await?;

    match user {
        Some(user) if ok => Ok(user),
        Some(user) => {
            warn!(email = %email, user_id = user.id, "login invalid password");
            Err(AppError::InvalidCredentials)
        }
        None => {
            warn!(email = %email, "login unknown email");
            Err(AppError::InvalidCredentials)
        }
    }
}

async fn check_password(password: &str, stored: String) -> AppResult<bool> {
    let plain = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
        .await
        .map_err(|e| {
            error!(error = %e, "verify task failed");
            AppError::Internal
        })?
        .map_err(|e| {
            error!(error = %e, "stored password hash unreadable");
            AppError::Internal
        })
}

/// Sign an access token for `user` and record its session row.
pub async fn issue_token(db: &SqlitePool, keys: &JwtKeys, user: &User) -> AppResult<IssuedToken> {
    let issued = keys.sign(&user.email).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::Internal
    })?;
    Session::create(db, user.id, &issued.jti, issued.issued_at, issued.expires_at).await?;
    Ok(issued)
}

/// Validate a bearer token and resolve its subject to a live user.
pub async fn verify_token(db: &SqlitePool, keys: &JwtKeys, token: &str) -> AppResult<User> {
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::Unauthorized
    })?;

    User::find_by_email(db, &claims.sub).await?.ok_or_else(|| {
        warn!(sub = %claims.sub, "token subject no longer exists");
        AppError::Unauthorized
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::db::test_pool;

    fn keys(secret: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 30,
        })
    }

    fn signup(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            first_name: "A".into(),
            last_name: "B".into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no at sign.com"));
    }

    #[tokio::test]
    async fn register_twice_fails_with_duplicate() {
        let db = test_pool().await;
        let first = register(&db, signup("a@x.com", "pw")).await.expect("first signup");
        let err = register(&db, signup("a@x.com", "other")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let stored = User::find_by_email(&db, "a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_ne!(stored.password_hash, "pw");
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let db = test_pool().await;
        let err = register(&db, signup("not-an-email", "pw")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let mut req = signup("a@x.com", "pw");
        req.first_name = "  ".into();
        assert!(matches!(register(&db, req).await.unwrap_err(), AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn authenticate_is_indistinguishable_on_failure() {
        let db = test_pool().await;
        register(&db, signup("a@x.com", "pw")).await.unwrap();

        let ok = authenticate(&db, "a@x.com", "pw").await.expect("valid login");
        assert_eq!(ok.email, "a@x.com");

        let wrong_pw = authenticate(&db, "a@x.com", "nope").await.unwrap_err();
        let unknown = authenticate(&db, "b@x.com", "pw").await.unwrap_err();
        assert!(matches!(wrong_pw, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert_eq!(wrong_pw.status(), unknown.status());
    }

    #[test]
    fn dummy_hash_has_real_argon2_cost() {
        let real = hash_password("pw").unwrap();
        let real = argon2::PasswordHash::new(&real).unwrap();
        let dummy = argon2::PasswordHash::new(&DUMMY_HASH).unwrap();
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.params.to_string(), real.params.to_string());
        assert!(!verify_password("pw", &DUMMY_HASH).unwrap());
    }

    #[tokio::test]
    async fn unknown_email_pays_for_a_verification() {
        let db = test_pool().await;
        register(&db, signup("a@x.com", "pw")).await.unwrap();
        // warm the lazy dummy hash so its one-off hashing is not measured
        authenticate(&db, "warm@x.com", "pw").await.unwrap_err();

        let started = std::time::Instant::now();
        authenticate(&db, "a@x.com", "nope").await.unwrap_err();
        let wrong_pw = started.elapsed();

        let started = std::time::Instant::now();
        authenticate(&db, "b@x.com", "nope").await.unwrap_err();
        let unknown = started.elapsed();

        assert!(
            unknown * 10 >= wrong_pw,
            "unknown email took {unknown:?}, wrong password {wrong_pw:?}"
        );
    }

    #[tokio::test]
    async fn issued_token_resolves_to_user() {
        let db = test_pool().await;
        let user = register(&db, signup("a@x.com", "pw")).await.unwrap();
        let k = keys("secret");

        let issued = issue_token(&db, &k, &user).await.expect("issue");
        let resolved = verify_token(&db, &k, &issued.token).await.expect("verify");
        assert_eq!(resolved.id, user.id);

        let sessions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_sessions WHERE user_id = ?")
            .bind(user.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(sessions.0, 1);
    }

    #[tokio::test]
    async fn token_for_vanished_user_is_unauthorized() {
        let db = test_pool().await;
        let k = keys("secret");
        let orphan = k.sign("ghost@x.com").unwrap();
        let err = verify_token(&db, &k, &orphan.token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn token_from_other_secret_is_unauthorized() {
        let db = test_pool().await;
        let user = register(&db, signup("a@x.com", "pw")).await.unwrap();
        let issued = issue_token(&db, &keys("one"), &user).await.unwrap();
        let err = verify_token(&db, &keys("two"), &issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
