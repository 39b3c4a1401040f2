//! Authentication service providing password hashing (bcrypt) and JWT issuance/validation,
//! plus the login flow that ties them to the user repository.

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use axum::http::HeaderMap;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::{sync::OnceCell, task};

use crate::config::JwtConfig;
use crate::models::{AppError, LoginRequest, LoginResponse, User, UserResponse};
use crate::repository::UserRepository;

/// JWT claims payload embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (the user's email).
    pub sub: String,
    pub user_id: i64,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub is_active: bool,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration (seconds since epoch).
    pub exp: i64,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn hash_password(&self, password: String) -> Result<String, AppError>;
    /// Returns `Ok(false)` both for a wrong password and for an unreadable digest.
    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError>;
    /// A digest at the configured cost that matches no real account; verifying against it
    /// costs the same as a genuine check.
    async fn dummy_digest(&self) -> Result<String, AppError>;
    async fn generate_token(&self, user: &User) -> Result<String, AppError>;
    async fn validate_token(&self, token: &str) -> Result<Claims, AppError>;
}

/// Concrete JWT/bcrypt implementation. Only shared-secret (HMAC) algorithms are accepted.
#[derive(Clone)]
pub struct JwtAuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
    bcrypt_cost: u32,
    dummy_digest: Arc<OnceCell<String>>,
}

const DUMMY_PASSWORD: &str = "no-account-has-this-password";

impl JwtAuthService {
    pub fn new(secret: &str, algorithm: Algorithm, ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            ttl,
            bcrypt_cost,
            dummy_digest: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Result<Self, AppError> {
        let algorithm = parse_algorithm(&cfg.algorithm)?;
        let ttl = Duration::try_minutes(cfg.expiry_minutes)
            .ok_or_else(|| AppError::Config(format!("jwt.expiry_minutes {} is out of range", cfg.expiry_minutes)))?;
        Ok(Self::new(&cfg.secret, algorithm, ttl, cfg.bcrypt_cost))
    }

    /// Sign a token for `user` that expires `ttl` after now.
    pub fn issue(&self, user: &User, ttl: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| AppError::Jwt("token lifetime out of range".into()))?;
        let (iat, exp) = (now.timestamp(), expires_at.timestamp());
        let claims = Claims {
            sub: user.email.clone(),
            user_id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
            iat,
            exp,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        Ok(token)
    }
}

pub fn parse_algorithm(name: &str) -> Result<Algorithm, AppError> {
    let algorithm = Algorithm::from_str(name).map_err(|_| AppError::Config(format!("unknown JWT algorithm {name}")))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(AppError::Config(format!("JWT algorithm {other:?} needs a key pair; only HS256/HS384/HS512 are supported"))),
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        // Bcrypt is CPU-bound; use spawn_blocking to avoid blocking the async runtime.
        let cost = self.bcrypt_cost;
        let hashed = task::spawn_blocking(move || hash(password, cost)).await.map_err(|e| AppError::Bcrypt(e.to_string()))??;
        Ok(hashed)
    }

    async fn verify_password(&self, password: String, hash_value: String) -> Result<bool, AppError> {
        let outcome = task::spawn_blocking(move || verify(password, &hash_value)).await.map_err(|e| AppError::Bcrypt(e.to_string()))?;
        match outcome {
            Ok(ok) => Ok(ok),
            Err(e) => {
                tracing::warn!(error = %e, "stored password digest could not be read");
                Ok(false)
            }
        }
    }

    async fn dummy_digest(&self) -> Result<String, AppError> {
        let digest = self.dummy_digest.get_or_try_init(|| self.hash_password(DUMMY_PASSWORD.to_string())).await?;
        Ok(digest.clone())
    }

    async fn generate_token(&self, user: &User) -> Result<String, AppError> {
        self.issue(user, self.ttl)
    }

    async fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::ExpiredToken,
            _ => AppError::InvalidToken,
        })?;
        Ok(data.claims)
    }
}

/// Extract bearer token from Authorization header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers.get(axum::http::header::AUTHORIZATION).and_then(|h| h.to_str().ok()).and_then(|v| v.strip_prefix("Bearer ")).map(|s| s.to_string())
}

/// Resolve credentials into a session token.
///
/// Unknown email and wrong password produce the same `InvalidCredentials` error so the
/// response cannot be used to enumerate accounts. An inactive account is only reported
/// once the password has been verified.
pub async fn login(users: &dyn UserRepository, auth: &dyn AuthService, credentials: LoginRequest) -> Result<LoginResponse, AppError> {
    let Some(user) = users.find_by_email(&credentials.email).await? else {
        // Same bcrypt work as a real check so timing does not reveal unknown emails.
        let digest = auth.dummy_digest().await?;
        auth.verify_password(credentials.password, digest).await?;
        tracing::warn!("login rejected: invalid credentials");
        return Err(AppError::InvalidCredentials);
    };

    if !auth.verify_password(credentials.password, user.password_hash.clone()).await? {
        tracing::warn!(user_id = user.id, "login rejected: invalid credentials");
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        tracing::warn!(user_id = user.id, "login rejected: account inactive");
        return Err(AppError::AccountInactive);
    }

    let access_token = auth.generate_token(&user).await?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok(LoginResponse { access_token, token_type: "bearer".to_string(), user: UserResponse::from(user) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::repository::InMemoryStore;

    const SECRET: &str = "test-secret-that-is-long-enough-32";

    fn service() -> JwtAuthService {
        JwtAuthService::new(SECRET, Algorithm::HS256, Duration::minutes(30), 4)
    }

    fn ana() -> User {
        User { id: 1, email: "a@x.com".into(), first_name: "Ana".into(), last_name: "Lopez".into(), password_hash: String::new(), is_active: true }
    }

    async fn seed(store: &InMemoryStore, svc: &JwtAuthService, active: bool) -> User {
        let password_hash = svc.hash_password("Abcdef12".into()).await.unwrap();
        let user = UserRepository::create(store, NewUser { email: "a@x.com".into(), first_name: "Ana".into(), last_name: "Lopez".into(), password_hash }).await.unwrap();
        if active { user } else { store.toggle_active(user.id).await.unwrap().unwrap() }
    }

    #[tokio::test]
    async fn token_round_trip() {
        let svc = service();
        let token = svc.generate_token(&ana()).await.unwrap();
        let claims = svc.validate_token(&token).await.unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.first_name, "Ana");
        assert!(claims.is_active);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let svc = service();
        let token = svc.issue(&ana(), Duration::minutes(-5)).unwrap();
        assert!(matches!(svc.validate_token(&token).await, Err(AppError::ExpiredToken)));
    }

    #[tokio::test]
    async fn foreign_signature_is_rejected() {
        let other = JwtAuthService::new("another-secret-that-is-long-enough", Algorithm::HS256, Duration::minutes(30), 4);
        let token = other.generate_token(&ana()).await.unwrap();
        assert!(matches!(service().validate_token(&token).await, Err(AppError::InvalidToken)));
        assert!(matches!(service().validate_token("not-a-jwt").await, Err(AppError::InvalidToken)));
    }

    #[test]
    fn only_hmac_algorithms_are_accepted() {
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert!(matches!(parse_algorithm("RS256"), Err(AppError::Config(_))));
        assert!(matches!(parse_algorithm("nope"), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn password_hash_verify() {
        let svc = service();
        let hash = svc.hash_password("Abcdef12".into()).await.unwrap();
        assert_ne!(hash, "Abcdef12");
        assert!(svc.verify_password("Abcdef12".into(), hash.clone()).await.unwrap());
        assert!(!svc.verify_password("Abcdef13".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_digest_verifies_false() {
        let ok = service().verify_password("Abcdef12".into(), "not-a-bcrypt-digest".into()).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn login_issues_token_for_valid_credentials() {
        let svc = service();
        let store = InMemoryStore::new();
        let user = seed(&store, &svc, true).await;
        let resp = login(&store, &svc, LoginRequest { email: "a@x.com".into(), password: "Abcdef12".into() }).await.unwrap();
        assert_eq!(resp.token_type, "bearer");
        assert_eq!(resp.user, UserResponse::from(user));
        let claims = svc.validate_token(&resp.access_token).await.unwrap();
        assert_eq!(claims.sub, "a@x.com");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let svc = service();
        let store = InMemoryStore::new();
        seed(&store, &svc, true).await;
        let wrong = login(&store, &svc, LoginRequest { email: "a@x.com".into(), password: "wrong".into() }).await.unwrap_err();
        let unknown = login(&store, &svc, LoginRequest { email: "b@x.com".into(), password: "Abcdef12".into() }).await.unwrap_err();
        assert_eq!(wrong.kind(), "invalid_credentials");
        assert_eq!(wrong.kind(), unknown.kind());
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    /// Delegates to a real service and counts password verifications.
    struct CountingAuth {
        inner: JwtAuthService,
        verifications: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AuthService for CountingAuth {
        async fn hash_password(&self, password: String) -> Result<String, AppError> {
            self.inner.hash_password(password).await
        }
        async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError> {
            self.verifications.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.verify_password(password, hash).await
        }
        async fn dummy_digest(&self) -> Result<String, AppError> {
            self.inner.dummy_digest().await
        }
        async fn generate_token(&self, user: &User) -> Result<String, AppError> {
            self.inner.generate_token(user).await
        }
        async fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
            self.inner.validate_token(token).await
        }
    }

    #[tokio::test]
    async fn unknown_email_still_runs_a_bcrypt_verification() {
        let counting = CountingAuth { inner: service(), verifications: Default::default() };
        let store = InMemoryStore::new();
        seed(&store, &counting.inner, true).await;
        let err = login(&store, &counting, LoginRequest { email: "nobody@x.com".into(), password: "no-account-has-this-password".into() }).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert_eq!(counting.verifications.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dummy_digest_is_a_stable_bcrypt_digest() {
        let svc = service();
        let first = svc.dummy_digest().await.unwrap();
        assert!(first.starts_with("$2"));
        assert_eq!(first, svc.dummy_digest().await.unwrap());
        assert!(!svc.verify_password("Abcdef12".into(), first).await.unwrap());
    }

    #[tokio::test]
    async fn iat_and_exp_share_one_clock_reading() {
        let svc = service();
        let token = svc.issue(&ana(), Duration::seconds(90)).unwrap();
        let claims = svc.validate_token(&token).await.unwrap();
        assert_eq!(claims.exp - claims.iat, 90);
    }

    #[test]
    fn out_of_range_lifetime_is_an_error_not_a_panic() {
        let svc = service();
        assert!(matches!(svc.issue(&ana(), Duration::days(365 * 1_000_000)), Err(AppError::Jwt(_))));
        let cfg = JwtConfig { secret: SECRET.into(), algorithm: "HS256".into(), expiry_minutes: i64::MAX, bcrypt_cost: 4 };
        assert!(matches!(JwtAuthService::from_config(&cfg), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn inactive_account_is_reported_after_password_check() {
        let svc = service();
        let store = InMemoryStore::new();
        seed(&store, &svc, false).await;
        let err = login(&store, &svc, LoginRequest { email: "a@x.com".into(), password: "Abcdef12".into() }).await.unwrap_err();
        assert!(matches!(err, AppError::AccountInactive));
        let err = login(&store, &svc, LoginRequest { email: "a@x.com".into(), password: "nope".into() }).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
}
