//! User accounts, password login and bearer-token checks.

pub mod jwt;
pub mod password;
pub mod users;

use std::num::NonZeroU32;

use axum::http::{header, HeaderMap};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Deserialize;

use crate::core::config::settings::AuthSettings;
use crate::core::errors::ApiError;

pub use jwt::JwtService;
pub use users::{NewUser, User, UserStore, ROLE_ADMIN, ROLE_USER};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

/// Tracked login keys above which fully replenished entries are dropped.
const LOGIN_LIMITER_SWEEP_THRESHOLD: usize = 1024;

pub struct AuthService {
    users: UserStore,
    jwt: JwtService,
    enabled: bool,
    login_limiter: DefaultKeyedRateLimiter<String>,
    limiter_sweep_threshold: usize,
}

impl AuthService {
    pub fn new(users: UserStore, settings: &AuthSettings) -> Self {
        let per_minute = NonZeroU32::new(settings.login_attempts_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Self {
            users,
            jwt: JwtService::new(&settings.secret_key, settings.access_token_expire_minutes),
            enabled: settings.enabled,
            login_limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            limiter_sweep_threshold: LOGIN_LIMITER_SWEEP_THRESHOLD,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, ApiError> {
        let email = request.email.trim();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
        let username = request.username.trim();
        if username.chars().count() < 3 {
            return Err(ApiError::BadRequest(
                "Username must be at least 3 characters long".to_string(),
            ));
        }
        password::validate_password_strength(&request.password)?;

        if self.users.get_by_email(email).await?.is_some() {
            return Err(ApiError::BadRequest("Email already registered".to_string()));
        }
        if self.users.get_by_username(username).await?.is_some() {
            return Err(ApiError::BadRequest("Username already taken".to_string()));
        }

        let hashed = password::hash_password(&request.password)?;
        self.users
            .create_user(NewUser {
                email,
                username,
                hashed_password: &hashed,
                full_name: request.full_name.trim(),
                role: ROLE_USER,
            })
            .await?
            .ok_or_else(|| ApiError::Conflict("User already exists".to_string()))
    }

    /// Checks credentials and issues an access token. `login` may be an email or a username.
    pub async fn login(&self, login: &str, password: &str) -> Result<(String, User), ApiError> {
        let key = login.trim().to_lowercase();
        let limited = self.login_limiter.check_key(&key).is_err();
        self.sweep_login_limiter();
        if limited {
            tracing::warn!("Login rate limit hit for {}", key);
            return Err(ApiError::TooManyRequests);
        }

        let user = match self.users.get_by_email(&key).await? {
            Some(user) => Some(user),
            None => self.users.get_by_username(&key).await?,
        };
        let user = match user {
            Some(user) if password::verify_password(password, &user.hashed_password) => user,
            _ => return Err(ApiError::unauthorized("Incorrect email or password")),
        };
        if !user.is_active {
            return Err(ApiError::Forbidden("Inactive user".to_string()));
        }

        self.users.update_last_login(user.id).await?;
        let token = self.jwt.create_token(&user.email)?;
        Ok((token, user))
    }

    /// Forgets logins whose attempt budget has fully refilled once too many are tracked.
    fn sweep_login_limiter(&self) {
        if self.login_limiter.len() > self.limiter_sweep_threshold {
            self.login_limiter.retain_recent();
            self.login_limiter.shrink_to_fit();
            tracing::debug!("Login limiter now tracks {} keys", self.login_limiter.len());
        }
    }

    async fn user_for_token(&self, token: &str) -> Result<User, ApiError> {
        let claims = self.jwt.verify_token(token)?;
        let user = self
            .users
            .get_by_email(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User not found"))?;
        if !user.is_active {
            return Err(ApiError::Forbidden("Inactive user".to_string()));
        }
        Ok(user)
    }

    pub async fn require_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        if !self.enabled {
            return Ok(User::developer());
        }
        let token = bearer_token(headers).ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        self.user_for_token(token).await
    }

    pub async fn require_admin(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let user = self.require_user(headers).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Not enough permissions".to_string()));
        }
        Ok(user)
    }

    /// The caller if a valid token is present; anonymous otherwise, and always while auth is off.
    pub async fn optional_user(&self, headers: &HeaderMap) -> Option<User> {
        if !self.enabled {
            return None;
        }
        let token = bearer_token(headers)?;
        self.user_for_token(token).await.ok()
    }

    /// Creates the configured admin account when there are no users yet.
    pub async fn bootstrap_admin(&self, settings: &AuthSettings) -> Result<Option<User>, ApiError> {
        if self.users.count().await? > 0 {
            return Ok(None);
        }
        let hashed = password::hash_password(&settings.admin_password)?;
        let admin = self
            .users
            .create_user(NewUser {
                email: &settings.admin_email,
                username: &settings.admin_username,
                hashed_password: &hashed,
                full_name: &settings.admin_full_name,
                role: ROLE_ADMIN,
            })
            .await?;
        if admin.is_some() {
            tracing::info!("Created admin account {}", settings.admin_email);
        }
        Ok(admin)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::connect_in_memory;
    use axum::http::HeaderValue;

    async fn service(settings: AuthSettings) -> AuthService {
        let users = UserStore::new(connect_in_memory().await).await.unwrap();
        AuthService::new(users, &settings)
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            secret_key: "test-secret".to_string(),
            ..AuthSettings::default()
        }
    }

    fn register_request(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: "Secret123".to_string(),
            full_name: "Asha Rao".to_string(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn register_login_and_resolve_token() {
        let auth = service(settings()).await;
        let user = auth.register(register_request("asha@example.com", "asha")).await.unwrap();
        assert_eq!(user.role, ROLE_USER);

        let (token, logged_in) = auth.login("Asha@Example.com", "Secret123").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let current = auth.require_user(&bearer(&token)).await.unwrap();
        assert_eq!(current.email, "asha@example.com");
        assert!(current.last_login.is_some());

        assert!(matches!(
            auth.require_admin(&bearer(&token)).await,
            Err(ApiError::Forbidden(_))
        ));
        assert_eq!(auth.optional_user(&bearer(&token)).await.map(|u| u.id), Some(user.id));
        assert!(auth.optional_user(&HeaderMap::new()).await.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_registrations_and_credentials() {
        let auth = service(settings()).await;
        auth.register(register_request("asha@example.com", "asha")).await.unwrap();

        assert!(matches!(
            auth.register(register_request("asha@example.com", "other")).await,
            Err(ApiError::BadRequest(msg)) if msg == "Email already registered"
        ));
        assert!(matches!(
            auth.register(register_request("new@example.com", "ASHA")).await,
            Err(ApiError::BadRequest(msg)) if msg == "Username already taken"
        ));

        let mut weak = register_request("weak@example.com", "weak");
        weak.password = "password".to_string();
        assert!(auth.register(weak).await.is_err());

        assert!(matches!(
            auth.login("asha@example.com", "Wrong123").await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            auth.require_user(&HeaderMap::new()).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(auth.require_user(&bearer("garbage")).await.is_err());
    }

    #[tokio::test]
    async fn login_attempts_are_rate_limited() {
        let auth = service(AuthSettings {
            login_attempts_per_minute: 2,
            ..settings()
        })
        .await;

        for _ in 0..2 {
            assert!(matches!(
                auth.login("nobody@example.com", "x").await,
                Err(ApiError::Unauthorized(_))
            ));
        }
        assert!(matches!(
            auth.login("nobody@example.com", "x").await,
            Err(ApiError::TooManyRequests)
        ));
    }

    #[tokio::test]
    async fn idle_login_keys_are_forgotten() {
        // One attempt per millisecond, so a single use refills almost at once.
        let mut auth = service(AuthSettings {
            login_attempts_per_minute: 60_000,
            ..settings()
        })
        .await;
        auth.limiter_sweep_threshold = 2;

        for name in ["a@example.com", "b@example.com", "c@example.com"] {
            let _ = auth.login(name, "x").await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let _ = auth.login("d@example.com", "x").await;
        assert!(auth.login_limiter.len() <= 1);
    }

    #[tokio::test]
    async fn disabled_auth_acts_as_developer_admin() {
        let auth = service(AuthSettings {
            enabled: false,
            ..settings()
        })
        .await;
        let user = auth.require_admin(&HeaderMap::new()).await.unwrap();
        assert_eq!(user.username, "developer");
        assert!(auth.optional_user(&HeaderMap::new()).await.is_none());
    }

    #[tokio::test]
    async fn admin_is_bootstrapped_once() {
        let auth = service(settings()).await;
        let admin = auth.bootstrap_admin(&settings()).await.unwrap().unwrap();
        assert!(admin.is_admin());
        assert_eq!(admin.email, "admin@financerag.com");
        assert!(auth.bootstrap_admin(&settings()).await.unwrap().is_none());

        let (_, user) = auth.login("admin", "Admin@123").await.unwrap();
        assert!(user.is_admin());
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
