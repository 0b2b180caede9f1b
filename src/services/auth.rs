use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::task;
use uuid::Uuid;

use crate::models::{Session, User, UserRole};
use crate::services::clock::Clock;
use crate::services::database::Database;
use crate::services::password;

/// Shortest password `add-user` and `set-password` accept.
pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, missing password and wrong password all look the same.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Login failed")]
    Unavailable(#[source] anyhow::Error),
}

/// Resolves a credential pair to a known user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError>;
}

/// Accepts users registered in the local `users` table whose own Argon2
/// password hash matches. Users without a hash cannot sign in.
pub struct DirectoryAuthenticator {
    db: Database,
}

impl DirectoryAuthenticator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .db
            .get_user_by_email(email)
            .await
            .map_err(AuthError::Unavailable)?
            .ok_or(AuthError::InvalidCredentials)?;

        let Some(hash) = self
            .db
            .get_password_hash(&user.id)
            .await
            .map_err(AuthError::Unavailable)?
        else {
            tracing::warn!("{} has no password set", user.email);
            return Err(AuthError::InvalidCredentials);
        };

        let password = password.to_string();
        let matches = task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Unavailable(e.into()))?
            .map_err(AuthError::Unavailable)?;

        if matches {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Runs the authenticator, stamps `last_login` and opens a fresh session.
pub async fn login(
    authenticator: &dyn Authenticator,
    db: &Database,
    clock: &dyn Clock,
    email: &str,
    password: &str,
) -> Result<Session, AuthError> {
    let user = match authenticator.authenticate(email, password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Login rejected for {}: {}", email, e);
            return Err(e);
        }
    };

    let now = clock.now();
    if let Err(e) = db.record_login(&user.id, now).await {
        tracing::error!("Failed to record login for {}: {}", user.email, e);
    }
    tracing::info!("{} logged in", user.email);

    Ok(Session::start(user, now))
}

/// Operator-side registration used by `ewa add-user`.
pub async fn register_user(
    db: &Database,
    email: &str,
    role: UserRole,
    password: &str,
) -> anyhow::Result<User> {
    let email = email.trim();
    if !email.contains('@') {
        anyhow::bail!("Not an email address: {}", email);
    }
    let hash = hash_checked(password).await?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        role,
        created_at: Utc::now(),
        last_login: None,
    };
    db.insert_user(&user).await?;
    db.set_password_hash(&user.id, &hash).await?;
    tracing::info!("Registered {} as {}", user.email, role.as_str());
    Ok(user)
}

/// Replace an existing user's password (`ewa set-password`).
pub async fn set_password(db: &Database, email: &str, password: &str) -> anyhow::Result<()> {
    let user = db
        .get_user_by_email(email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No user with email {}", email.trim()))?;
    let hash = hash_checked(password).await?;
    db.set_password_hash(&user.id, &hash).await?;
    tracing::info!("Password updated for {}", user.email);
    Ok(())
}

async fn hash_checked(password: &str) -> anyhow::Result<String> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        anyhow::bail!("Password must be at least {} characters", MIN_PASSWORD_CHARS);
    }
    let password = password.to_string();
    task::spawn_blocking(move || password::hash_password(&password)).await?
}
