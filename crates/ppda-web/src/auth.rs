//! Bearer authentication.
//!
//! Tokens have the form `{account_id}:{secret}`. The secret is shared by
//! every caller and compared in constant time; the account id selects whose
//! groups apply. With no secret configured the API runs in development mode
//! and every caller is treated as an administrator.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use ppda_core::Group;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::AppState;

#[derive(Clone, Default)]
pub struct AuthConfig {
    secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("PPDA_API_SECRET").ok())
    }

    pub fn is_open(&self) -> bool {
        self.secret.is_none()
    }

    fn secret_matches(&self, provided: &str) -> bool {
        let Some(expected) = &self.secret else {
            return false;
        };
        let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
        if provided.len() != expected.len() {
            let _ = expected.ct_eq(expected);
            return false;
        }
        provided.ct_eq(expected).into()
    }
}

/// The authenticated principal of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// `None` in development mode.
    pub account_id: Option<i64>,
    pub groups: Vec<Group>,
}

impl Caller {
    pub fn development() -> Self {
        Self {
            account_id: None,
            groups: vec![Group::Admin],
        }
    }

    pub fn in_any(&self, groups: &[Group]) -> bool {
        self.groups.iter().any(|g| groups.contains(g))
    }
}

fn parse_token(header: &str) -> Option<(i64, &str)> {
    let token = header.strip_prefix("Bearer ")?.trim();
    let (account, secret) = token.split_once(':')?;
    Some((account.parse().ok()?, secret))
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.auth.is_open() {
            return Ok(Caller::development());
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let (account_id, secret) = parse_token(header).ok_or(AppError::Unauthorized)?;
        if !state.auth.secret_matches(secret) {
            return Err(AppError::Unauthorized);
        }

        let account = state
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(Caller {
            account_id: Some(account.id),
            groups: account.groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parsing() {
        assert_eq!(parse_token("Bearer 12:s3cret"), Some((12, "s3cret")));
        assert_eq!(parse_token("Bearer 12:a:b"), Some((12, "a:b")));
        assert_eq!(parse_token("Bearer s3cret"), None);
        assert_eq!(parse_token("Basic 12:s3cret"), None);
        assert_eq!(parse_token("Bearer x:s3cret"), None);
    }

    #[test]
    fn secret_comparison() {
        let auth = AuthConfig::new(Some("s3cret".into()));
        assert!(auth.secret_matches("s3cret"));
        assert!(!auth.secret_matches("s3cre"));
        assert!(!auth.secret_matches("s3cret!"));
        assert!(!AuthConfig::new(None).secret_matches(""));
    }

    #[test]
    fn empty_secret_means_open_mode() {
        assert!(AuthConfig::new(Some(String::new())).is_open());
        assert!(!format!("{:?}", AuthConfig::new(Some("s3cret".into()))).contains("s3cret"));
    }
}
