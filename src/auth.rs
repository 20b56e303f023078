use crate::config::{AUTHORIZATION_VAR, ConfigError, read_string_list};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use std::collections::HashSet;

/// Decides whether a caller's bearer token may use the gateway.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, token: &str) -> bool;
}

/// Fixed set of accepted tokens, loaded from `AUTHORIZATION` at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashSet<String>,
}

impl StaticTokens {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::new(read_string_list(&lookup, AUTHORIZATION_VAR)?))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authorizer for StaticTokens {
    async fn authorize(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Extracts the token from `Authorization: Bearer <token>`; the scheme is
/// matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub async fn require_bearer(headers: &HeaderMap, authorizer: &dyn Authorizer) -> AppResult<()> {
    let token = bearer_token(headers).ok_or_else(AppError::unauthorized)?;
    if authorizer.authorize(token).await {
        Ok(())
    } else {
        Err(AppError::unauthorized())
    }
}
