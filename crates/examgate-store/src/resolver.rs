//! Token-table principal resolver.

use std::collections::HashMap;

use async_trait::async_trait;

use examgate_core::error::AuthError;
use examgate_core::model::Principal;
use examgate_core::scenario::PrincipalFixture;
use examgate_core::traits::PrincipalResolver;

/// Resolves bearer tokens against a fixed table.
///
/// Note: Custom Debug impl masks tokens to prevent accidental exposure in logs.
#[derive(Clone, Default)]
pub struct TokenResolver {
    tokens: HashMap<String, Principal>,
}

impl std::fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identities: Vec<&str> = self.tokens.values().map(|p| p.identity.as_str()).collect();
        f.debug_struct("TokenResolver")
            .field("tokens", &self.tokens.len())
            .field("identities", &identities)
            .finish()
    }
}

impl TokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    pub fn from_fixtures(principals: &[PrincipalFixture]) -> Self {
        principals.iter().fold(Self::new(), |resolver, p| {
            resolver.with_token(
                p.token.clone(),
                Principal::new(p.identity.clone(), p.permissions.iter().cloned()),
            )
        })
    }
}

#[async_trait]
impl PrincipalResolver for TokenResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}
