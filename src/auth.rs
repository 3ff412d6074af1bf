use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

/// The authenticated actor behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Ulid,
    pub is_admin: bool,
}

#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthorized => write!(f, "missing or invalid credential"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Identity collaborator boundary: turns a bearer credential into a
/// verified principal. Token issuance lives outside this crate.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<Principal, AuthError>;
}

/// Table-driven verifier for tests and closed deployments: tokens are
/// registered up front and looked up verbatim.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: DashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenVerifier {
    async fn verify(&self, bearer: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(bearer)
            .map(|e| *e.value())
            .ok_or(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_verifies() {
        let verifier = StaticTokenVerifier::new();
        let principal = Principal {
            user_id: Ulid::new(),
            is_admin: true,
        };
        verifier.register("tok-1", principal);

        assert_eq!(verifier.verify("tok-1").await.unwrap(), principal);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let verifier = StaticTokenVerifier::new();
        assert!(matches!(
            verifier.verify("nope").await,
            Err(AuthError::Unauthorized)
        ));
    }
}
