use uuid::Uuid;

use crate::error::TelemetryError;
use crate::platform::TokenProvider;

/// Hands out a token configured at startup. Every call re-reads it; nothing is
/// cached on the engine side.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn identity_token(&self, owner_id: Uuid) -> Result<String, TelemetryError> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(TelemetryError::Auth(format!(
                "no identity token available for owner {owner_id}"
            ))),
        }
    }
}
