use serde::{Deserialize, Serialize};

use super::ProviderKind;

/// Per-client login state. Persisted server-side, referenced by the session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub state: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub user_id: Option<i64>,
    pub provider: Option<ProviderKind>,
    pub provider_subject: Option<String>,
    pub access_token: Option<String>,
}

impl SessionContext {
    pub fn is_connected(&self) -> bool {
        self.user_id.is_some() && self.access_token.is_some()
    }

    /// Drops every identity field and the pending state token.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_all_fields() {
        let mut ctx = SessionContext {
            state: Some("s".into()),
            username: Some("Ann".into()),
            email: Some("ann@example.com".into()),
            picture: Some("https://example.com/a.png".into()),
            user_id: Some(1),
            provider: Some(ProviderKind::Google),
            provider_subject: Some("123".into()),
            access_token: Some("tok".into()),
        };
        assert!(ctx.is_connected());

        ctx.clear();
        assert_eq!(ctx, SessionContext::default());
        assert!(!ctx.is_connected());
    }
}
