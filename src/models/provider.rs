use serde::{Deserialize, Serialize};

/// Supported OAuth identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Facebook,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

/// Identity claims returned by a successful provider exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderIdentity {
    pub provider: ProviderKind,
    pub subject: String,
    pub access_token: String,
    pub name: String,
    pub email: String,
    pub picture: Option<String>,
}
