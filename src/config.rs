use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read secret file {path}: {source}")]
    SecretFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed secret file {path}: {source}")]
    SecretFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Google OAuth client material (`client_secrets.json`, "web" section)
#[derive(Clone, Debug, Deserialize)]
pub struct GoogleSecrets {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct GoogleSecretsFile {
    web: GoogleSecrets,
}

/// Facebook app material (`fb_client_secrets.json`)
#[derive(Clone, Debug, Deserialize)]
pub struct FacebookSecrets {
    pub app_id: String,
    pub app_secret: String,
}

/// Provider endpoints. Overridable so the flows can run against a local server.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    pub google_token_url: String,
    pub google_tokeninfo_url: String,
    pub google_userinfo_url: String,
    pub google_revoke_url: String,
    pub google_jwks_url: String,
    pub facebook_graph_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            google_tokeninfo_url: "https://www.googleapis.com/oauth2/v1/tokeninfo".to_string(),
            google_userinfo_url: "https://www.googleapis.com/oauth2/v1/userinfo".to_string(),
            google_revoke_url: "https://accounts.google.com/o/oauth2/revoke".to_string(),
            google_jwks_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            facebook_graph_url: "https://graph.facebook.com/v2.8".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageSearchConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub session_secret: String,
    pub static_root: PathBuf,
    pub http_timeout: Duration,
    pub google: Option<GoogleSecrets>,
    pub facebook: Option<FacebookSecrets>,
    pub endpoints: ProviderEndpoints,
    pub image_search: Option<ImageSearchConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let session_secret =
            env::var("SESSION_SECRET").map_err(|_| ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET",
                value: String::new(),
            });
        }

        let google_path = env::var("GOOGLE_CLIENT_SECRETS")
            .unwrap_or_else(|_| "client_secrets.json".to_string());
        let facebook_path = env::var("FB_CLIENT_SECRETS")
            .unwrap_or_else(|_| "fb_client_secrets.json".to_string());

        let defaults = ProviderEndpoints::default();
        let endpoints = ProviderEndpoints {
            google_token_url: env::var("GOOGLE_TOKEN_URL").unwrap_or(defaults.google_token_url),
            google_tokeninfo_url: env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or(defaults.google_tokeninfo_url),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or(defaults.google_userinfo_url),
            google_revoke_url: env::var("GOOGLE_REVOKE_URL").unwrap_or(defaults.google_revoke_url),
            google_jwks_url: env::var("GOOGLE_JWKS_URL").unwrap_or(defaults.google_jwks_url),
            facebook_graph_url: env::var("FACEBOOK_GRAPH_URL")
                .unwrap_or(defaults.facebook_graph_url),
        };

        let image_search = match (env::var("IMAGE_SEARCH_URL"), env::var("IMAGE_SEARCH_KEY")) {
            (Ok(url), Ok(api_key)) if !api_key.is_empty() => Some(ImageSearchConfig { url, api_key }),
            (Err(_), Ok(api_key)) if !api_key.is_empty() => Some(ImageSearchConfig {
                url: "https://api.bing.microsoft.com/v7.0/images/search".to_string(),
                api_key,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://db/itemcatalog.db".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 5001)?,
            session_secret,
            static_root: PathBuf::from(
                env::var("STATIC_ROOT").unwrap_or_else(|_| "static".to_string()),
            ),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 10)?),
            google: optional_secret(&google_path, load_google_secrets),
            facebook: optional_secret(&facebook_path, load_facebook_secrets),
            endpoints,
            image_search,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(static_root: &Path) -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            session_secret: "test-secret".to_string(),
            static_root: static_root.to_path_buf(),
            http_timeout: Duration::from_secs(2),
            google: None,
            facebook: None,
            endpoints: ProviderEndpoints::default(),
            image_search: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

/// A provider whose secret file is absent is disabled rather than fatal.
fn optional_secret<T>(
    path: &str,
    load: fn(&Path) -> Result<T, ConfigError>,
) -> Option<T> {
    match load(Path::new(path)) {
        Ok(secrets) => Some(secrets),
        Err(e) => {
            tracing::warn!("Provider disabled: {}", e);
            None
        }
    }
}

fn read_secret_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::SecretFile {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_google_secrets(path: &Path) -> Result<GoogleSecrets, ConfigError> {
    let raw = read_secret_file(path)?;
    let file: GoogleSecretsFile =
        serde_json::from_str(&raw).map_err(|source| ConfigError::SecretFormat {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.web)
}

pub fn load_facebook_secrets(path: &Path) -> Result<FacebookSecrets, ConfigError> {
    let raw = read_secret_file(path)?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::SecretFormat {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_google_secrets_reads_web_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"web": {{"client_id": "cid.apps.googleusercontent.com", "client_secret": "shh", "redirect_uris": []}}}}"#
        )
        .unwrap();

        let secrets = load_google_secrets(file.path()).unwrap();
        assert_eq!(secrets.client_id, "cid.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "shh");
    }

    #[test]
    fn test_load_facebook_secrets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"app_id": "1234", "app_secret": "abcd"}}"#).unwrap();

        let secrets = load_facebook_secrets(file.path()).unwrap();
        assert_eq!(secrets.app_id, "1234");
        assert_eq!(secrets.app_secret, "abcd");
    }

    #[test]
    fn test_missing_secret_file_disables_provider() {
        let secrets = optional_secret("/nonexistent/fb_client_secrets.json", load_facebook_secrets);
        assert!(secrets.is_none());
    }

    #[test]
    fn test_malformed_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_google_secrets(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::SecretFormat { .. }));
    }
}
