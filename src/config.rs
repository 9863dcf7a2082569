// src/config.rs
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// OAuth client settings for the Google authorization flow. Only present when
/// all three variables are configured; the authorization handlers report a
/// configuration error to the user otherwise.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub youtube_api_key: Option<String>,
    pub oauth: Option<OAuthConfig>,
    pub allowed_hosts: Vec<String>,
}

impl AppConfig {
    /// Reads configuration from the environment. Only the database URL is
    /// mandatory; the YouTube API key and OAuth client settings may be absent
    /// and the affected features degrade with a user-facing message instead
    /// of failing startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let bind_addr = optional_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let youtube_api_key = optional_var("YOUTUBE_API_KEY");

        let oauth = match (
            optional_var("GOOGLE_CLIENT_ID"),
            optional_var("GOOGLE_CLIENT_SECRET"),
            optional_var("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            (None, None, None) => None,
            _ => {
                // Partial OAuth config is treated as absent so the failure
                // shows up as one clear message instead of a broken flow.
                tracing::warn!(
                    "incomplete OAuth configuration: GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and \
                     GOOGLE_REDIRECT_URI must all be set"
                );
                None
            }
        };

        let allowed_hosts = parse_allowed_hosts(
            &optional_var("ALLOWED_HOSTS").unwrap_or_else(|| "localhost,127.0.0.1".to_string()),
        );

        Ok(Self {
            database_url,
            bind_addr,
            youtube_api_key,
            oauth,
            allowed_hosts,
        })
    }
}

/// Environment lookup that treats empty values the same as unset ones.
fn optional_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn parse_allowed_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_hosts_splits_and_trims() {
        let hosts = parse_allowed_hosts("localhost, 127.0.0.1 ,videoteca.example.com");
        assert_eq!(hosts, vec!["localhost", "127.0.0.1", "videoteca.example.com"]);
    }

    #[test]
    fn test_parse_allowed_hosts_drops_empty_entries() {
        let hosts = parse_allowed_hosts("localhost,,  ,127.0.0.1");
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn test_parse_allowed_hosts_lowercases() {
        let hosts = parse_allowed_hosts("LocalHost");
        assert_eq!(hosts, vec!["localhost"]);
    }
}
