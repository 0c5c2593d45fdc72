//! Credential loading
//!
//! Secrets come from environment variables, optionally seeded from a `.env`
//! file. They are wrapped in [`SecretString`] as soon as they are read and
//! only exposed when a request is signed or sent.

use std::path::Path;

use secrecy::SecretString;
use tracing::debug;

use crate::error::CredentialError;

pub const TWITTER_API_KEY: &str = "TWITTER_API_KEY";
pub const TWITTER_API_SECRET: &str = "TWITTER_API_SECRET";
pub const TWITTER_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
pub const TWITTER_ACCESS_SECRET: &str = "TWITTER_ACCESS_SECRET";
pub const DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

/// OAuth 1.0a user-context credentials for the Twitter/X API
#[derive(Debug)]
pub struct TwitterCredentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub access_token: SecretString,
    pub access_secret: SecretString,
}

impl TwitterCredentials {
    /// Read all four Twitter variables from the environment.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` naming every variable that is unset
    /// or empty.
    pub fn from_env() -> Result<Self, CredentialError> {
        let [api_key, api_secret, access_token, access_secret] = require_env([
            TWITTER_API_KEY,
            TWITTER_API_SECRET,
            TWITTER_ACCESS_TOKEN,
            TWITTER_ACCESS_SECRET,
        ])?;

        Ok(Self {
            api_key,
            api_secret,
            access_token,
            access_secret,
        })
    }
}

/// Webhook URL for the Discord channel
#[derive(Debug)]
pub struct DiscordCredentials {
    pub webhook_url: SecretString,
}

impl DiscordCredentials {
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` if `DISCORD_WEBHOOK_URL` is unset.
    pub fn from_env() -> Result<Self, CredentialError> {
        let [webhook_url] = require_env([DISCORD_WEBHOOK_URL])?;
        Ok(Self { webhook_url })
    }
}

/// Load a `.env` file into the process environment if it exists.
///
/// Variables already set in the environment take precedence.
pub fn load_dotenv(path: &Path) {
    if !path.exists() {
        return;
    }
    match dotenvy::from_path(path) {
        Ok(()) => debug!("Loaded environment from {}", path.display()),
        Err(e) => tracing::warn!("Failed to load {}: {}", path.display(), e),
    }
}

/// Read every variable in `keys`, reporting all missing ones at once.
fn require_env<const N: usize>(keys: [&str; N]) -> Result<[SecretString; N], CredentialError> {
    let mut missing = Vec::new();
    let values = keys.map(|key| match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value)),
        _ => {
            missing.push(key.to_string());
            None
        }
    });

    if !missing.is_empty() {
        return Err(CredentialError::Missing(missing));
    }

    Ok(values.map(|value| value.unwrap_or_else(|| SecretString::from(String::new()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    fn clear_twitter_env() {
        for key in [
            TWITTER_API_KEY,
            TWITTER_API_SECRET,
            TWITTER_ACCESS_TOKEN,
            TWITTER_ACCESS_SECRET,
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_twitter_credentials_from_env() {
        clear_twitter_env();
        std::env::set_var(TWITTER_API_KEY, "key");
        std::env::set_var(TWITTER_API_SECRET, "secret");
        std::env::set_var(TWITTER_ACCESS_TOKEN, "token");
        std::env::set_var(TWITTER_ACCESS_SECRET, "token-secret");

        let creds = TwitterCredentials::from_env().unwrap();
        assert_eq!(creds.api_key.expose_secret(), "key");
        assert_eq!(creds.access_secret.expose_secret(), "token-secret");

        clear_twitter_env();
    }

    #[test]
    #[serial]
    fn test_missing_twitter_credentials_are_all_reported() {
        clear_twitter_env();
        std::env::set_var(TWITTER_API_KEY, "key");
        std::env::set_var(TWITTER_ACCESS_TOKEN, "   ");

        let err = TwitterCredentials::from_env().unwrap_err();
        match err {
            CredentialError::Missing(keys) => assert_eq!(
                keys,
                vec![
                    TWITTER_API_SECRET.to_string(),
                    TWITTER_ACCESS_TOKEN.to_string(),
                    TWITTER_ACCESS_SECRET.to_string(),
                ]
            ),
            other => panic!("Expected Missing, got {:?}", other),
        }

        clear_twitter_env();
    }

    #[test]
    #[serial]
    fn test_discord_credentials() {
        std::env::remove_var(DISCORD_WEBHOOK_URL);
        assert!(DiscordCredentials::from_env().is_err());

        std::env::set_var(DISCORD_WEBHOOK_URL, "https://discord.com/api/webhooks/1/x");
        let creds = DiscordCredentials::from_env().unwrap();
        assert_eq!(
            creds.webhook_url.expose_secret(),
            "https://discord.com/api/webhooks/1/x"
        );
        std::env::remove_var(DISCORD_WEBHOOK_URL);
    }

    #[test]
    #[serial]
    fn test_load_dotenv_does_not_override_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DISCORD_WEBHOOK_URL=https://from-file.example/hook\n").unwrap();

        std::env::set_var(DISCORD_WEBHOOK_URL, "https://from-env.example/hook");
        load_dotenv(&path);
        assert_eq!(
            std::env::var(DISCORD_WEBHOOK_URL).unwrap(),
            "https://from-env.example/hook"
        );

        std::env::remove_var(DISCORD_WEBHOOK_URL);
        load_dotenv(&path);
        assert_eq!(
            std::env::var(DISCORD_WEBHOOK_URL).unwrap(),
            "https://from-file.example/hook"
        );
        std::env::remove_var(DISCORD_WEBHOOK_URL);
    }
}
