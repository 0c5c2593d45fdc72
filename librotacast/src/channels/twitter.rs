//! Twitter/X channel
//!
//! Creates tweets through the v2 API (`POST /2/tweets`) using OAuth 1.0a
//! user-context signing.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha1::Sha1;

use crate::channels::{Channel, Delivery};
use crate::credentials::TwitterCredentials;
use crate::error::{DeliveryError, Result};
use crate::types::ContentItem;

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";
const TWEET_CHARACTER_LIMIT: usize = 280;

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

pub struct TwitterChannel {
    credentials: TwitterCredentials,
    api_base: String,
    client: Client,
}

impl TwitterChannel {
    /// Create a channel using the public Twitter API
    pub fn new(credentials: TwitterCredentials, timeout: Duration) -> Result<Self> {
        Self::with_api_base(credentials, DEFAULT_API_BASE, timeout)
    }

    /// Create a channel against a different API host (used by tests)
    pub fn with_api_base(
        credentials: TwitterCredentials,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn tweets_url(&self) -> String {
        format!("{}/2/tweets", self.api_base)
    }

    /// Build the `Authorization` header for a request.
    ///
    /// The JSON body is not part of the signature; only the oauth_* parameters
    /// are signed.
    fn authorization_header(&self, method: &str, url: &str, nonce: &str, timestamp: i64) -> String {
        let timestamp = timestamp.to_string();
        let mut params = vec![
            ("oauth_consumer_key", self.credentials.api_key.expose_secret()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.credentials.access_token.expose_secret()),
            ("oauth_version", "1.0"),
        ];
        params.sort();

        let signature = sign(
            method,
            url,
            &params,
            self.credentials.api_secret.expose_secret(),
            self.credentials.access_secret.expose_secret(),
        );

        let mut header_params: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect();
        header_params.push(format!("oauth_signature=\"{}\"", percent_encode(&signature)));
        header_params.sort();

        format!("OAuth {}", header_params.join(", "))
    }
}

#[async_trait]
impl Channel for TwitterChannel {
    fn name(&self) -> &str {
        "twitter"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(TWEET_CHARACTER_LIMIT)
    }

    async fn deliver(&self, _item: &ContentItem, text: &str) -> std::result::Result<Delivery, DeliveryError> {
        let url = self.tweets_url();
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp();
        let authorization = self.authorization_header("POST", &url, &nonce, timestamp);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::from_status(status.as_u16(), body));
        }

        // The tweet exists once Twitter answers 2xx, so an unreadable body
        // must not turn into a failure that would post it again.
        match response.json::<CreateTweetResponse>().await {
            Ok(created) => {
                tracing::info!("Tweet posted successfully. ID: {}", created.data.id);
                Ok(Delivery::with_field("tweet_id", created.data.id))
            }
            Err(e) => {
                tracing::warn!("Tweet posted ({}) but the response was unreadable: {}", status, e);
                Ok(Delivery::empty())
            }
        }
    }
}

/// Compute the base64 HMAC-SHA1 signature over the OAuth signature base string.
fn sign(
    method: &str,
    url: &str,
    sorted_params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let param_string = sorted_params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    );
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );

    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha1::new_from_slice(signing_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(base_string.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Percent-encode per RFC 3986, leaving only unreserved characters as-is.
fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> TwitterCredentials {
        TwitterCredentials {
            api_key: SecretString::from("xvz1evFS4wEEPTGEFPHBog".to_string()),
            api_secret: SecretString::from("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string()),
            access_token: SecretString::from("370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string()),
            access_secret: SecretString::from("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string()),
        }
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("An encoded string!"), "An%20encoded%20string%21");
        assert_eq!(percent_encode("Dogs, Cats & Mice"), "Dogs%2C%20Cats%20%26%20Mice");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
    }

    #[test]
    fn test_signature_matches_published_example() {
        // Worked example from the Twitter "Creating a signature" guide.
        let mut params = vec![
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            (
                "oauth_token",
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            ),
            ("oauth_version", "1.0"),
            (
                "status",
                "Hello Ladies + Gentlemen, a signed OAuth request!",
            ),
        ];
        params.sort();

        let signature = sign(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        );
        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_authorization_header_shape() {
        let channel =
            TwitterChannel::new(credentials(), Duration::from_secs(1)).unwrap();
        let header = channel.authorization_header(
            "POST",
            "https://api.twitter.com/2/tweets",
            "nonce123",
            1318622958,
        );

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
        assert!(header.contains("oauth_nonce=\"nonce123\""));
        assert!(header.contains("oauth_timestamp=\"1318622958\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"));
    }

    #[test]
    fn test_nonce_is_random_alphanumeric() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_successful_tweet_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header_regex("authorization", "^OAuth .*oauth_signature="))
            .and(body_json(serde_json::json!({ "text": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1445880548472328192", "text": "hello" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            TwitterChannel::with_api_base(credentials(), &server.uri(), Duration::from_secs(2))
                .unwrap();
        let item = ContentItem::new(0, "hello", "goal");
        let delivery = channel.deliver(&item, "hello").await.unwrap();
        assert_eq!(
            delivery.extra.get("tweet_id").unwrap(),
            "1445880548472328192"
        );
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let cases = [
            (429, true),
            (503, true),
            (401, false),
            (403, false),
            (400, false),
        ];

        for (status, recoverable) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let channel =
                TwitterChannel::with_api_base(credentials(), &server.uri(), Duration::from_secs(2))
                    .unwrap();
            let item = ContentItem::new(0, "hello", "goal");
            let err = channel.deliver(&item, "hello").await.unwrap_err();
            assert_eq!(err.is_recoverable(), recoverable, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_unparseable_success_body_still_counts_as_posted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            TwitterChannel::with_api_base(credentials(), &server.uri(), Duration::from_secs(2))
                .unwrap();
        let item = ContentItem::new(0, "hello", "goal");
        let delivery = channel.deliver(&item, "hello").await.unwrap();
        assert!(delivery.extra.get("tweet_id").is_none());
    }
}
