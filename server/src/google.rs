//! Google Sign-In: verification of Google-issued ID tokens

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const KEYS_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("token has no key id")]
    MissingKeyId,

    #[error("unknown signing key {0}")]
    UnknownKey(String),

    #[error("failed to fetch Google signing keys: {0}")]
    Keys(String),
}

/// Identity asserted by a verified ID token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, GoogleAuthError>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies RS256 ID tokens against Google's published JWKS
pub struct GoogleJwksVerifier {
    client: reqwest::Client,
    client_id: String,
    certs_url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl GoogleJwksVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            certs_url: GOOGLE_CERTS_URL.to_string(),
            cache: RwLock::new(None),
        }
    }

    async fn fetch_keys(&self) -> Result<JwkSet, GoogleAuthError> {
        info!(url = %self.certs_url, "Fetching Google signing keys");
        let response = self
            .client
            .get(&self.certs_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| GoogleAuthError::Keys(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GoogleAuthError::Keys(format!(
                "certs endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| GoogleAuthError::Keys(e.to_string()))
    }

    /// Cached keys while they are fresh, otherwise a new fetch
    async fn keys(&self) -> Result<JwkSet, GoogleAuthError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < KEYS_MAX_AGE {
                return Ok(cached.keys.clone());
            }
        }
        self.refresh_keys().await
    }

    async fn refresh_keys(&self) -> Result<JwkSet, GoogleAuthError> {
        let keys = self.fetch_keys().await?;
        *self.cache.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl GoogleVerifier for GoogleJwksVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, GoogleAuthError> {
        let header = decode_header(id_token)?;
        let kid = header.kid.ok_or(GoogleAuthError::MissingKeyId)?;

        // Google rotates keys ahead of the cache expiring
        let keys = self.keys().await?;
        let jwk = match keys.find(&kid) {
            Some(jwk) => jwk.clone(),
            None => self
                .refresh_keys()
                .await?
                .find(&kid)
                .cloned()
                .ok_or_else(|| GoogleAuthError::UnknownKey(kid.clone()))?,
        };
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(id_token, &key, &validation)?.claims;
        Ok(GoogleIdentity {
            subject: claims.sub,
            email: claims.email,
            name: claims.name.unwrap_or_default(),
            picture: claims.picture.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_kid(kid: &str) -> String {
        let header = jsonwebtoken::Header {
            kid: Some(kid.to_string()),
            ..Default::default()
        };
        jsonwebtoken::encode(
            &header,
            &serde_json::json!({"sub": "1", "email": "a@example.com", "exp": 4_000_000_000u64}),
            &jsonwebtoken::EncodingKey::from_secret(b"s"),
        )
        .unwrap()
    }

    /// A verifier whose cache is fresh but empty and whose certs endpoint
    /// refuses connections
    fn verifier_with_fresh_empty_cache() -> GoogleJwksVerifier {
        GoogleJwksVerifier {
            client: reqwest::Client::new(),
            client_id: "client-id".to_string(),
            certs_url: "http://127.0.0.1:9/certs".to_string(),
            cache: RwLock::new(Some(CachedKeys {
                keys: JwkSet { keys: vec![] },
                fetched_at: Instant::now(),
            })),
        }
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected_before_fetching_keys() {
        let verifier = GoogleJwksVerifier::new("client-id");
        let err = verifier.verify("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, GoogleAuthError::Token(_)));
    }

    #[tokio::test]
    async fn test_token_without_kid_is_rejected() {
        // HS256 header without "kid"
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({"sub": "1", "email": "a@example.com", "exp": 4_000_000_000u64}),
            &jsonwebtoken::EncodingKey::from_secret(b"s"),
        )
        .unwrap();
        let err = GoogleJwksVerifier::new("client-id")
            .verify(&token)
            .await
            .unwrap_err();
        assert!(matches!(err, GoogleAuthError::MissingKeyId));
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_fresh_cache() {
        let verifier = verifier_with_fresh_empty_cache();
        let err = verifier.verify(&token_with_kid("rotated")).await.unwrap_err();
        // A cache hit alone would report UnknownKey; reaching the endpoint
        // means the keys were refetched.
        assert!(matches!(err, GoogleAuthError::Keys(_)), "got {:?}", err);
    }
}
