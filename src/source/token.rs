//! OAuth client credentials token cache

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::http::{FetchError, HttpClient, LOOKUP_TIMEOUT, Transport, static_url};

/// Token endpoint
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens expiring within this duration are refreshed
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Bearer token and its absolute expiry
#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_usable(&self) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) > REFRESH_MARGIN
    }
}

/// Client credentials
#[derive(Debug)]
struct ClientCredentials {
    id: String,
    secret: String,
}

/// Acquire and cache a bearer token with the client credentials flow
pub(crate) struct TokenManager {
    http: HttpClient,
    credentials: Option<ClientCredentials>,
    token: tokio::sync::Mutex<Option<AccessToken>>,
}

impl TokenManager {
    /// Create a token manager, blank credentials count as missing
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Self {
        let credentials = match (
            client_id.map(str::trim).filter(|s| !s.is_empty()),
            client_secret.map(str::trim).filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => Some(ClientCredentials {
                id: id.to_owned(),
                secret: secret.to_owned(),
            }),
            _ => None,
        };
        Self {
            http: HttpClient::new(transport, "spotify token", LOOKUP_TIMEOUT, None),
            credentials,
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Get a valid token, refreshing it if needed.
    ///
    /// Concurrent callers wait for the same refresh.
    pub(crate) async fn token(&self) -> Result<String, FetchError> {
        let Some(credentials) = &self.credentials else {
            return Err(FetchError::Config(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are required",
            ));
        };

        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref()
            && current.is_usable()
        {
            return Ok(current.value.clone());
        }

        log::debug!("Requesting new Spotify access token");
        let request = self
            .http
            .post(static_url(TOKEN_URL))
            .form(&[("grant_type", "client_credentials")])
            .basic_auth(&credentials.id, &credentials.secret);
        let response: TokenResponse = self.http.send_json(request).await?;
        if response.access_token.is_empty() {
            return Err(FetchError::Upstream(
                "empty access token in Spotify token response".to_owned(),
            ));
        }
        log::debug!(
            "Acquired Spotify access token, expires in {}s",
            response.expires_in
        );

        let value = response.access_token;
        *token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }

    /// Replace cached token
    #[cfg(test)]
    pub(crate) async fn seed(&self, value: &str, expires_in: Duration) {
        *self.token.lock().await = Some(AccessToken {
            value: value.to_owned(),
            expires_at: Instant::now() + expires_in,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::Method, source::tests::fake};

    const TOKEN: &str = r#"{"access_token": "fresh", "token_type": "Bearer", "expires_in": 3600}"#;

    #[tokio::test]
    async fn missing_credentials() {
        let (fake, transport) = fake();
        for (id, secret) in [(None, Some("s")), (Some("i"), None), (Some(" "), Some("s"))] {
            let manager = TokenManager::new(Arc::clone(&transport), id, secret);
            assert!(matches!(
                manager.token().await.unwrap_err(),
                FetchError::Config(_)
            ));
        }
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn token_request() {
        let (fake, transport) = fake();
        fake.route("accounts.spotify.com/api/token", 200, TOKEN);
        let manager = TokenManager::new(transport, Some("id"), Some("secret"));

        assert_eq!(manager.token().await.unwrap(), "fresh");
        assert_eq!(manager.token().await.unwrap(), "fresh");

        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.form,
            [("grant_type".to_owned(), "client_credentials".to_owned())]
        );
        assert_eq!(
            request.basic_auth,
            Some(("id".to_owned(), "secret".to_owned()))
        );
        assert_eq!(request.timeout, LOOKUP_TIMEOUT);
    }

    #[tokio::test]
    async fn refresh_boundary() {
        let (fake, transport) = fake();
        fake.route("accounts.spotify.com/api/token", 200, TOKEN);
        let manager = TokenManager::new(transport, Some("id"), Some("secret"));

        manager.seed("cached", Duration::from_secs(31)).await;
        assert_eq!(manager.token().await.unwrap(), "cached");
        assert!(fake.requests().is_empty());

        manager.seed("cached", Duration::from_secs(29)).await;
        assert_eq!(manager.token().await.unwrap(), "fresh");
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_token_is_error() {
        let (fake, transport) = fake();
        fake.route(
            "accounts.spotify.com/api/token",
            200,
            r#"{"access_token": "", "expires_in": 3600}"#,
        );
        let manager = TokenManager::new(transport, Some("id"), Some("secret"));
        assert!(matches!(
            manager.token().await.unwrap_err(),
            FetchError::Upstream(_)
        ));
    }

    #[tokio::test]
    async fn failed_refresh_propagates() {
        let (fake, transport) = fake();
        fake.route("accounts.spotify.com/api/token", 401, r#"{"error": "invalid_client"}"#);
        let manager = TokenManager::new(transport, Some("id"), Some("secret"));
        assert!(matches!(
            manager.token().await.unwrap_err(),
            FetchError::Status { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_callers_share_refresh() {
        let _ = simple_logger::init_with_env();
        let fake = Arc::new(crate::http::testing::FakeTransport::with_delay(
            Duration::from_millis(20),
        ));
        fake.route("accounts.spotify.com/api/token", 200, TOKEN);
        let manager = Arc::new(TokenManager::new(
            Arc::clone(&fake) as Arc<dyn Transport>,
            Some("id"),
            Some("secret"),
        ));
        let tokens = futures::future::join_all((0..5).map(|_| manager.token())).await;
        assert!(tokens.iter().all(|t| t.as_deref().ok() == Some("fresh")));
        assert_eq!(fake.requests().len(), 1);
    }
}
