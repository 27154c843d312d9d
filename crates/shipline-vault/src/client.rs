//! HCP Vault Secrets client.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use shipline_core::secret::{SecretRecord, SecretStore, VaultTarget};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{VaultError, VaultResult};

pub const DEFAULT_AUTH_URL: &str = "https://auth.hashicorp.com";
pub const DEFAULT_API_URL: &str = "https://api.cloud.hashicorp.com";
pub const TOKEN_AUDIENCE: &str = "https://api.hashicorp.cloud";
pub const CLIENT_ID_ENV: &str = "HCP_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "HCP_CLIENT_SECRET";

const SECRETS_API_VERSION: &str = "2023-06-13";
const MAX_PAGES: usize = 100;

/// Service principal credentials.
#[derive(Clone)]
pub struct HcpCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl HcpCredentials {
    /// Read `HCP_CLIENT_ID` and `HCP_CLIENT_SECRET`.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VaultResult<Self> {
        let read = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| VaultError::MissingEnv(name.to_string()))
        };
        Ok(Self {
            client_id: read(CLIENT_ID_ENV)?,
            client_secret: read(CLIENT_SECRET_ENV)?,
        })
    }
}

impl fmt::Debug for HcpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcpCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct HcpConfig {
    pub credentials: HcpCredentials,
    /// Base URL of the OAuth server; the token endpoint is `{auth_url}/oauth/token`.
    pub auth_url: String,
    /// Base URL of the HCP API.
    pub api_url: String,
    pub timeout: Duration,
}

impl HcpConfig {
    pub fn new(credentials: HcpCredentials) -> Self {
        Self {
            credentials,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> VaultResult<Self> {
        Ok(Self::new(HcpCredentials::from_env()?))
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

/// Bearer token for the HCP API.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    audience: &'a str,
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct OpenSecretsResponse {
    #[serde(default)]
    secrets: Vec<OpenSecret>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct OpenSecret {
    name: String,
    #[serde(default, alias = "static_version")]
    version: Option<SecretVersion>,
}

#[derive(Deserialize)]
struct SecretVersion {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Client for HCP Vault Secrets.
pub struct HcpVaultClient {
    http: reqwest::Client,
    config: HcpConfig,
}

impl HcpVaultClient {
    pub fn new(config: HcpConfig) -> VaultResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Create a client for the public HCP endpoints using credentials from
    /// the environment.
    pub fn from_env() -> VaultResult<Self> {
        Self::new(HcpConfig::from_env()?)
    }

    /// Exchange the service principal credentials for an access token.
    #[instrument(skip(self))]
    pub async fn fetch_token(&self) -> VaultResult<AccessToken> {
        let credentials = &self.config.credentials;
        let body = TokenRequest {
            audience: TOKEN_AUDIENCE,
            grant_type: "client_credentials",
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
        };

        let url = format!("{}/oauth/token", self.config.auth_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(VaultError::status("token endpoint", status, &text));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| VaultError::Parse {
                endpoint: "token endpoint",
                message: e.to_string(),
            })?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                debug!("Obtained HCP access token");
                Ok(AccessToken(token))
            }
            _ => Err(VaultError::EmptyToken),
        }
    }

    /// List every secret of the target application with its current value.
    #[instrument(skip(self, token), fields(organization = %target.organization, project = %target.project, app = %target.app))]
    pub async fn open_secrets(
        &self,
        token: &AccessToken,
        target: &VaultTarget,
    ) -> VaultResult<Vec<SecretRecord>> {
        let url = self.open_secrets_url(target);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut request = self
                .http
                .get(&url)
                .header(AUTHORIZATION, format!("Bearer {}", token.secret()));
            if let Some(next) = &page_token {
                request = request.query(&[("pagination.next_page_token", next.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(VaultError::status("secret listing", status, &text));
            }

            let parsed: OpenSecretsResponse =
                serde_json::from_str(&text).map_err(|e| VaultError::Parse {
                    endpoint: "secret listing",
                    message: e.to_string(),
                })?;

            for secret in parsed.secrets {
                let value = secret.version.and_then(|v| v.value).unwrap_or_else(|| {
                    warn!(name = %secret.name, "Secret has no readable value, using empty string");
                    String::new()
                });
                records.push(SecretRecord::new(secret.name, value));
            }

            page_token = parsed
                .pagination
                .and_then(|p| p.next_page_token)
                .filter(|t| !t.is_empty());
            if page_token.is_none() {
                debug!(pages = page + 1, "Secret listing complete");
                return Ok(records);
            }
        }

        Err(VaultError::TooManyPages(MAX_PAGES))
    }

    /// Fetch a token, then list the target's secrets.
    pub async fn load_secrets(&self, target: &VaultTarget) -> VaultResult<Vec<SecretRecord>> {
        let token = self.fetch_token().await?;
        let records = self.open_secrets(&token, target).await?;
        info!(count = records.len(), app = %target.app, "Loaded secrets from HCP Vault Secrets");
        Ok(records)
    }

    fn open_secrets_url(&self, target: &VaultTarget) -> String {
        format!(
            "{}/secrets/{}/organizations/{}/projects/{}/apps/{}/open",
            self.config.api_url.trim_end_matches('/'),
            SECRETS_API_VERSION,
            urlencoding::encode(&target.organization),
            urlencoding::encode(&target.project),
            urlencoding::encode(&target.app),
        )
    }
}

#[async_trait]
impl SecretStore for HcpVaultClient {
    fn name(&self) -> &'static str {
        "hcp-vault-secrets"
    }

    async fn load(&self, target: &VaultTarget) -> shipline_core::Result<Vec<SecretRecord>> {
        Ok(self.load_secrets(target).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shipline_core::secret::SecretSet;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING_PATH: &str = "/secrets/2023-06-13/organizations/org-1/projects/proj-1/apps/dagger-env/open";

    fn target() -> VaultTarget {
        VaultTarget {
            organization: "org-1".to_string(),
            project: "proj-1".to_string(),
            app: "dagger-env".to_string(),
        }
    }

    fn client(server: &MockServer) -> HcpVaultClient {
        let credentials = HcpCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        };
        let config = HcpConfig::new(credentials)
            .with_auth_url(server.uri())
            .with_api_url(server.uri());
        HcpVaultClient::new(config).unwrap()
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_json(json!({
                "audience": "https://api.hashicorp.cloud",
                "grant_type": "client_credentials",
                "client_id": "client-id",
                "client_secret": "client-secret",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-123",
                "expires_in": 3599,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_load_returns_one_record_per_secret() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [
                    { "name": "REGISTRY_PASSWORD", "version": { "version": "1", "value": "pw" } },
                    { "name": "COSIGN_KEY", "version": { "version": "3", "value": "a2V5" } },
                    { "name": "SONAR_TOKEN", "version": { "version": "1", "value": "squ_1" } },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server).load(&target()).await.unwrap();
        assert_eq!(records.len(), 3);

        let set: SecretSet = records.into_iter().collect();
        assert_eq!(set.get("REGISTRY_PASSWORD"), Some("pw"));
        assert_eq!(set.get("COSIGN_KEY"), Some("a2V5"));
        assert_eq!(set.get("SONAR_TOKEN"), Some("squ_1"));
    }

    #[tokio::test]
    async fn test_listing_follows_pagination() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .and(query_param_is_missing("pagination.next_page_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [ { "name": "A", "version": { "value": "1" } } ],
                "pagination": { "next_page_token": "page-2", "previous_page_token": "" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .and(query_param("pagination.next_page_token", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [ { "name": "B", "static_version": { "value": "2" } } ],
                "pagination": { "next_page_token": "" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server).load_secrets(&target()).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_secret_without_value_maps_to_empty_string() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secrets": [
                    { "name": "A", "version": { "value": "1" } },
                    { "name": "B", "version": { "version": "2" } },
                    { "name": "C" },
                ]
            })))
            .mount(&server)
            .await;

        let records = client(&server).load_secrets(&target()).await.unwrap();
        assert_eq!(records.len(), 3);

        let set: SecretSet = records.into_iter().collect();
        assert_eq!(set.get("A"), Some("1"));
        assert_eq!(set.get("B"), Some(""));
        assert_eq!(set.get("C"), Some(""));
    }

    #[test]
    fn test_default_auth_url_is_a_base_url() {
        let config = HcpConfig::new(HcpCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        });
        assert_eq!(config.auth_url, "https://auth.hashicorp.com");
        assert_eq!(config.api_url, "https://api.cloud.hashicorp.com");
    }

    #[tokio::test]
    async fn test_empty_listing_is_ok() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let records = client(&server).load_secrets(&target()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_credentials_skip_listing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("access_denied"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "secrets": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).load_secrets(&target()).await.unwrap_err();
        assert!(matches!(err, VaultError::Status { status: 401, .. }));

        let core: shipline_core::Error = err.into();
        assert!(matches!(core, shipline_core::Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_empty_token_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "" })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, VaultError::EmptyToken));
    }

    #[tokio::test]
    async fn test_malformed_token_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, VaultError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_listing_server_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).load_secrets(&target()).await.unwrap_err();
        assert!(matches!(err, VaultError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_listing() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"secrets\": 42}"))
            .mount(&server)
            .await;

        let err = client(&server).load_secrets(&target()).await.unwrap_err();
        assert!(matches!(err, VaultError::Parse { .. }));
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = HcpCredentials::from_lookup(|name| match name {
            "HCP_CLIENT_ID" => Some("id".to_string()),
            "HCP_CLIENT_SECRET" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.client_id, "id");
        assert!(!format!("{:?}", creds).contains("secret\""));

        let missing = HcpCredentials::from_lookup(|name| match name {
            "HCP_CLIENT_ID" => Some("id".to_string()),
            _ => None,
        });
        assert!(matches!(
            missing,
            Err(VaultError::MissingEnv(name)) if name == "HCP_CLIENT_SECRET"
        ));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken("tok-123".to_string());
        assert!(!format!("{:?}", token).contains("tok-123"));
    }
}
