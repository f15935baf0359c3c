use tracing::{debug, info, warn};
use url::Url;

use crate::client::OAuth2Client;
use crate::config::{IVAO_SCOPES, IvaoConfig};
use crate::discovery::DiscoveryCache;
use crate::error::Error;
use crate::http::{HttpClient, HttpRequest};
use crate::identity::Profile;
use crate::request::USER_AGENT;
use crate::tokens::TokenPair;

/// OAuth 2.0 client for the [IVAO](https://wiki.ivao.aero/en/home/devops/api/oauth)
/// identity provider.
///
/// Endpoints are not hard-coded: every operation resolves them through the
/// [`DiscoveryCache`], which re-validates the OpenID configuration at most
/// once per TTL window.
///
/// IVAO identifies the callback with a fixed `state` registered for the
/// application rather than a per-request nonce, so `state` here is
/// configuration.
///
/// # Setup
///
/// 1. Register an OAuth application with the IVAO division's developer portal.
/// 2. Set `OAUTH_CLIENT_ID`, `OAUTH_CLIENT_SECRET` and `OAUTH_STATE` to the
///    values it was registered with.
/// 3. Set `REDIRECT_URI` to the registered callback; it is also the home page.
///
/// # Scopes
///
/// | Scope | Description |
/// |-------|-------------|
/// | `profile` | VID, first and last name |
/// | `configuration` | Division and rating details |
/// | `email` | Account email |
///
/// # Example
///
/// ```rust,no_run
/// use ivao_discord_link::{Config, Ivao, Profile, ReqwestClient};
///
/// # async fn run(code: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let http = ReqwestClient::new()?;
/// let ivao = Ivao::new(&config.ivao);
///
/// let login_url = ivao.authorization_url(&http).await?;
/// println!("send the user to {login_url}");
///
/// // In the callback:
/// let tokens = ivao.validate_authorization_code(&http, code).await?;
/// if let Profile::Identity(profile) = ivao.get_profile(&http, &tokens).await? {
///     println!("VID {:?}", profile.vid());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Ivao {
    client: OAuth2Client,
    discovery: DiscoveryCache,
    state: String,
}

impl Ivao {
    /// Client with its own discovery cache on `config.openid_url`.
    pub fn new(config: &IvaoConfig) -> Self {
        Self::with_discovery(config, DiscoveryCache::new(&config.openid_url))
    }

    pub fn with_discovery(config: &IvaoConfig, discovery: DiscoveryCache) -> Self {
        Self {
            client: OAuth2Client::new(
                &config.client_id,
                &config.client_secret,
                &config.redirect_uri,
            ),
            discovery,
            state: config.state.clone(),
        }
    }

    /// The OpenID configuration cache behind every endpoint lookup.
    pub fn discovery(&self) -> &DiscoveryCache {
        &self.discovery
    }

    /// Whether a callback `state` is the one this application sends.
    pub fn is_own_state(&self, state: &str) -> bool {
        state == self.state
    }

    /// Builds the IVAO login URL on the discovered authorization endpoint.
    pub async fn authorization_url(&self, http_client: &impl HttpClient) -> Result<Url, Error> {
        let config = self.discovery.get_config(http_client).await?;
        Ok(self.client.create_authorization_url(
            &config.authorization_endpoint,
            &self.state,
            IVAO_SCOPES,
        )?)
    }

    /// Exchanges an authorization code for a token pair.
    pub async fn validate_authorization_code(
        &self,
        http_client: &impl HttpClient,
        code: &str,
    ) -> Result<TokenPair, Error> {
        let config = self.discovery.get_config(http_client).await?;
        let response = self
            .client
            .validate_authorization_code(http_client, &config.token_endpoint, code)
            .await
            .inspect_err(|err| warn!(error = %err, "IVAO code exchange failed"))?;

        let tokens = TokenPair::try_from(&response)?;
        info!("IVAO authorization code exchanged");
        Ok(tokens)
    }

    /// Trades a refresh token for a new pair. An in-body `error` fails the
    /// refresh even when the HTTP status is 200.
    pub async fn refresh_access_token(
        &self,
        http_client: &impl HttpClient,
        refresh_token: &str,
    ) -> Result<TokenPair, Error> {
        let config = self.discovery.get_config(http_client).await?;
        let response = self
            .client
            .refresh_access_token(http_client, &config.token_endpoint, refresh_token)
            .await
            .inspect_err(|err| warn!(error = %err, "IVAO token refresh failed"))?;

        let tokens = TokenPair::try_from(&response)?;
        info!("IVAO access token refreshed");
        Ok(tokens)
    }

    /// Calls the userinfo endpoint with the access token and classifies the
    /// answer. The body is interpreted whatever the status, since IVAO
    /// reports token problems in-body.
    pub async fn get_profile(
        &self,
        http_client: &impl HttpClient,
        tokens: &TokenPair,
    ) -> Result<Profile, Error> {
        let config = self.discovery.get_config(http_client).await?;
        let request = HttpRequest::get(&config.userinfo_endpoint)
            .header("Authorization", format!("Bearer {}", tokens.access_token))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);

        let response = http_client.send(request).await.map_err(Error::Profile)?;
        let data: serde_json::Value = serde_json::from_slice(&response.body).map_err(|_| {
            Error::ProfileDecode {
                status: response.status,
            }
        })?;

        let profile = Profile::classify(data);
        if let Profile::Rejected(rejection) = &profile {
            debug!(?rejection, status = response.status, "IVAO rejected the access token");
        }
        Ok(profile)
    }
}
