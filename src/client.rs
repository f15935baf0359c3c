use url::Url;

use crate::error::TokenExchangeError;
use crate::http::HttpClient;
use crate::request::{create_form_request, send_token_request};
use crate::tokens::TokenResponse;

/// Confidential OAuth2 client. Both IVAO and Discord expect the client
/// credentials in the form body rather than a Basic auth header.
#[derive(Debug, Clone)]
pub struct OAuth2Client {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuth2Client {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Build an authorization URL with standard parameters:
    /// response_type=code, client_id, scope (space-joined), redirect_uri, state.
    pub fn create_authorization_url(
        &self,
        authorization_endpoint: &str,
        state: &str,
        scopes: &[&str],
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(authorization_endpoint)?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id);

        if !scopes.is_empty() {
            url.query_pairs_mut()
                .append_pair("scope", &scopes.join(" "));
        }

        url.query_pairs_mut()
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn validate_authorization_code(
        &self,
        http_client: &impl HttpClient,
        token_endpoint: &str,
        code: &str,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let request = create_form_request(
            token_endpoint,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
            ],
        );

        send_token_request(http_client, request).await
    }

    /// Refresh an access token.
    pub async fn refresh_access_token(
        &self,
        http_client: &impl HttpClient,
        token_endpoint: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let request = create_form_request(
            token_endpoint,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ],
        );

        send_token_request(http_client, request).await
    }
}
