type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to obtain a usable OpenID configuration document.
/// Every variant invalidates the discovery cache.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("OpenID configuration request failed: {0}")]
    Transport(BoxError),

    #[error("Unexpected HTTP status from discovery endpoint: {status}")]
    UnexpectedStatus { status: u16 },

    #[error("OpenID configuration is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("OpenID configuration is missing `{field}`")]
    MissingEndpoint { field: &'static str },

    #[error("Invalid discovery URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Authorization-code or refresh-token exchange failure.
#[derive(Debug, thiserror::Error)]
pub enum TokenExchangeError {
    /// Network / transport error from the HTTP client.
    #[error("Token request failed: {0}")]
    Transport(BoxError),

    /// The provider reported an `error` in the response body. IVAO does
    /// this on failed refreshes even when the HTTP status is 200.
    #[error("OAuth2 error: {code}")]
    Provider {
        code: String,
        description: Option<String>,
    },

    /// The body is not JSON.
    #[error("Undecodable token response (HTTP {status})")]
    UnexpectedBody { status: u16, body: String },

    /// A required field is missing from the token response JSON.
    #[error("Missing or invalid field: {field}")]
    MissingField { field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    #[error("Userinfo request failed: {0}")]
    Profile(BoxError),

    #[error("Userinfo response is not valid JSON (HTTP {status})")]
    ProfileDecode { status: u16 },

    #[error("Discord request to {endpoint} failed: {source}")]
    DiscordTransport {
        endpoint: &'static str,
        source: BoxError,
    },

    #[error("Discord returned HTTP {status} from {endpoint}")]
    DiscordStatus { endpoint: &'static str, status: u16 },

    #[error("Discord response from {endpoint} is missing `{field}`")]
    DiscordDecode {
        endpoint: &'static str,
        field: &'static str,
    },

    #[error("Failed to encode the session credential: {0}")]
    Credential(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
