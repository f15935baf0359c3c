//! Client-held session credential.
//!
//! There is no server-side session table: the IVAO token pair travels as a
//! JSON blob in a secure, http-only cookie, and a few plain cookies carry
//! the identifiers the Discord leg needs.

use std::collections::HashMap;
use std::time::Duration;

use crate::tokens::TokenPair;

/// Cookie holding the JSON-encoded [`TokenPair`].
pub const CREDENTIAL_COOKIE: &str = "ivao_tokens";
/// IVAO subject id of the user, used to correlate the Discord callback.
pub const VID_COOKIE: &str = "vid";
pub const FIRSTNAME_COOKIE: &str = "firstname";
/// Correlation state minted with the Discord login URL.
pub const DISCORD_STATE_COOKIE: &str = "discord_state";

pub const CREDENTIAL_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 30);
pub const DISCORD_STATE_LIFETIME: Duration = Duration::from_secs(60 * 30);

/// A cookie the collaborator must set (or remove) on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
    pub path: &'static str,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    /// Site-wide, secure, http-only cookie.
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
            path: "/",
            secure: true,
            http_only: true,
        }
    }

    /// Expire the named cookie.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "", Duration::ZERO)
    }

    pub fn is_removal(&self) -> bool {
        self.max_age.is_zero()
    }

    /// Render as a `Set-Cookie` header value. The value is percent-encoded
    /// so the JSON credential survives cookie syntax.
    pub fn to_header_value(&self) -> String {
        let value: String = url::form_urlencoded::byte_serialize(self.value.as_bytes()).collect();
        let mut header = format!(
            "{}={}; Max-Age={}; Path={}",
            self.name,
            value,
            self.max_age.as_secs(),
            self.path
        );
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Encode the pair as the credential cookie.
pub fn credential_cookie(tokens: &TokenPair) -> Result<SetCookie, serde_json::Error> {
    let value = serde_json::to_string(tokens)?;
    Ok(SetCookie::new(CREDENTIAL_COOKIE, value, CREDENTIAL_LIFETIME))
}

/// Decode a credential cookie value. Anything that is not a JSON object with
/// string `access_token` and `refresh_token` normalizes to `None`.
pub fn parse_credential(raw: Option<&str>) -> Option<TokenPair> {
    let raw = raw?;
    serde_json::from_str(raw)
        .ok()
        .or_else(|| serde_json::from_str(&decode_cookie_value(raw)).ok())
}

fn decode_cookie_value(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Per-request inputs the collaborator extracts from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Non-empty query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Non-empty cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn credential(&self) -> Option<TokenPair> {
        parse_credential(self.cookie(CREDENTIAL_COOKIE))
    }
}
