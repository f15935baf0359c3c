use crate::error::TokenExchangeError;
use serde::{Deserialize, Serialize};

/// Raw token endpoint response with typed accessors.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    data: serde_json::Value,
}

impl TokenResponse {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn access_token(&self) -> Result<&str, TokenExchangeError> {
        self.data["access_token"]
            .as_str()
            .ok_or(TokenExchangeError::MissingField {
                field: "access_token",
            })
    }

    pub fn refresh_token(&self) -> Result<&str, TokenExchangeError> {
        self.data["refresh_token"]
            .as_str()
            .ok_or(TokenExchangeError::MissingField {
                field: "refresh_token",
            })
    }
}

/// The user's IVAO access/refresh pair. Created on code exchange and
/// replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl TryFrom<&TokenResponse> for TokenPair {
    type Error = TokenExchangeError;

    fn try_from(response: &TokenResponse) -> Result<Self, Self::Error> {
        Ok(Self::new(response.access_token()?, response.refresh_token()?))
    }
}
