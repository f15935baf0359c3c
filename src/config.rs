//! Process-wide configuration.
//!
//! Built once at startup and shared read-only by every component.

use std::env;

pub const DEFAULT_OPENID_URL: &str = "https://api.ivao.aero/.well-known/openid-configuration";
pub const DEFAULT_DISCORD_BASE_URL: &str = "https://discord.com";

/// Scopes requested from IVAO.
pub const IVAO_SCOPES: &[&str] = &["profile", "configuration", "email"];

/// Scopes requested from Discord. `guilds.join` is what allows the bot to
/// add the user to the guild with their access token.
pub const DISCORD_SCOPES: &[&str] = &["identify", "guilds.join"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct IvaoConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Fixed `state` value registered with the IVAO application.
    pub state: String,
    pub openid_url: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    pub bot_token: String,
    pub guild_id: String,
    pub redirect_uri: String,
    pub base_url: String,
}

/// Division details shown on every page.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub division_name: String,
    pub division_country: String,
    pub division_url: String,
    /// Where the browser lands after a callback.
    pub home_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ivao: IvaoConfig,
    pub discord: DiscordConfig,
    pub site: SiteConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let redirect_uri = require("REDIRECT_URI")?;
        let discord_redirect_uri = get("DISCORD_REDIRECT_URI")
            .unwrap_or_else(|| format!("{}discord", ensure_trailing_slash(&redirect_uri)));

        Ok(Self {
            ivao: IvaoConfig {
                client_id: require("OAUTH_CLIENT_ID")?,
                client_secret: require("OAUTH_CLIENT_SECRET")?,
                state: get("OAUTH_STATE").unwrap_or_else(|| "10".to_string()),
                openid_url: get("OPENID_URL").unwrap_or_else(|| DEFAULT_OPENID_URL.to_string()),
                redirect_uri: redirect_uri.clone(),
            },
            discord: DiscordConfig {
                client_id: require("DISCORD_CLIENT_ID")?,
                client_secret: require("DISCORD_SECRET_ID")?,
                bot_token: require("DISCORD_BOT_TOKEN")?,
                guild_id: require("DISCORD_GUILD_ID")?,
                redirect_uri: discord_redirect_uri,
                base_url: get("DISCORD_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DISCORD_BASE_URL.to_string()),
            },
            site: SiteConfig {
                division_name: get("DIV").unwrap_or_else(|| "XM".to_string()),
                division_country: get("COUNTRY").unwrap_or_else(|| "Middle East".to_string()),
                division_url: get("DIVISION_URL")
                    .unwrap_or_else(|| "https://xm.ivao.aero".to_string()),
                home_url: redirect_uri,
            },
        })
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
