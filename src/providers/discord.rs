use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::client::OAuth2Client;
use crate::config::{DISCORD_SCOPES, DiscordConfig};
use crate::error::Error;
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::request::USER_AGENT;

const USER_ENDPOINT: &str = "users/@me";
const GUILD_MEMBER_ENDPOINT: &str = "guilds/members";

/// Discord account behind an access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// What the guild-member PUT did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberUpsert {
    /// 201: the user joined the guild.
    Added,
    /// 204 (or any other 2xx): the user was already a member.
    AlreadyMember,
}

/// OAuth 2.0 and bot client for [Discord](https://discord.com/developers/docs/topics/oauth2).
///
/// The OAuth leg requests `identify` and `guilds.join`; the bot token then
/// uses the user's access token to add them to the configured guild.
///
/// # Setup
///
/// 1. Create an application in the [Discord Developer Portal](https://discord.com/developers/applications).
/// 2. Copy the **Client ID** and **Client Secret** into `DISCORD_CLIENT_ID` and `DISCORD_SECRET_ID`.
/// 3. Add the `DISCORD_REDIRECT_URI` (default `{REDIRECT_URI}discord`) under **OAuth2 > Redirects**.
/// 4. Add a bot, invite it to the guild with the **Manage Nicknames** and
///    **Create Instant Invite** permissions, and set `DISCORD_BOT_TOKEN` and `DISCORD_GUILD_ID`.
///
/// # Scopes
///
/// | Scope | Description |
/// |-------|-------------|
/// | `identify` | Read the user's id and username |
/// | `guilds.join` | Let the bot add the user to a guild |
///
/// # Example
///
/// ```rust,no_run
/// use ivao_discord_link::{Config, Discord, ReqwestClient, generate_state};
///
/// # async fn run(code: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let http = ReqwestClient::new()?;
/// let discord = Discord::new(&config.discord);
///
/// let login_url = discord.authorization_url(&generate_state())?;
/// println!("send the user to {login_url}");
///
/// // In the callback:
/// let access_token = discord.validate_authorization_code(&http, code).await?;
/// let user = discord.get_user(&http, &access_token).await?;
/// discord
///     .add_guild_member(&http, &user.id, &access_token, "Jane Doe - 123456")
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Discord {
    client: OAuth2Client,
    bot_token: String,
    guild_id: String,
    base_url: String,
}

impl Discord {
    /// Client for the configured application, bot and guild.
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            client: OAuth2Client::new(
                &config.client_id,
                &config.client_secret,
                &config.redirect_uri,
            ),
            bot_token: config.bot_token.clone(),
            guild_id: config.guild_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Discord login URL carrying `state`.
    pub fn authorization_url(&self, state: &str) -> Result<Url, Error> {
        Ok(self.client.create_authorization_url(
            &format!("{}/oauth2/authorize", self.base_url),
            state,
            DISCORD_SCOPES,
        )?)
    }

    /// Exchanges the callback code and returns the user's access token.
    pub async fn validate_authorization_code(
        &self,
        http_client: &impl HttpClient,
        code: &str,
    ) -> Result<String, Error> {
        let response = self
            .client
            .validate_authorization_code(
                http_client,
                &format!("{}/api/oauth2/token", self.base_url),
                code,
            )
            .await
            .inspect_err(|err| warn!(error = %err, "Discord code exchange failed"))?;

        Ok(response.access_token()?.to_string())
    }

    /// Fetches `/users/@me` for the access token. Non-2xx answers are
    /// [`Error::DiscordStatus`].
    pub async fn get_user(
        &self,
        http_client: &impl HttpClient,
        access_token: &str,
    ) -> Result<DiscordUser, Error> {
        let request = HttpRequest::get(format!("{}/api/users/@me", self.base_url))
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);

        let response = send(http_client, request, USER_ENDPOINT).await?;
        if !response.is_success() {
            return Err(Error::DiscordStatus {
                endpoint: USER_ENDPOINT,
                status: response.status,
            });
        }

        serde_json::from_slice(&response.body).map_err(|_| Error::DiscordDecode {
            endpoint: USER_ENDPOINT,
            field: "id",
        })
    }

    /// Adds the user to the guild, or updates their nickname if they are
    /// already a member. Safe to repeat.
    pub async fn add_guild_member(
        &self,
        http_client: &impl HttpClient,
        user_id: &str,
        access_token: &str,
        nick: &str,
    ) -> Result<MemberUpsert, Error> {
        let body = serde_json::json!({
            "access_token": access_token,
            "nick": nick,
        });

        let request = HttpRequest {
            method: HttpMethod::Put,
            url: format!(
                "{}/api/guilds/{}/members/{}",
                self.base_url, self.guild_id, user_id
            ),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), format!("Bot {}", self.bot_token)),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
            ],
            body: body.to_string().into_bytes(),
        };

        let response = send(http_client, request, GUILD_MEMBER_ENDPOINT).await?;
        let outcome = match response.status {
            201 => MemberUpsert::Added,
            _ if response.is_success() => MemberUpsert::AlreadyMember,
            status => {
                warn!(status, guild_id = %self.guild_id, "Discord guild member upsert rejected");
                return Err(Error::DiscordStatus {
                    endpoint: GUILD_MEMBER_ENDPOINT,
                    status,
                });
            }
        };

        info!(?outcome, guild_id = %self.guild_id, user_id, "Discord guild member upserted");
        Ok(outcome)
    }
}

async fn send(
    http_client: &impl HttpClient,
    request: HttpRequest,
    endpoint: &'static str,
) -> Result<HttpResponse, Error> {
    http_client
        .send(request)
        .await
        .map_err(|source| Error::DiscordTransport { endpoint, source })
}
