use std::collections::HashMap;

use ivao_discord_link::{
    AuthFlow, Config, MemoryUserStore, Outcome, ReqwestClient, SetCookie, StaticMaintenanceFlag,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GUILD_ID: &str = "9000";

pub type TestFlow = AuthFlow<ReqwestClient, MemoryUserStore, StaticMaintenanceFlag>;

/// Mock IVAO identity provider built on `wiremock`: discovery document,
/// token endpoint and userinfo endpoint on one server.
pub struct MockIvaoServer {
    server: MockServer,
}

impl MockIvaoServer {
    /// Start on a random port with the discovery document mounted.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let uri = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": uri,
                "authorization_endpoint": format!("{uri}/authorize"),
                "token_endpoint": format!("{uri}/token"),
                "userinfo_endpoint": format!("{uri}/userinfo"),
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn openid_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.url())
    }

    /// `POST /token` for the authorization-code grant.
    pub async fn mock_code_exchange(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(&self.server)
            .await;
    }

    /// `POST /token` for the refresh grant, expected exactly `times` times.
    pub async fn mock_refresh(&self, access_token: &str, refresh_token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// `GET /userinfo` answering `body` to the given bearer token.
    pub async fn mock_userinfo(&self, access_token: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received on `request_path`.
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

/// Mock Discord API: OAuth token, current user and guild-member PUT.
pub struct MockDiscordServer {
    server: MockServer,
}

impl MockDiscordServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub async fn mock_token(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "scope": "identify guilds.join",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_user(&self, access_token: &str, user_id: &str) {
        Mock::given(method("GET"))
            .and(path("/api/users/@me"))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": user_id,
                "username": "jane",
            })))
            .mount(&self.server)
            .await;
    }

    /// Guild-member PUT answering `status`, expected exactly `times` times.
    pub async fn mock_add_member(&self, user_id: &str, status: u16, times: u64) {
        Mock::given(method("PUT"))
            .and(path(format!("/api/guilds/{GUILD_ID}/members/{user_id}")))
            .and(header("authorization", "Bot bot-token"))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// JSON body of the last guild-member PUT.
    pub async fn last_member_body(&self) -> serde_json::Value {
        let requests = self
            .server
            .received_requests()
            .await
            .expect("request recording enabled");
        let put = requests
            .iter()
            .rev()
            .find(|r| r.method.as_str() == "PUT")
            .expect("expected a guild-member PUT");
        serde_json::from_slice(&put.body).expect("body should be JSON")
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .len()
    }
}

pub fn config(ivao: &MockIvaoServer, discord: &MockDiscordServer) -> Config {
    let vars = HashMap::from([
        ("REDIRECT_URI", "https://xm.test/".to_string()),
        ("OAUTH_CLIENT_ID", "ivao-id".to_string()),
        ("OAUTH_CLIENT_SECRET", "ivao-secret".to_string()),
        ("OPENID_URL", ivao.openid_url()),
        ("DISCORD_CLIENT_ID", "discord-id".to_string()),
        ("DISCORD_SECRET_ID", "discord-secret".to_string()),
        ("DISCORD_BOT_TOKEN", "bot-token".to_string()),
        ("DISCORD_GUILD_ID", GUILD_ID.to_string()),
        ("DISCORD_BASE_URL", discord.url()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).expect("complete test configuration")
}

pub fn flow(ivao: &MockIvaoServer, discord: &MockDiscordServer) -> TestFlow {
    AuthFlow::new(
        config(ivao, discord),
        ReqwestClient::new().expect("reqwest client"),
        MemoryUserStore::new(),
        StaticMaintenanceFlag::new(false),
    )
}

pub fn find_cookie<'a>(outcome: &'a Outcome, name: &str) -> Option<&'a SetCookie> {
    outcome.cookies().iter().find(|c| c.name == name)
}
