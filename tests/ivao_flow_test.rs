mod common;

use common::mock_server::{MockDiscordServer, MockIvaoServer, find_cookie, flow};
use ivao_discord_link::{
    CREDENTIAL_COOKIE, ErrorKind, Outcome, ProviderRejection, RequestContext, TokenPair,
    VID_COOKIE, View, credential_cookie, parse_credential,
};

fn logged_in(tokens: &TokenPair) -> RequestContext {
    let cookie = credential_cookie(tokens).unwrap();
    RequestContext::new().with_cookie(CREDENTIAL_COOKIE, cookie.value)
}

#[tokio::test]
async fn fresh_visitor_sees_discovered_login_url() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    let flow = flow(&ivao, &discord);

    let outcome = flow.handle_home_request(&RequestContext::new()).await;

    let Outcome::Render { view, data, .. } = outcome else {
        panic!("expected the login page");
    };
    assert_eq!(view, View::Index);
    let login_url = data["ivao_url"].as_str().unwrap();
    assert!(login_url.starts_with(&format!("{}/authorize?", ivao.url())));
    assert!(login_url.contains("state=10"));
    assert!(login_url.contains("scope=profile+configuration+email"));
}

#[tokio::test]
async fn discovery_is_fetched_once_per_ttl_window() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    let flow = flow(&ivao, &discord);

    for _ in 0..3 {
        flow.handle_home_request(&RequestContext::new()).await;
    }
    assert_eq!(ivao.hits("/.well-known/openid-configuration").await, 1);

    flow.clear_discovery_cache();
    flow.handle_home_request(&RequestContext::new()).await;
    assert_eq!(ivao.hits("/.well-known/openid-configuration").await, 2);
}

#[tokio::test]
async fn unreachable_discovery_is_service_unavailable() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    let mut config = common::mock_server::config(&ivao, &discord);
    config.ivao.openid_url = format!("{}/missing", ivao.url());
    let flow = ivao_discord_link::AuthFlow::new(
        config,
        ivao_discord_link::ReqwestClient::new().unwrap(),
        ivao_discord_link::MemoryUserStore::new(),
        ivao_discord_link::StaticMaintenanceFlag::new(false),
    );

    let outcome = flow.handle_home_request(&RequestContext::new()).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ServiceUnavailable));
}

#[tokio::test]
async fn callback_code_becomes_credential_cookie() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    ivao.mock_code_exchange("at-1", "rt-1").await;
    let flow = flow(&ivao, &discord);

    let ctx = RequestContext::new()
        .with_query("code", "auth-code")
        .with_query("state", "10");
    let outcome = flow.handle_ivao_callback(&ctx).await;

    let Outcome::Redirect { location, cookies } = outcome else {
        panic!("expected a redirect");
    };
    assert_eq!(location, "https://xm.test/");
    assert_eq!(
        parse_credential(Some(&cookies[0].value)),
        Some(TokenPair::new("at-1", "rt-1"))
    );
    assert!(cookies[0].to_header_value().ends_with("Secure; HttpOnly"));
}

#[tokio::test]
async fn expired_token_is_refreshed_exactly_once() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    ivao.mock_userinfo(
        "at-old",
        401,
        serde_json::json!({ "description": ProviderRejection::EXPIRED }),
    )
    .await;
    ivao.mock_refresh("at-new", "rt-new", 1).await;
    ivao.mock_userinfo(
        "at-new",
        200,
        serde_json::json!({ "id": 123456, "firstName": "Jane", "lastName": "Doe" }),
    )
    .await;
    let flow = flow(&ivao, &discord);

    let outcome = flow
        .handle_home_request(&logged_in(&TokenPair::new("at-old", "rt-old")))
        .await;

    assert!(matches!(
        outcome,
        Outcome::Render { view: View::DiscordJoin, .. }
    ));
    assert_eq!(ivao.hits("/token").await, 1);
    assert_eq!(ivao.hits("/userinfo").await, 2);

    let credential = find_cookie(&outcome, CREDENTIAL_COOKIE).unwrap();
    assert_eq!(
        parse_credential(Some(&credential.value)),
        Some(TokenPair::new("at-new", "rt-new"))
    );
    assert_eq!(find_cookie(&outcome, VID_COOKIE).unwrap().value, "123456");

    let record = flow.store().get("123456").unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("rt-new"));
}

#[tokio::test]
async fn undecodable_token_logs_the_user_out() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    ivao.mock_userinfo(
        "garbled",
        401,
        serde_json::json!({ "description": ProviderRejection::UNDECODABLE }),
    )
    .await;
    ivao.mock_refresh("unused", "unused", 0).await;
    let flow = flow(&ivao, &discord);

    let outcome = flow
        .handle_home_request(&logged_in(&TokenPair::new("garbled", "rt")))
        .await;

    assert!(matches!(outcome, Outcome::Render { view: View::Index, .. }));
    assert!(find_cookie(&outcome, CREDENTIAL_COOKIE).unwrap().is_removal());
    assert_eq!(flow.store().writes(), 0);
}

#[tokio::test]
async fn maintenance_mode_skips_every_provider() {
    let ivao = MockIvaoServer::start().await;
    let discord = MockDiscordServer::start().await;
    let flow = ivao_discord_link::AuthFlow::new(
        common::mock_server::config(&ivao, &discord),
        ivao_discord_link::ReqwestClient::new().unwrap(),
        ivao_discord_link::MemoryUserStore::new(),
        ivao_discord_link::StaticMaintenanceFlag::new(true),
    );

    let outcome = flow
        .handle_home_request(&logged_in(&TokenPair::new("at", "rt")))
        .await;

    let Outcome::Render { view, data, .. } = outcome else {
        panic!("expected the maintenance page");
    };
    assert_eq!(view.name(), "maintenance");
    assert_eq!(data["division_name"], "XM");
    assert_eq!(ivao.hits("/.well-known/openid-configuration").await, 0);
}
