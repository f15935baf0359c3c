//! Request handlers.
//!
//! The embedding web layer extracts a [`RequestContext`] from each request,
//! calls one handler, and turns the returned [`Outcome`] into a response.
//! Handlers never fail: every error is logged here and mapped to an
//! [`ErrorKind`].

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::enrollment::{DiscordCallback, Enrollment, GuildEnrollment, LinkState};
use crate::error::Error;
use crate::http::HttpClient;
use crate::identity::{IvaoIdentity, Profile, ProviderRejection, UserProfile};
use crate::providers::discord::Discord;
use crate::providers::ivao::Ivao;
use crate::session::{
    CREDENTIAL_COOKIE, CREDENTIAL_LIFETIME, DISCORD_STATE_COOKIE, DISCORD_STATE_LIFETIME,
    FIRSTNAME_COOKIE, RequestContext, SetCookie, VID_COOKIE, credential_cookie,
};
use crate::state::{generate_state, is_well_formed};
use crate::store::{MaintenanceFlag, TokenMetadata, UserRecord, UserStore};
use crate::tokens::TokenPair;

/// Template a [`Outcome::Render`] asks the web layer to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// IVAO login page, data `ivao_url`.
    Index,
    /// Discord login page for an identified IVAO user, data `discord_url`.
    DiscordJoin,
    /// Link confirmation, data `user`.
    Success,
    Maintenance,
}

impl View {
    /// Template name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::DiscordJoin => "discord-join",
            Self::Success => "success",
            Self::Maintenance => "maintenance",
        }
    }
}

/// Coarse failure class for the HTTP status of an [`Outcome::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An upstream provider failed or answered nonsense.
    ServiceUnavailable,
    /// Our own storage or encoding failed.
    Internal,
}

impl From<&Error> for ErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::Discovery(_)
            | Error::TokenExchange(_)
            | Error::Profile(_)
            | Error::ProfileDecode { .. }
            | Error::DiscordTransport { .. }
            | Error::DiscordStatus { .. }
            | Error::DiscordDecode { .. } => Self::ServiceUnavailable,
            Error::Credential(_) | Error::Store(_) | Error::Config(_) | Error::InvalidUrl(_) => {
                Self::Internal
            }
        }
    }
}

/// What a handler wants the web layer to answer.
///
/// Every variant carries cookies: they must be applied even on an error, so
/// a token pair refreshed before the failure is not lost.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `302` to `location`.
    Redirect {
        location: String,
        cookies: Vec<SetCookie>,
    },
    /// Draw `view` with `data`.
    Render {
        view: View,
        data: Value,
        cookies: Vec<SetCookie>,
    },
    Error {
        kind: ErrorKind,
        cookies: Vec<SetCookie>,
    },
}

impl Outcome {
    pub fn cookies(&self) -> &[SetCookie] {
        match self {
            Self::Redirect { cookies, .. }
            | Self::Render { cookies, .. }
            | Self::Error { cookies, .. } => cookies,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result of resolving the credential cookie against IVAO.
enum Resolution {
    Identity {
        profile: UserProfile,
        tokens: TokenPair,
    },
    LoggedOut(ProviderRejection),
}

/// Entry point of the linking flow: IVAO login, Discord login, guild
/// enrollment.
///
/// One `AuthFlow` is built at startup and shared by every request; it owns
/// the discovery cache.
///
/// # Example
///
/// ```rust,no_run
/// use ivao_discord_link::{
///     AuthFlow, MemoryUserStore, Outcome, ReqwestClient, RequestContext, StaticMaintenanceFlag,
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let flow = AuthFlow::from_env(
///     ReqwestClient::new()?,
///     MemoryUserStore::new(),
///     StaticMaintenanceFlag::new(false),
/// )?;
///
/// let ctx = RequestContext::new().with_cookie("ivao_tokens", "{}");
/// match flow.handle_home_request(&ctx).await {
///     Outcome::Render { view, .. } => println!("render {}", view.name()),
///     Outcome::Redirect { location, .. } => println!("redirect to {location}"),
///     Outcome::Error { kind, .. } => println!("fail with {kind:?}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct AuthFlow<H, S, M> {
    config: Config,
    http_client: H,
    ivao: Ivao,
    discord: Discord,
    store: S,
    maintenance: M,
}

impl<H, S, M> AuthFlow<H, S, M>
where
    H: HttpClient,
    S: UserStore,
    M: MaintenanceFlag,
{
    /// Build the flow and both provider clients from `config`.
    pub fn new(config: Config, http_client: H, store: S, maintenance: M) -> Self {
        let ivao = Ivao::new(&config.ivao);
        Self::with_ivao(config, http_client, ivao, store, maintenance)
    }

    /// Build the flow from environment variables, see [`Config::from_env`].
    pub fn from_env(http_client: H, store: S, maintenance: M) -> Result<Self, Error> {
        Ok(Self::new(Config::from_env()?, http_client, store, maintenance))
    }

    /// Build the flow from an arbitrary setting lookup.
    pub fn from_lookup<F>(lookup: F, http_client: H, store: S, maintenance: M) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::new(Config::from_lookup(lookup)?, http_client, store, maintenance))
    }

    /// Use a prepared IVAO client, e.g. one sharing a discovery cache.
    pub fn with_ivao(config: Config, http_client: H, ivao: Ivao, store: S, maintenance: M) -> Self {
        let discord = Discord::new(&config.discord);
        Self {
            config,
            http_client,
            ivao,
            discord,
            store,
            maintenance,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drop the cached OpenID configuration; the next request refetches it.
    pub fn clear_discovery_cache(&self) {
        self.ivao.discovery().clear();
        info!("Discovery cache cleared on request");
    }

    /// `GET /`: maintenance page, IVAO login, or the Discord join page.
    pub async fn handle_home_request(&self, ctx: &RequestContext) -> Outcome {
        if self.in_maintenance().await {
            return self.render(View::Maintenance, json!({}), Vec::new());
        }

        let Some(tokens) = ctx.credential() else {
            if ctx.cookie(CREDENTIAL_COOKIE).is_some() {
                debug!("Ignoring malformed credential cookie");
            }
            return self.login_page(Vec::new()).await;
        };

        // Survives every outcome once a refresh has rotated the pair.
        let mut cookies = Vec::new();
        match self.resolve(tokens, &mut cookies).await {
            Ok(Resolution::LoggedOut(rejection)) => {
                info!(reason = rejection.description(), "IVAO session ended");
                self.login_page(vec![SetCookie::removal(CREDENTIAL_COOKIE)])
                    .await
            }
            Ok(Resolution::Identity { profile, tokens }) => {
                match self.join_page(ctx, &profile, &tokens, &mut cookies).await {
                    Ok(data) => self.render(View::DiscordJoin, data, cookies),
                    Err(err) => self.fail_with(err, cookies),
                }
            }
            Err(err) => self.fail_with(err, cookies),
        }
    }

    /// IVAO redirect target: trade the code for a credential and go home.
    pub async fn handle_ivao_callback(&self, ctx: &RequestContext) -> Outcome {
        let Some(code) = ctx.query("code") else {
            debug!("IVAO callback without code");
            return self.redirect_home(Vec::new());
        };
        if !ctx.query("state").is_some_and(|state| self.ivao.is_own_state(state)) {
            warn!("IVAO callback with unexpected state");
            return self.redirect_home(Vec::new());
        }

        let tokens = match self
            .ivao
            .validate_authorization_code(&self.http_client, code)
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => return self.fail(err),
        };

        match credential_cookie(&tokens) {
            Ok(cookie) => self.redirect_home(vec![cookie]),
            Err(err) => self.fail(Error::Credential(err)),
        }
    }

    /// Discord redirect target: link the account and enroll it in the guild.
    pub async fn handle_discord_callback(&self, ctx: &RequestContext) -> Outcome {
        let callback = DiscordCallback {
            code: ctx.query("code"),
            state: ctx.query("state"),
            expected_state: ctx.cookie(DISCORD_STATE_COOKIE),
            vid: ctx.cookie(VID_COOKIE),
        };

        let enrollment = GuildEnrollment::new(&self.discord, &self.http_client, &self.store)
            .run(callback)
            .await;

        match enrollment {
            Ok(Enrollment {
                state: LinkState::Linked { .. },
                ..
            }) => Outcome::Redirect {
                location: self.success_url(),
                cookies: vec![SetCookie::removal(DISCORD_STATE_COOKIE)],
            },
            Ok(_) => self.redirect_home(Vec::new()),
            Err(err) => self.fail(err),
        }
    }

    /// `GET /success`: confirmation page for the user named by the `vid`
    /// cookie.
    pub async fn handle_success_request(&self, ctx: &RequestContext) -> Outcome {
        let Some(vid) = ctx.cookie(VID_COOKIE) else {
            return self.redirect_home(Vec::new());
        };

        match self.store.find_by_external_id(vid).await {
            Ok(Some(record)) => {
                let user = user_data(&record);
                self.render(View::Success, json!({ "user": user }), Vec::new())
            }
            Ok(None) => self.redirect_home(Vec::new()),
            Err(err) => self.fail(err.into()),
        }
    }

    async fn in_maintenance(&self) -> bool {
        match self.maintenance.is_enabled().await {
            Ok(enabled) => enabled,
            Err(err) => {
                warn!(error = %err, "Maintenance check failed, assuming service is up");
                false
            }
        }
    }

    /// Fetch the profile; an expired token gets one refresh and one retry.
    /// The refreshed credential cookie is pushed to `cookies` before the
    /// retry.
    async fn resolve(
        &self,
        tokens: TokenPair,
        cookies: &mut Vec<SetCookie>,
    ) -> Result<Resolution, Error> {
        let rejection = match self.ivao.get_profile(&self.http_client, &tokens).await? {
            Profile::Identity(profile) => return Ok(Resolution::Identity { profile, tokens }),
            Profile::Rejected(rejection) => rejection,
        };

        if !rejection.should_refresh() {
            return Ok(Resolution::LoggedOut(rejection));
        }

        info!("IVAO access token expired, refreshing");
        let tokens = self
            .ivao
            .refresh_access_token(&self.http_client, &tokens.refresh_token)
            .await?;
        cookies.push(credential_cookie(&tokens).map_err(Error::Credential)?);

        match self.ivao.get_profile(&self.http_client, &tokens).await? {
            Profile::Identity(profile) => Ok(Resolution::Identity { profile, tokens }),
            Profile::Rejected(rejection) => Ok(Resolution::LoggedOut(rejection)),
        }
    }

    async fn login_page(&self, cookies: Vec<SetCookie>) -> Outcome {
        match self.ivao.authorization_url(&self.http_client).await {
            Ok(url) => self.render(View::Index, json!({ "ivao_url": url.as_str() }), cookies),
            Err(err) => self.fail_with(err, cookies),
        }
    }

    /// Store the user and build the Discord join page data. A Discord state
    /// already held by the browser is kept, so a login URL shown in another
    /// tab stays valid.
    async fn join_page(
        &self,
        ctx: &RequestContext,
        profile: &UserProfile,
        tokens: &TokenPair,
        cookies: &mut Vec<SetCookie>,
    ) -> Result<Value, Error> {
        match profile.identity() {
            Some(identity) => {
                self.remember(&identity, tokens).await?;
                cookies.push(SetCookie::new(VID_COOKIE, &identity.vid, CREDENTIAL_LIFETIME));
                cookies.push(SetCookie::new(
                    FIRSTNAME_COOKIE,
                    &identity.first_name,
                    CREDENTIAL_LIFETIME,
                ));
            }
            None => warn!("IVAO profile has no VID, user not stored"),
        }

        let state = match ctx.cookie(DISCORD_STATE_COOKIE) {
            Some(state) if is_well_formed(state) => state.to_string(),
            _ => generate_state(),
        };
        let discord_url = self.discord.authorization_url(&state)?;
        // Reissued with a fresh lifetime.
        cookies.push(SetCookie::new(
            DISCORD_STATE_COOKIE,
            state,
            DISCORD_STATE_LIFETIME,
        ));

        Ok(json!({
            "discord_url": discord_url.as_str(),
            "first_name": profile.first_name(),
        }))
    }

    async fn remember(&self, identity: &IvaoIdentity, tokens: &TokenPair) -> Result<(), Error> {
        let record = self
            .store
            .upsert(identity, &TokenMetadata::now(&tokens.refresh_token))
            .await?;
        debug!(vid = %record.vid, state = ?LinkState::of(Some(&record)), "IVAO user stored");
        Ok(())
    }

    fn render(&self, view: View, extra: Value, cookies: Vec<SetCookie>) -> Outcome {
        let site = &self.config.site;
        let mut data = json!({
            "division_name": site.division_name,
            "division_country": site.division_country,
            "division_url": site.division_url,
        });
        if let (Value::Object(data), Value::Object(extra)) = (&mut data, extra) {
            data.extend(extra);
        }
        Outcome::Render {
            view,
            data,
            cookies,
        }
    }

    fn redirect_home(&self, cookies: Vec<SetCookie>) -> Outcome {
        Outcome::Redirect {
            location: self.config.site.home_url.clone(),
            cookies,
        }
    }

    fn success_url(&self) -> String {
        format!("{}/success", self.config.site.home_url.trim_end_matches('/'))
    }

    fn fail(&self, err: Error) -> Outcome {
        self.fail_with(err, Vec::new())
    }

    fn fail_with(&self, err: Error, cookies: Vec<SetCookie>) -> Outcome {
        let kind = ErrorKind::from(&err);
        error!(error = %err, ?kind, "Request failed");
        Outcome::Error { kind, cookies }
    }
}

fn user_data(record: &UserRecord) -> Value {
    json!({
        "vid": record.vid,
        "first_name": record.first_name,
        "last_name": record.last_name,
        "full_name": record.full_name(),
        "discord_user_id": record.discord_user_id,
        "verified": record.verified,
    })
}
