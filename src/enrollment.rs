//! Discord linking and guild enrollment.
//!
//! ```text
//! PendingIvao --(IVAO identity stored)--> PendingDiscord
//! PendingDiscord --(callback: code + state + known vid)--> Linked
//! PendingDiscord --(any guard missing)--> Abandoned
//! ```
//!
//! `Abandoned` is a routing outcome, not an error: nothing is written and
//! the browser goes back home.

use tracing::{info, warn};

use crate::error::Error;
use crate::http::HttpClient;
use crate::providers::discord::{Discord, MemberUpsert};
use crate::state::states_match;
use crate::store::{UserRecord, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    MissingCode,
    StateMismatch,
    MissingIdentity,
    UnknownIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    PendingIvao,
    PendingDiscord { vid: String },
    Linked { vid: String, discord_user_id: String },
    Abandoned(AbandonReason),
}

impl LinkState {
    /// Where a stored user currently stands.
    pub fn of(record: Option<&UserRecord>) -> Self {
        match record {
            None => Self::PendingIvao,
            Some(UserRecord {
                vid,
                discord_user_id: Some(discord_user_id),
                ..
            }) => Self::Linked {
                vid: vid.clone(),
                discord_user_id: discord_user_id.clone(),
            },
            Some(record) => Self::PendingDiscord {
                vid: record.vid.clone(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Linked { .. } | Self::Abandoned(_))
    }
}

/// Inputs of the Discord callback, as received.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscordCallback<'a> {
    pub code: Option<&'a str>,
    pub state: Option<&'a str>,
    /// State minted with the Discord login URL.
    pub expected_state: Option<&'a str>,
    /// VID correlating the callback with the stored IVAO identity.
    pub vid: Option<&'a str>,
}

/// Result of a completed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub state: LinkState,
    pub member: Option<MemberUpsert>,
}

impl Enrollment {
    fn abandoned(reason: AbandonReason) -> Self {
        warn!(?reason, "Discord link abandoned");
        Self {
            state: LinkState::Abandoned(reason),
            member: None,
        }
    }
}

pub struct GuildEnrollment<'a, H, S> {
    discord: &'a Discord,
    http_client: &'a H,
    store: &'a S,
}

impl<'a, H: HttpClient, S: UserStore> GuildEnrollment<'a, H, S> {
    pub fn new(discord: &'a Discord, http_client: &'a H, store: &'a S) -> Self {
        Self {
            discord,
            http_client,
            store,
        }
    }

    /// Drive the callback to `Linked` or `Abandoned`. Guards are checked
    /// before any outbound call or write.
    pub async fn run(&self, callback: DiscordCallback<'_>) -> Result<Enrollment, Error> {
        let Some(code) = callback.code else {
            return Ok(Enrollment::abandoned(AbandonReason::MissingCode));
        };
        if !states_match(callback.expected_state, callback.state) {
            return Ok(Enrollment::abandoned(AbandonReason::StateMismatch));
        }
        let Some(vid) = callback.vid else {
            return Ok(Enrollment::abandoned(AbandonReason::MissingIdentity));
        };
        let Some(record) = self.store.find_by_external_id(vid).await? else {
            return Ok(Enrollment::abandoned(AbandonReason::UnknownIdentity));
        };

        let access_token = self
            .discord
            .validate_authorization_code(self.http_client, code)
            .await?;
        let user = self.discord.get_user(self.http_client, &access_token).await?;

        self.store.attach_discord_id(&record.vid, &user.id).await?;

        let member = self
            .discord
            .add_guild_member(
                self.http_client,
                &user.id,
                &access_token,
                &record.discord_nickname(),
            )
            .await?;

        info!(vid = %record.vid, discord_user_id = %user.id, "Discord account linked");
        Ok(Enrollment {
            state: LinkState::Linked {
                vid: record.vid,
                discord_user_id: user.id,
            },
            member: Some(member),
        })
    }
}
