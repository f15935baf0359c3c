mod client;
mod config;
mod discovery;
mod enrollment;
mod error;
mod flow;
mod http;
mod identity;
mod providers;
mod request;
mod session;
mod state;
mod store;
mod tokens;

// Core
pub use client::OAuth2Client;
pub use config::{Config, ConfigError, DiscordConfig, IvaoConfig, SiteConfig};
pub use error::{DiscoveryError, Error, TokenExchangeError};
pub use flow::{AuthFlow, ErrorKind, Outcome, View};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, REQUEST_TIMEOUT};
pub use tokens::{TokenPair, TokenResponse};

// Components
pub use discovery::{CacheEntry, Clock, DISCOVERY_TTL, DiscoveryCache, ProviderConfig};
pub use enrollment::{AbandonReason, DiscordCallback, Enrollment, GuildEnrollment, LinkState};
pub use identity::{IvaoIdentity, Profile, ProviderRejection, UserProfile};
pub use session::{
    CREDENTIAL_COOKIE, DISCORD_STATE_COOKIE, FIRSTNAME_COOKIE, RequestContext, SetCookie,
    VID_COOKIE, credential_cookie, parse_credential,
};
pub use store::{
    MaintenanceFlag, MemoryUserStore, StaticMaintenanceFlag, StoreError, TokenMetadata,
    UserRecord, UserStore,
};

// Providers
pub use providers::discord::{Discord, DiscordUser, MemberUpsert};
pub use providers::ivao::Ivao;

// Utilities
pub use state::{generate_state, states_match};

// Default HTTP client (behind feature flag)
#[cfg(feature = "reqwest-client")]
pub use http::ReqwestClient;
