//! Userinfo payload interpretation.
//!
//! IVAO answers an unusable bearer token with a JSON body whose
//! `description` is one of three fixed sentences. Those sentences are the
//! provider's contract and are matched verbatim; every other body is a
//! profile.

/// The three userinfo rejections IVAO is known to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRejection {
    /// "This auth token has been revoked or expired"
    Expired,
    /// "Couldn't decode auth token"
    Undecodable,
    /// "No auth token found in request"
    Missing,
}

impl ProviderRejection {
    pub const EXPIRED: &'static str = "This auth token has been revoked or expired";
    pub const UNDECODABLE: &'static str = "Couldn't decode auth token";
    pub const MISSING: &'static str = "No auth token found in request";

    /// Exact, case-sensitive match against the known descriptions.
    pub fn from_description(description: &str) -> Option<Self> {
        match description {
            Self::EXPIRED => Some(Self::Expired),
            Self::UNDECODABLE => Some(Self::Undecodable),
            Self::MISSING => Some(Self::Missing),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Expired => Self::EXPIRED,
            Self::Undecodable => Self::UNDECODABLE,
            Self::Missing => Self::MISSING,
        }
    }

    /// Only an expired token is worth a refresh; the others mean the user
    /// has to log in again.
    pub fn should_refresh(self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// IVAO identity extracted from a userinfo payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvaoIdentity {
    pub vid: String,
    pub first_name: String,
    pub last_name: String,
}

impl IvaoIdentity {
    /// `"{first} {last} - {vid}"`, the nickname given in the guild.
    pub fn discord_nickname(&self) -> String {
        format!("{} {} - {}", self.first_name, self.last_name, self.vid)
    }
}

/// Successful userinfo body.
#[derive(Debug, Clone)]
pub struct UserProfile {
    data: serde_json::Value,
}

impl UserProfile {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// The VID; IVAO sends it as a number, older payloads as a string.
    /// Only non-negative integers are accepted in numeric form.
    pub fn vid(&self) -> Option<String> {
        match &self.data["id"] {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => n.as_u64().map(|vid| vid.to_string()),
            _ => None,
        }
    }

    pub fn first_name(&self) -> &str {
        self.data["firstName"].as_str().unwrap_or_default()
    }

    pub fn last_name(&self) -> &str {
        self.data["lastName"].as_str().unwrap_or_default()
    }

    /// `None` when the payload carries no VID.
    pub fn identity(&self) -> Option<IvaoIdentity> {
        Some(IvaoIdentity {
            vid: self.vid()?,
            first_name: self.first_name().to_string(),
            last_name: self.last_name().to_string(),
        })
    }
}

/// Result of a userinfo call.
#[derive(Debug, Clone)]
pub enum Profile {
    Identity(UserProfile),
    Rejected(ProviderRejection),
}

impl Profile {
    pub fn classify(data: serde_json::Value) -> Self {
        let rejection = data
            .get("description")
            .and_then(|d| d.as_str())
            .and_then(ProviderRejection::from_description);

        match rejection {
            Some(rejection) => Self::Rejected(rejection),
            None => Self::Identity(UserProfile::new(data)),
        }
    }
}
