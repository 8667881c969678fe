use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a local user who owns a survey platform token.
///
/// Tokens are resolved per user; the id also namespaces the response cache so
/// two users never share a cached platform answer.
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let user = UserId::new("field_officer");
/// assert_eq!(user.as_str(), "field_officer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
