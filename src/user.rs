use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signed-in user, in the same shape whichever provider produced it.
///
/// Values are rebuilt from vendor or persisted data on every call; adapters
/// never cache them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialUser {
    /// Id of the adapter that produced this user, e.g. `APPLE`.
    pub provider: String,
    /// Opaque external identifier.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Raw vendor payload, only present on users returned from a live sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}
