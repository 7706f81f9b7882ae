pub mod apple;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::script::ScriptLoader;
use crate::storage::KeyValueStore;
use crate::user::SocialUser;

pub use apple::AppleLoginProvider;

/// The contract every provider adapter satisfies, whichever vendor SDK sits
/// behind it. The session manager routes calls by [`LoginProvider::provider_id`].
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait LoginProvider: Send + Sync {
    fn provider_id(&self) -> &'static str;

    /// Loads and initializes the vendor SDK.
    async fn initialize(&self) -> Result<()>;

    /// Restores the last signed-in user without talking to the vendor.
    async fn get_login_status(&self) -> Result<SocialUser>;

    async fn sign_in(&self) -> Result<SocialUser>;

    async fn sign_out(&self, revoke: bool) -> Result<()>;

    async fn refresh_token(&self) -> Result<SocialUser> {
        Err(Error::Unsupported {
            provider: self.provider_id(),
            operation: "token refresh",
        })
    }
}

/// What the embedding environment provides to adapters.
#[derive(Debug, Clone)]
pub struct Host {
    pub scripts: Arc<dyn ScriptLoader>,
    pub storage: Arc<dyn KeyValueStore>,
    /// Origin of the embedding page, the default redirect URI.
    pub origin: String,
}

/// The last successful sign-in of one provider, kept under `<PROVIDER_ID>_auth`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    provider: &'static str,
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(provider: &'static str, storage: Arc<dyn KeyValueStore>) -> Self {
        Self { provider, storage }
    }

    pub fn key(&self) -> String {
        format!("{}_auth", self.provider)
    }

    pub async fn persist<T: Serialize + Sync>(&self, session: &T) -> Result<()> {
        let item = serde_json::to_string(session).map_err(Error::Serialization)?;
        self.storage
            .set(&self.key(), &item)
            .await
            .map_err(Error::Storage)
    }

    /// `None` when nothing, or an empty value, is stored.
    pub async fn retrieve<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let item = self
            .storage
            .get(&self.key())
            .await
            .map_err(Error::Storage)?;
        match item {
            Some(item) if !item.is_empty() => serde_json::from_str(&item)
                .map(Some)
                .map_err(Error::Serialization),
            _ => Ok(None),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage
            .remove(&self.key())
            .await
            .map_err(Error::Storage)
    }
}
