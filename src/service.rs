use std::sync::Arc;

use async_lock::{Mutex, OnceCell};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::provider::LoginProvider;
use crate::user::SocialUser;

/// Routes sign-in calls to provider adapters by id and publishes who is
/// currently signed in.
pub struct SocialAuthService {
    providers: Vec<Arc<dyn LoginProvider>>,
    auto_login: bool,
    initialized: OnceCell<()>,
    current: Mutex<Option<&'static str>>,
    auth_state: watch::Sender<Option<SocialUser>>,
}

impl std::fmt::Debug for SocialAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<_> = self.providers.iter().map(|p| p.provider_id()).collect();
        f.debug_struct("SocialAuthService")
            .field("providers", &ids)
            .field("auto_login", &self.auto_login)
            .field("initialized", &self.initialized.is_initialized())
            .finish_non_exhaustive()
    }
}

impl SocialAuthService {
    /// Providers are consulted in the given order during auto-login.
    pub fn new(providers: Vec<Arc<dyn LoginProvider>>, auto_login: bool) -> Self {
        let (auth_state, _) = watch::channel(None);
        Self {
            providers,
            auto_login,
            initialized: OnceCell::new(),
            current: Mutex::new(None),
            auth_state,
        }
    }

    pub fn provider(&self, provider_id: &str) -> Option<&Arc<dyn LoginProvider>> {
        self.providers
            .iter()
            .find(|p| p.provider_id() == provider_id)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.is_initialized()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SocialUser>> {
        self.auth_state.subscribe()
    }

    pub fn current_user(&self) -> Option<SocialUser> {
        self.auth_state.borrow().clone()
    }

    /// Initializes every provider, then restores a session if auto-login is on.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                for provider in &self.providers {
                    provider.initialize().await?;
                }
                if self.auto_login {
                    self.restore().await?;
                }
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let session = self.persisted_session().await?;
        if let Some((provider_id, _)) = &session {
            tracing::debug!("restored {provider_id} session");
            *self.current.lock().await = Some(provider_id);
        }
        self.auth_state.send_replace(session.map(|(_, user)| user));
        Ok(())
    }

    // First provider, in configured order, holding a readable session.
    async fn persisted_session(&self) -> Result<Option<(&'static str, SocialUser)>> {
        for provider in &self.providers {
            match provider.get_login_status().await {
                Ok(user) => return Ok(Some((provider.provider_id(), user))),
                Err(Error::NoSession { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// The persisted session providers would restore, read without signing
    /// it in. Unlike `current_user` this does not depend on auto-login.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn login_status(&self) -> Result<Option<SocialUser>> {
        if !self.is_initialized() {
            return Err(Error::NotReady);
        }
        Ok(self.persisted_session().await?.map(|(_, user)| user))
    }

    fn ready_provider(&self, provider_id: &str) -> Result<&Arc<dyn LoginProvider>> {
        if !self.is_initialized() {
            return Err(Error::NotReady);
        }
        self.provider(provider_id)
            .ok_or_else(|| Error::UnknownProvider(provider_id.to_string()))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sign_in(&self, provider_id: &str) -> Result<SocialUser> {
        let provider = self.ready_provider(provider_id)?;
        let user = provider.sign_in().await?;
        *self.current.lock().await = Some(provider.provider_id());
        self.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sign_out(&self, revoke: bool) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotReady);
        }
        let mut current = self.current.lock().await;
        let provider_id = (*current).ok_or(Error::NotLoggedIn)?;
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| Error::UnknownProvider(provider_id.to_string()))?;
        provider.sign_out(revoke).await?;
        *current = None;
        self.auth_state.send_replace(None);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh_auth_token(&self, provider_id: &str) -> Result<SocialUser> {
        let provider = self.ready_provider(provider_id)?;
        let user = provider.refresh_token().await?;
        self.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }
}
