//! Sign in with Apple, driven through Apple's JS SDK (`AppleID.auth`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_lock::{Mutex, OnceCell};
use oauth2::{ClientId, RedirectUrl};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::provider::{Host, LoginProvider, SessionStore};
use crate::user::SocialUser;

pub const SDK_URL: &str =
    "https://appleid.cdn-apple.com/appleauth/static/jsapi/appleid/1/en_US/appleid.auth.js";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppleOptions {
    pub scope: String,
    #[serde(rename = "redirectURI", skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<RedirectUrl>,
    #[serde(rename = "responseMode", alias = "response_mode")]
    pub response_mode: String,
}

impl Default for AppleOptions {
    fn default() -> Self {
        Self {
            scope: "name email".to_string(),
            redirect_uri: None,
            response_mode: "form_post".to_string(),
        }
    }
}

/// Arguments of `AppleID.auth.init`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleInitOptions {
    pub client_id: String,
    pub scope: String,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
    pub state: String,
    pub nonce: String,
    pub use_popup: bool,
}

/// Arguments of `AppleID.auth.signIn`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppleSignInOptions {
    pub scope: String,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
    pub response_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppleAuthorization {
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Either part may be missing when the user edits their name in the popup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl AppleName {
    fn full(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.first_name, &self.last_name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Profile Apple shares only the first time a user consents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppleUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AppleName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AppleSignInResponse {
    #[serde(default)]
    authorization: Option<AppleAuthorization>,
    #[serde(default)]
    user: Option<AppleUser>,
}

/// Persisted as `{"authorization": .., "user": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppleSession {
    #[serde(default)]
    authorization: Option<AppleAuthorization>,
    #[serde(default)]
    user: Option<AppleUser>,
}

/// The slice of Apple's JS SDK this adapter drives.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AppleSdk: Send + Sync + std::fmt::Debug {
    fn init(&self, options: &AppleInitOptions) -> anyhow::Result<()>;

    /// Returns the raw vendor payload, including error payloads.
    async fn sign_in(&self, options: &AppleSignInOptions) -> anyhow::Result<Value>;
}

/// Shapes a rejected `AppleID.auth.signIn` promise into a vendor error
/// payload. Rejections without an `error` key are wrapped in one; `message`
/// stands in for values that carry nothing once serialized, such as a JS
/// `Error` (which stringifies to `{}`).
pub fn rejection_payload(rejection: Value, message: impl FnOnce() -> String) -> Value {
    if rejection.get("error").is_some() {
        return rejection;
    }
    let empty = match &rejection {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    };
    let error = if empty {
        Value::String(message())
    } else {
        rejection
    };
    serde_json::json!({ "error": error })
}

/// Replays a recorded `AppleID.auth.signIn` payload, for hosts without a
/// browser to drive the real popup.
#[derive(Debug, Clone)]
pub struct ReplayAppleSdk {
    response: Value,
}

impl ReplayAppleSdk {
    pub fn new(response: Value) -> Self {
        Self { response }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl AppleSdk for ReplayAppleSdk {
    fn init(&self, options: &AppleInitOptions) -> anyhow::Result<()> {
        tracing::debug!(client_id = %options.client_id, "replay SDK initialized");
        Ok(())
    }

    async fn sign_in(&self, _options: &AppleSignInOptions) -> anyhow::Result<Value> {
        Ok(self.response.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Initializing,
    Ready,
    SigningIn,
}

pub struct AppleLoginProvider {
    client_id: ClientId,
    options: AppleOptions,
    sdk: Arc<dyn AppleSdk>,
    host: Host,
    sessions: SessionStore,
    ready: OnceCell<()>,
    initializing: AtomicBool,
    signing_in: Mutex<()>,
    in_sign_in: AtomicBool,
}

impl std::fmt::Debug for AppleLoginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleLoginProvider")
            .field("client_id", &self.client_id)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// Clears the flag when the owning future completes or is dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AppleLoginProvider {
    pub const PROVIDER_ID: &'static str = "APPLE";

    pub fn new(
        client_id: ClientId,
        options: AppleOptions,
        sdk: Arc<dyn AppleSdk>,
        host: Host,
    ) -> Self {
        let sessions = SessionStore::new(Self::PROVIDER_ID, host.storage.clone());
        Self {
            client_id,
            options,
            sdk,
            host,
            sessions,
            ready: OnceCell::new(),
            initializing: AtomicBool::new(false),
            signing_in: Mutex::new(()),
            in_sign_in: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> AdapterState {
        if self.ready.is_initialized() {
            if self.in_sign_in.load(Ordering::SeqCst) {
                AdapterState::SigningIn
            } else {
                AdapterState::Ready
            }
        } else if self.initializing.load(Ordering::SeqCst) {
            AdapterState::Initializing
        } else {
            AdapterState::Uninitialized
        }
    }

    fn redirect_uri(&self) -> String {
        self.options
            .redirect_uri
            .as_ref()
            .map(|u| u.as_str().to_string())
            .unwrap_or_else(|| self.host.origin.clone())
    }

    fn init_options(&self) -> AppleInitOptions {
        AppleInitOptions {
            client_id: self.client_id.as_str().to_string(),
            scope: self.options.scope.clone(),
            redirect_uri: self.redirect_uri(),
            state: String::new(),
            nonce: String::new(),
            use_popup: true,
        }
    }

    fn sign_in_options(&self) -> AppleSignInOptions {
        AppleSignInOptions {
            scope: self.options.scope.clone(),
            redirect_uri: self.redirect_uri(),
            response_mode: self.options.response_mode.clone(),
        }
    }

    async fn load_and_init(&self) -> Result<()> {
        let _initializing = FlagGuard::raise(&self.initializing);
        self.host
            .scripts
            .load(Self::PROVIDER_ID, SDK_URL)
            .await
            .map_err(|source| Error::Load {
                provider: Self::PROVIDER_ID,
                source,
            })?;
        self.sdk
            .init(&self.init_options())
            .map_err(|source| Error::VendorInit {
                provider: Self::PROVIDER_ID,
                source,
            })?;
        tracing::debug!("{} SDK initialized", Self::PROVIDER_ID);
        Ok(())
    }

    fn user(
        authorization: Option<&AppleAuthorization>,
        profile: Option<&AppleUser>,
    ) -> Option<SocialUser> {
        let (authorization, profile) = (authorization?, profile?);
        let token = &authorization.id_token;
        let name = profile.name.as_ref();
        Some(SocialUser {
            provider: Self::PROVIDER_ID.to_string(),
            id: token.clone(),
            email: profile.email.clone(),
            name: name.and_then(AppleName::full),
            first_name: name.and_then(|n| n.first_name.clone()),
            last_name: name.and_then(|n| n.last_name.clone()),
            auth_token: token.clone(),
            id_token: Some(token.clone()),
            response: None,
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl LoginProvider for AppleLoginProvider {
    fn provider_id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn initialize(&self) -> Result<()> {
        self.ready.get_or_try_init(|| self.load_and_init()).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_login_status(&self) -> Result<SocialUser> {
        let no_session = || Error::NoSession {
            provider: Self::PROVIDER_ID,
        };
        let session = match self.sessions.retrieve::<AppleSession>().await {
            Ok(session) => session.ok_or_else(no_session)?,
            Err(Error::Serialization(e)) => {
                tracing::warn!("discarding unreadable {} session: {e}", Self::PROVIDER_ID);
                return Err(no_session());
            }
            Err(e) => return Err(e),
        };
        Self::user(session.authorization.as_ref(), session.user.as_ref()).ok_or_else(no_session)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn sign_in(&self) -> Result<SocialUser> {
        if !self.ready.is_initialized() {
            return Err(Error::NotInitialized {
                provider: Self::PROVIDER_ID,
            });
        }
        let _signing_in = self
            .signing_in
            .try_lock()
            .ok_or(Error::SignInInProgress {
                provider: Self::PROVIDER_ID,
            })?;
        let _in_sign_in = FlagGuard::raise(&self.in_sign_in);

        let raw = self
            .sdk
            .sign_in(&self.sign_in_options())
            .await
            .map_err(Error::Sdk)?;
        if let Some(error) = raw.get("error").filter(|e| !e.is_null()) {
            tracing::debug!("{} sign-in rejected by vendor", Self::PROVIDER_ID);
            return Err(Error::VendorAuth(error.clone()));
        }
        let response: AppleSignInResponse =
            serde_json::from_value(raw.clone()).map_err(Error::MalformedResponse)?;

        let mut user = Self::user(response.authorization.as_ref(), response.user.as_ref())
            .ok_or(Error::IncompleteResponse {
                provider: Self::PROVIDER_ID,
            })?;
        user.response = Some(raw);

        self.sessions
            .persist(&AppleSession {
                authorization: response.authorization,
                user: response.user,
            })
            .await?;
        Ok(user)
    }

    /// Apple's JS SDK has no client-side revocation, so `revoke` only clears
    /// the local session like a plain sign-out.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn sign_out(&self, revoke: bool) -> Result<()> {
        if revoke {
            tracing::debug!("{} has no client-side revocation", Self::PROVIDER_ID);
        }
        self.sessions.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptRegistry;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::testing::{CountingScriptLoader, ScriptedAppleSdk};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        scripts: CountingScriptLoader,
        sdk: ScriptedAppleSdk,
        storage: Arc<MemoryStore>,
        provider: AppleLoginProvider,
    }

    fn fixture_with(options: AppleOptions, scripts: CountingScriptLoader, sdk: ScriptedAppleSdk) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let host = Host {
            scripts: Arc::new(ScriptRegistry::new(scripts.clone())),
            storage: storage.clone(),
            origin: "https://app.example.com".to_string(),
        };
        let provider = AppleLoginProvider::new(
            ClientId::new("abc".to_string()),
            options,
            Arc::new(sdk.clone()),
            host,
        );
        Fixture {
            scripts,
            sdk,
            storage,
            provider,
        }
    }

    fn fixture(sdk: ScriptedAppleSdk) -> Fixture {
        fixture_with(AppleOptions::default(), CountingScriptLoader::default(), sdk)
    }

    fn jane_response() -> Value {
        json!({
            "authorization": {"id_token": "tok1"},
            "user": {"name": {"firstName": "Jane", "lastName": "Doe"}, "email": "jane@x.com"},
            "error": null,
        })
    }

    #[test]
    fn user_maps_token_and_profile() {
        let authorization = AppleAuthorization {
            id_token: "tok1".into(),
            code: Some("c".into()),
            state: None,
        };
        let profile = AppleUser {
            name: Some(AppleName {
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
            }),
            email: Some("jane@x.com".into()),
        };
        let user = AppleLoginProvider::user(Some(&authorization), Some(&profile)).unwrap();
        assert_eq!(user.id, "tok1");
        assert_eq!(user.auth_token, "tok1");
        assert_eq!(user.id_token.as_deref(), Some("tok1"));
        assert_eq!(user.name.as_deref(), Some("Jane Doe"));
        assert_eq!(user.response, None);
    }

    #[test]
    fn user_needs_both_halves() {
        let authorization = AppleAuthorization {
            id_token: "tok1".into(),
            code: None,
            state: None,
        };
        let profile = AppleUser {
            name: None,
            email: Some("jane@x.com".into()),
        };
        assert_eq!(AppleLoginProvider::user(None, Some(&profile)), None);
        assert_eq!(AppleLoginProvider::user(Some(&authorization), None), None);
    }

    #[test]
    fn name_parts_are_joined_when_present() {
        let name = |first: Option<&str>, last: Option<&str>| AppleName {
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
        };
        assert_eq!(name(Some("Jane"), Some("Doe")).full().as_deref(), Some("Jane Doe"));
        assert_eq!(name(None, Some("Doe")).full().as_deref(), Some("Doe"));
        assert_eq!(name(None, None).full(), None);
    }

    #[test]
    fn rejections_become_vendor_error_payloads() {
        let message = || "TypeError: popup blocked".to_string();
        assert_eq!(
            rejection_payload(json!({"error": "popup_closed_by_user"}), message),
            json!({"error": "popup_closed_by_user"})
        );
        assert_eq!(
            rejection_payload(json!({}), message),
            json!({"error": "TypeError: popup blocked"})
        );
        assert_eq!(
            rejection_payload(Value::Null, message),
            json!({"error": "TypeError: popup blocked"})
        );
        assert_eq!(
            rejection_payload(json!("denied"), message),
            json!({"error": "denied"})
        );
    }

    #[test]
    fn options_merge_over_defaults() {
        let options: AppleOptions =
            serde_json::from_value(json!({"redirectURI": "https://app.example.com/cb"})).unwrap();
        assert_eq!(options.scope, "name email");
        assert_eq!(options.response_mode, "form_post");
        assert_eq!(
            options.redirect_uri.map(|u| u.as_str().to_string()).as_deref(),
            Some("https://app.example.com/cb")
        );
    }

    #[tokio::test]
    async fn initialize_passes_popup_options_to_the_vendor() {
        let f = fixture(ScriptedAppleSdk::default());
        assert_eq!(f.provider.state(), AdapterState::Uninitialized);

        f.provider.initialize().await.unwrap();

        assert_eq!(f.provider.state(), AdapterState::Ready);
        assert_eq!(
            f.sdk.init_calls(),
            vec![AppleInitOptions {
                client_id: "abc".into(),
                scope: "name email".into(),
                redirect_uri: "https://app.example.com".into(),
                state: String::new(),
                nonce: String::new(),
                use_popup: true,
            }]
        );
    }

    #[tokio::test]
    async fn initialize_twice_loads_the_script_once() {
        let f = fixture(ScriptedAppleSdk::default());
        f.provider.initialize().await.unwrap();
        f.provider.initialize().await.unwrap();
        let (a, b) = tokio::join!(f.provider.initialize(), f.provider.initialize());
        a.unwrap();
        b.unwrap();

        assert_eq!(f.scripts.loads(AppleLoginProvider::PROVIDER_ID), 1);
        assert_eq!(f.sdk.init_calls().len(), 1);
    }

    #[tokio::test]
    async fn script_failure_surfaces_as_load_error() {
        let f = fixture_with(
            AppleOptions::default(),
            CountingScriptLoader::failing_once(),
            ScriptedAppleSdk::default(),
        );

        let err = f.provider.initialize().await.unwrap_err();
        assert!(matches!(err, Error::Load { provider: "APPLE", .. }));
        assert_eq!(f.provider.state(), AdapterState::Uninitialized);
        assert!(f.sdk.init_calls().is_empty());

        f.provider.initialize().await.unwrap();
        assert_eq!(f.provider.state(), AdapterState::Ready);
    }

    #[tokio::test]
    async fn vendor_init_failure_is_surfaced() {
        let f = fixture(ScriptedAppleSdk::failing_init("AppleID is not defined"));
        let err = f.provider.initialize().await.unwrap_err();
        match err {
            Error::VendorInit { source, .. } => {
                assert_eq!(source.to_string(), "AppleID is not defined")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.provider.state(), AdapterState::Uninitialized);
    }

    #[tokio::test]
    async fn sign_in_returns_and_persists_the_user() {
        let f = fixture(ScriptedAppleSdk::responding(jane_response()));
        f.provider.initialize().await.unwrap();

        let user = f.provider.sign_in().await.unwrap();

        assert_eq!(
            user,
            SocialUser {
                provider: "APPLE".into(),
                id: "tok1".into(),
                email: Some("jane@x.com".into()),
                name: Some("Jane Doe".into()),
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                auth_token: "tok1".into(),
                id_token: Some("tok1".into()),
                response: Some(jane_response()),
            }
        );
        let stored: Value =
            serde_json::from_str(&f.storage.get("APPLE_auth").await.unwrap().unwrap()).unwrap();
        assert_eq!(
            stored,
            json!({
                "authorization": {"id_token": "tok1"},
                "user": {"name": {"firstName": "Jane", "lastName": "Doe"}, "email": "jane@x.com"},
            })
        );
        assert_eq!(
            f.sdk.sign_in_calls(),
            vec![AppleSignInOptions {
                scope: "name email".into(),
                redirect_uri: "https://app.example.com".into(),
                response_mode: "form_post".into(),
            }]
        );
    }

    #[tokio::test]
    async fn login_status_round_trips_a_sign_in() {
        let f = fixture(ScriptedAppleSdk::responding(jane_response()));
        f.provider.initialize().await.unwrap();
        let signed_in = f.provider.sign_in().await.unwrap();

        let restored = f.provider.get_login_status().await.unwrap();

        assert_eq!(restored.id, signed_in.id);
        assert_eq!(restored.email, signed_in.email);
        assert_eq!(restored.name, signed_in.name);
        assert_eq!(restored.response, None);
    }

    #[tokio::test]
    async fn vendor_error_rejects_without_writing() {
        let f = fixture(ScriptedAppleSdk::responding(json!({"error": "user_cancelled"})));
        f.provider.initialize().await.unwrap();

        let err = f.provider.sign_in().await.unwrap_err();

        match err {
            Error::VendorAuth(value) => assert_eq!(value, json!("user_cancelled")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.storage.get("APPLE_auth").await.unwrap(), None);
        assert_eq!(f.provider.state(), AdapterState::Ready);
    }

    #[tokio::test]
    async fn vendor_error_wins_over_malformed_fields() {
        let f = fixture(ScriptedAppleSdk::responding(
            json!({"error": "user_cancelled", "authorization": {}}),
        ));
        f.provider.initialize().await.unwrap();

        let err = f.provider.sign_in().await.unwrap_err();

        match err {
            Error::VendorAuth(value) => assert_eq!(value, json!("user_cancelled")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.storage.get("APPLE_auth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn first_name_alone_still_signs_in() {
        let f = fixture(ScriptedAppleSdk::responding(json!({
            "authorization": {"id_token": "t"},
            "user": {"name": {"firstName": "Jane"}},
        })));
        f.provider.initialize().await.unwrap();

        let user = f.provider.sign_in().await.unwrap();

        assert_eq!(user.name.as_deref(), Some("Jane"));
        assert_eq!(user.first_name.as_deref(), Some("Jane"));
        assert_eq!(user.last_name, None);
        assert_eq!(user.email, None);
        let restored = f.provider.get_login_status().await.unwrap();
        assert_eq!(restored.name.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn missing_profile_is_an_incomplete_response() {
        let f = fixture(ScriptedAppleSdk::responding(
            json!({"authorization": {"id_token": "tok2"}}),
        ));
        f.provider.initialize().await.unwrap();

        let err = f.provider.sign_in().await.unwrap_err();

        assert!(matches!(err, Error::IncompleteResponse { provider: "APPLE" }));
        assert_eq!(f.storage.get("APPLE_auth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_in_requires_initialize() {
        let f = fixture(ScriptedAppleSdk::responding(jane_response()));
        let err = f.provider.sign_in().await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized { provider: "APPLE" }));
        assert!(f.sdk.sign_in_calls().is_empty());
    }

    #[tokio::test]
    async fn overlapping_sign_in_is_rejected() {
        let sdk = ScriptedAppleSdk::responding(jane_response()).with_delay();
        let f = fixture(sdk);
        f.provider.initialize().await.unwrap();

        let (first, second) = tokio::join!(f.provider.sign_in(), async {
            tokio::task::yield_now().await;
            assert_eq!(f.provider.state(), AdapterState::SigningIn);
            f.provider.sign_in().await
        });

        first.unwrap();
        assert!(matches!(
            second.unwrap_err(),
            Error::SignInInProgress { provider: "APPLE" }
        ));
        assert_eq!(f.sdk.sign_in_calls().len(), 1);
        assert_eq!(f.provider.state(), AdapterState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watching_state_never_blocks_a_sign_in() {
        let f = fixture(ScriptedAppleSdk::responding(jane_response()));
        f.provider.initialize().await.unwrap();
        let provider = Arc::new(f.provider);
        let done = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn({
            let (provider, done) = (provider.clone(), done.clone());
            async move {
                while !done.load(Ordering::SeqCst) {
                    let _ = provider.state();
                    let _ = format!("{provider:?}");
                    tokio::task::yield_now().await;
                }
            }
        });

        for _ in 0..200 {
            provider.sign_in().await.unwrap();
        }
        done.store(true, Ordering::SeqCst);
        watcher.await.unwrap();

        assert_eq!(provider.state(), AdapterState::Ready);
    }

    #[tokio::test]
    async fn sign_out_clears_the_session() {
        let f = fixture(ScriptedAppleSdk::responding(jane_response()));
        f.provider.initialize().await.unwrap();
        f.provider.sign_in().await.unwrap();

        f.provider.sign_out(true).await.unwrap();

        let err = f.provider.get_login_status().await.unwrap_err();
        assert_eq!(err.to_string(), "No user is currently logged in with APPLE");
        f.provider.sign_out(false).await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_session_means_no_session() {
        let f = fixture(ScriptedAppleSdk::default());
        f.storage.set("APPLE_auth", "{not json").await.unwrap();
        let err = f.provider.get_login_status().await.unwrap_err();
        assert!(matches!(err, Error::NoSession { provider: "APPLE" }));

        f.storage
            .set("APPLE_auth", r#"{"authorization":{"id_token":"t"}}"#)
            .await
            .unwrap();
        let err = f.provider.get_login_status().await.unwrap_err();
        assert!(matches!(err, Error::NoSession { provider: "APPLE" }));
    }

    #[tokio::test]
    async fn refresh_is_unsupported() {
        let f = fixture(ScriptedAppleSdk::default());
        let err = f.provider.refresh_token().await.unwrap_err();
        assert_eq!(err.to_string(), "token refresh is not supported by APPLE");
    }

    #[tokio::test]
    async fn replay_sdk_feeds_a_recorded_payload() {
        let sdk = ReplayAppleSdk::new(jane_response());
        let payload = sdk
            .sign_in(&AppleSignInOptions {
                scope: "name email".into(),
                redirect_uri: "https://app.example.com".into(),
                response_mode: "form_post".into(),
            })
            .await
            .unwrap();
        assert_eq!(payload, jane_response());
    }
}
