use std::sync::Arc;

use anyhow::Result;
use oauth2::ClientId;
use serde::Deserialize;

use crate::provider::apple::{AppleOptions, AppleSdk};
use crate::provider::{AppleLoginProvider, Host, LoginProvider};
use crate::service::SocialAuthService;

/// Which providers the session manager offers, e.g.
///
/// ```json
/// {
///   "autoLogin": true,
///   "providers": [
///     { "provider": "APPLE", "clientId": "com.example.web", "options": { "scope": "email" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub auto_login: bool,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider")]
pub enum ProviderConfig {
    #[serde(rename = "APPLE", rename_all = "camelCase")]
    Apple {
        client_id: ClientId,
        #[serde(default)]
        options: AppleOptions,
    },
}

/// Vendor SDK bindings available to the providers being built.
#[derive(Debug, Clone)]
pub struct VendorSdks {
    pub apple: Arc<dyn AppleSdk>,
}

impl ServiceConfig {
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub async fn from_file(path: &std::path::Path) -> Result<Self> {
        use anyhow::Context;

        let data = tokio::fs::read_to_string(path)
            .await
            .context(format!("reading {}", path.display()))?;
        Self::from_json(&data).context(format!("parsing {}", path.display()))
    }

    pub fn build(&self, host: &Host, sdks: &VendorSdks) -> SocialAuthService {
        let providers = self
            .providers
            .iter()
            .map(|p| -> Arc<dyn LoginProvider> {
                match p {
                    ProviderConfig::Apple { client_id, options } => Arc::new(AppleLoginProvider::new(
                        client_id.clone(),
                        options.clone(),
                        sdks.apple.clone(),
                        host.clone(),
                    )),
                }
            })
            .collect();
        SocialAuthService::new(providers, self.auto_login)
    }
}
