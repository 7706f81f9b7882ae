pub mod cmd;
pub mod config;
pub mod error;
pub mod log;
pub mod provider;
pub mod script;
pub mod service;
pub mod storage;
pub mod user;

#[cfg(target_arch = "wasm32")]
pub mod wasm_exports;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use provider::{AppleLoginProvider, Host, LoginProvider};
pub use service::SocialAuthService;
pub use user::SocialUser;

#[cfg(not(target_arch = "wasm32"))]
pub use native::run;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use clap::ArgMatches;
    use oauth2::ClientId;

    use crate::cmd;
    use crate::config::{ProviderConfig, ServiceConfig, VendorSdks};
    use crate::provider::Host;
    use crate::provider::apple::ReplayAppleSdk;
    use crate::script::StaticScriptLoader;
    use crate::storage::FileStore;

    const LOCAL_ORIGIN: &str = "http://localhost";

    async fn load_config(matches: &ArgMatches) -> Result<ServiceConfig> {
        match matches.get_one::<String>(cmd::CONFIG_OPTION) {
            Some(p) => ServiceConfig::from_file(&PathBuf::from(p)).await,
            None => Ok(ServiceConfig {
                auto_login: true,
                providers: vec![ProviderConfig::Apple {
                    client_id: ClientId::new(String::new()),
                    options: Default::default(),
                }],
            }),
        }
    }

    async fn load_response(matches: &ArgMatches) -> Result<serde_json::Value> {
        let Some(p) = matches.get_one::<String>(cmd::RESPONSE_OPTION) else {
            return Ok(serde_json::Value::Null);
        };
        let data = tokio::fs::read_to_string(p)
            .await
            .context(format!("reading the sign-in response from {p}"))?;
        serde_json::from_str(&data).context("parsing the sign-in response as JSON")
    }

    /// Runs one CLI invocation and returns what should be printed.
    pub async fn run(raw_input: Vec<String>) -> Result<String> {
        tracing::info!("Running CLI with input: {:?}", raw_input);
        let matches = cmd::cmd().try_get_matches_from(raw_input)?;
        let (name, matches) = matches
            .subcommand()
            .context("a subcommand is required")?;

        let config = load_config(matches).await?;
        let store = matches
            .get_one::<String>(cmd::STORE_OPTION)
            .map(PathBuf::from)
            .context("missing --store")?;
        let host = Host {
            scripts: Arc::new(StaticScriptLoader),
            storage: Arc::new(FileStore::new(store)),
            origin: LOCAL_ORIGIN.to_string(),
        };
        // Only `sign-in` defines `--response`.
        let response = match name {
            "sign-in" => load_response(matches).await?,
            _ => serde_json::Value::Null,
        };
        let sdks = VendorSdks {
            apple: Arc::new(ReplayAppleSdk::new(response)),
        };
        let service = config.build(&host, &sdks);
        service.initialize().await?;

        let user = match name {
            "status" => service.login_status().await?,
            "sign-in" | "refresh" => {
                let provider = matches
                    .get_one::<String>(cmd::PROVIDER_OPTION)
                    .context("missing --provider")?;
                let user = if name == "sign-in" {
                    service.sign_in(provider).await?
                } else {
                    service.refresh_auth_token(provider).await?
                };
                Some(user)
            }
            "sign-out" => {
                service.sign_out(matches.get_flag(cmd::REVOKE_OPTION)).await?;
                None
            }
            _ => unreachable!("Exhausted list of subcommands and subcommand_required prevents `None`"),
        };

        match user {
            Some(user) => Ok(serde_json::to_string_pretty(&user)?),
            None if name == "sign-out" => Ok("Signed out".to_string()),
            None => Ok("No user is currently logged in".to_string()),
        }
    }

}
