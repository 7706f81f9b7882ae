use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_lock::{Mutex, OnceCell};

/// Fetches and executes a vendor script.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ScriptLoader: Send + Sync + std::fmt::Debug {
    /// Resolves once the script identified by `key` has been executed.
    async fn load(&self, key: &str, url: &str) -> Result<()>;
}

/// Wraps a loader so each key is loaded at most once.
///
/// Concurrent requests for the same key wait on the same load. A failed load
/// is forgotten, so the next request tries the network again.
#[derive(Debug)]
pub struct ScriptRegistry<L> {
    loader: L,
    loaded: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl<L: ScriptLoader> ScriptRegistry<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &str) -> Arc<OnceCell<()>> {
        self.loaded
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl<L: ScriptLoader> ScriptLoader for ScriptRegistry<L> {
    async fn load(&self, key: &str, url: &str) -> Result<()> {
        let slot = self.slot(key).await;
        slot.get_or_try_init(|| async {
            tracing::debug!("loading script {key} from {url}");
            self.loader.load(key, url).await
        })
        .await?;
        Ok(())
    }
}

/// For hosts that link the vendor SDK in directly; there is nothing to fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticScriptLoader;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ScriptLoader for StaticScriptLoader {
    async fn load(&self, key: &str, _url: &str) -> Result<()> {
        tracing::trace!("script {key} is statically available");
        Ok(())
    }
}
