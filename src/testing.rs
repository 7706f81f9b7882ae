use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::provider::apple::{AppleInitOptions, AppleSdk, AppleSignInOptions};
use crate::script::ScriptLoader;

#[derive(Debug, Clone, Default)]
pub struct CountingScriptLoader {
    loads: Arc<Mutex<HashMap<String, usize>>>,
    fail_first: bool,
}

impl CountingScriptLoader {
    pub fn failing_once() -> Self {
        Self {
            fail_first: true,
            ..Default::default()
        }
    }

    pub fn loads(&self, key: &str) -> usize {
        self.loads.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ScriptLoader for CountingScriptLoader {
    async fn load(&self, key: &str, url: &str) -> Result<()> {
        let attempt = {
            let mut loads = self.loads.lock().unwrap();
            let count = loads.entry(key.to_string()).or_default();
            *count += 1;
            *count
        };
        tokio::task::yield_now().await;
        if self.fail_first && attempt == 1 {
            return Err(anyhow!("failed to fetch {url}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedAppleSdk {
    response: Value,
    init_error: Option<String>,
    delay: bool,
    init_calls: Arc<Mutex<Vec<AppleInitOptions>>>,
    sign_in_calls: Arc<Mutex<Vec<AppleSignInOptions>>>,
}

impl ScriptedAppleSdk {
    pub fn responding(response: Value) -> Self {
        Self {
            response,
            ..Default::default()
        }
    }

    pub fn failing_init(message: &str) -> Self {
        Self {
            init_error: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Keeps the sign-in pending for a moment, like a popup awaiting the user.
    pub fn with_delay(mut self) -> Self {
        self.delay = true;
        self
    }

    pub fn init_calls(&self) -> Vec<AppleInitOptions> {
        self.init_calls.lock().unwrap().clone()
    }

    pub fn sign_in_calls(&self) -> Vec<AppleSignInOptions> {
        self.sign_in_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AppleSdk for ScriptedAppleSdk {
    fn init(&self, options: &AppleInitOptions) -> Result<()> {
        if let Some(message) = &self.init_error {
            return Err(anyhow!("{message}"));
        }
        self.init_calls.lock().unwrap().push(options.clone());
        Ok(())
    }

    async fn sign_in(&self, options: &AppleSignInOptions) -> Result<Value> {
        self.sign_in_calls.lock().unwrap().push(options.clone());
        if self.delay {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(self.response.clone())
    }
}
