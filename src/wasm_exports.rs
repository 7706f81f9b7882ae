use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::js_sys::{JSON, Promise, Reflect};
use wasm_bindgen_futures::{JsFuture, future_to_promise};

use crate::config::{ServiceConfig, VendorSdks};
use crate::provider::Host;
use crate::provider::apple::{AppleInitOptions, AppleSdk, AppleSignInOptions, rejection_payload};
use crate::script::{ScriptLoader, ScriptRegistry};
use crate::service::SocialAuthService;
use crate::storage::KeyValueStore;

#[wasm_bindgen(inline_js = r#"
export function load_script(id, src) {
  return new Promise((resolve, reject) => {
    if (document.getElementById(id)) {
      resolve();
      return;
    }
    const script = document.createElement('script');
    script.id = id;
    script.async = true;
    script.src = src;
    script.onload = () => resolve();
    script.onerror = () => reject(new Error(`failed to load ${src}`));
    document.head.appendChild(script);
  });
}

export function page_origin() {
  return window.location.origin;
}
"#)]
extern "C" {
    fn load_script(id: &str, src: &str) -> Promise;
    fn page_origin() -> String;
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["AppleID", "auth"], js_name = init)]
    fn apple_auth_init(options: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["AppleID", "auth"], js_name = signIn)]
    fn apple_auth_sign_in(options: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = localStorage, js_name = getItem)]
    fn local_storage_get(key: &str) -> Result<Option<String>, JsValue>;

    #[wasm_bindgen(catch, js_namespace = localStorage, js_name = setItem)]
    fn local_storage_set(key: &str, value: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = localStorage, js_name = removeItem)]
    fn local_storage_remove(key: &str) -> Result<(), JsValue>;
}

fn jsfy<E>(e: E) -> JsValue
where
    E: Debug,
{
    let es = format!("{e:#?}");
    JsValue::from_str(es.as_str())
}

// Vendor rejections reach JavaScript as the vendor sent them.
fn reject(e: crate::Error) -> JsValue {
    match &e {
        crate::Error::VendorAuth(value) => to_js(value).unwrap_or_else(|_| jsfy(&e)),
        _ => jsfy(&e),
    }
}

// `Error` objects keep their text in `message`, which `JSON.stringify` skips.
fn js_message(value: &JsValue) -> String {
    Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

fn js_error(value: JsValue) -> anyhow::Error {
    match js_to_json(&value) {
        Ok(Value::Object(fields)) if !fields.is_empty() => anyhow!("{}", Value::Object(fields)),
        Ok(Value::String(text)) => anyhow!("{text}"),
        _ => anyhow!("{}", js_message(&value)),
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    JSON::parse(&text).map_err(js_error)
}

fn js_to_json(value: &JsValue) -> Result<Value> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = JSON::stringify(value).map_err(|e| anyhow!("{e:?}"))?;
    Ok(serde_json::from_str(&String::from(text))?)
}

/// `<script>` tags appended to the page head.
#[derive(Debug, Default)]
pub struct DomScriptLoader;

#[async_trait::async_trait(?Send)]
impl ScriptLoader for DomScriptLoader {
    async fn load(&self, key: &str, url: &str) -> Result<()> {
        JsFuture::from(load_script(key, url))
            .await
            .map_err(js_error)?;
        Ok(())
    }
}

/// `window.localStorage`.
#[derive(Debug, Default)]
pub struct LocalStorage;

#[async_trait::async_trait(?Send)]
impl KeyValueStore for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        local_storage_get(key).map_err(js_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        local_storage_set(key, value).map_err(js_error)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        local_storage_remove(key).map_err(js_error)
    }
}

/// The global `AppleID.auth` object injected by Apple's script.
#[derive(Debug, Default)]
pub struct BrowserAppleSdk;

#[async_trait::async_trait(?Send)]
impl AppleSdk for BrowserAppleSdk {
    fn init(&self, options: &AppleInitOptions) -> Result<()> {
        apple_auth_init(to_js(options)?).map_err(js_error)
    }

    async fn sign_in(&self, options: &AppleSignInOptions) -> Result<Value> {
        let promise = apple_auth_sign_in(to_js(options)?).map_err(js_error)?;
        match JsFuture::from(promise).await {
            Ok(response) => js_to_json(&response),
            // Apple rejects with `{error: "popup_closed_by_user"}` and the like.
            Err(rejection) => Ok(rejection_payload(
                js_to_json(&rejection).unwrap_or(Value::Null),
                || js_message(&rejection),
            )),
        }
    }
}

#[wasm_bindgen(js_name = initTracing)]
pub fn init_tracing() {
    crate::log::set_global_logger();
}

/// Session manager exposed to JavaScript. Users are returned as plain objects.
#[wasm_bindgen]
pub struct SocialAuth {
    service: Arc<SocialAuthService>,
}

#[wasm_bindgen]
impl SocialAuth {
    /// `config` is the JSON service configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config: &str) -> Result<SocialAuth, JsValue> {
        console_error_panic_hook::set_once();

        let config = ServiceConfig::from_json(config).map_err(jsfy)?;
        let host = Host {
            scripts: Arc::new(ScriptRegistry::new(DomScriptLoader)),
            storage: Arc::new(LocalStorage),
            origin: page_origin(),
        };
        let sdks = VendorSdks {
            apple: Arc::new(BrowserAppleSdk),
        };
        Ok(SocialAuth {
            service: Arc::new(config.build(&host, &sdks)),
        })
    }

    pub fn initialize(&self) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            service.initialize().await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = currentUser)]
    pub fn current_user(&self) -> Result<JsValue, JsValue> {
        to_js(&self.service.current_user()).map_err(jsfy)
    }

    #[wasm_bindgen(js_name = signIn)]
    pub fn sign_in(&self, provider_id: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let user = service.sign_in(&provider_id).await.map_err(reject)?;
            to_js(&user).map_err(jsfy)
        })
    }

    #[wasm_bindgen(js_name = signOut)]
    pub fn sign_out(&self, revoke: Option<bool>) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            service
                .sign_out(revoke.unwrap_or(false))
                .await
                .map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = refreshAuthToken)]
    pub fn refresh_auth_token(&self, provider_id: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let user = service.refresh_auth_token(&provider_id).await.map_err(reject)?;
            to_js(&user).map_err(jsfy)
        })
    }
}
