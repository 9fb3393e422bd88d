use super::{KeyValueStore, StoreError};
use wasm_bindgen::JsValue;

/// Which browser storage area a [`WebStorage`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebScope {
    /// `window.localStorage`
    Local,
    /// `window.sessionStorage`
    Session,
}

impl WebScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebScope::Local => "localStorage",
            WebScope::Session => "sessionStorage",
        }
    }
}

/// Browser storage as a key-value store.
///
/// The `web_sys::Storage` handle is looked up on every call rather than
/// held, which keeps this type `Send + Sync`.
#[derive(Debug, Clone, Copy)]
pub struct WebStorage {
    scope: WebScope,
}

impl WebStorage {
    /// `window.localStorage`, failing if the page has none.
    pub fn local() -> Result<Self, StoreError> {
        Self::open(WebScope::Local)
    }

    /// `window.sessionStorage`, failing if the page has none.
    pub fn session() -> Result<Self, StoreError> {
        Self::open(WebScope::Session)
    }

    pub fn open(scope: WebScope) -> Result<Self, StoreError> {
        let storage = Self { scope };
        storage.storage()?;
        log::debug!("Using {}", scope.as_str());
        Ok(storage)
    }

    pub fn scope(&self) -> WebScope {
        self.scope
    }

    fn storage(&self) -> Result<web_sys::Storage, StoreError> {
        let window =
            web_sys::window().ok_or_else(|| StoreError::Unavailable("no window".to_string()))?;
        let storage = match self.scope {
            WebScope::Local => window.local_storage(),
            WebScope::Session => window.session_storage(),
        };
        storage
            .map_err(js_error)?
            .ok_or_else(|| StoreError::Unavailable(format!("{} is disabled", self.scope.as_str())))
    }
}

fn js_error(value: JsValue) -> StoreError {
    StoreError::Backend(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

impl KeyValueStore for WebStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage()?.get_item(key).map_err(js_error)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage()?.remove_item(key).map_err(js_error)
    }
}
