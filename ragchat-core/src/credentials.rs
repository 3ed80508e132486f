//! Credential lookup for LLM provider API keys.
//!
//! Provides a trait-based abstraction so providers never read the process
//! environment directly:
//! - `EnvCredentials`: reads environment variables (production).
//! - `StaticCredentials`: fixed in-memory map (tests, embedding).

use std::collections::HashMap;
use std::sync::RwLock;

/// Source of named secrets (API keys, endpoints).
pub trait CredentialSource: Send + Sync {
    /// Look up a credential by name. Empty values count as absent.
    fn get(&self, name: &str) -> Option<String>;

    /// Check whether a credential is available.
    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Reads credentials from process environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory credentials, mutable so tests can add a key after startup.
#[derive(Default)]
pub struct StaticCredentials {
    values: RwLock<HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&self, name: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(name.to_string(), value.to_string());
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .values
            .read()
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("StaticCredentials")
            .field("names", &names)
            .finish()
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .read()
            .ok()?
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}
