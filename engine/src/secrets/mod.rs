pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain service name used for every Lantern secret
pub const SERVICE_NAME: &str = "lantern";

/// SecretManager resolves API keys for the model-backed policy.
///
/// Lookup order:
/// 1. The environment variable named in `[llm] api_key_env`
/// 2. The OS keychain entry under the same key
///    (macOS Keychain, Windows Credential Manager, Linux Secret Service)
///
/// Batch runs are unattended, so a missing secret is an error rather than an
/// interactive prompt. Use `lantern secret set` to store one ahead of time.
///
/// The manager also scrubs key-shaped strings out of text before it is logged
/// or written to a results file.
pub struct SecretManager {
    service_name: String,
}

static KEY_PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();

/// `sk-` style keys (OpenAI, OpenRouter `sk-or-v1-`, Anthropic `sk-ant-`) and
/// bearer tokens of 20+ characters
fn key_patterns() -> &'static [Regex; 2] {
    KEY_PATTERNS.get_or_init(|| {
        [
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("static key pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("static bearer pattern"),
        ]
    })
}

impl SecretManager {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve a secret from the environment, then the keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` when neither source has a
    /// non-empty value.
    pub fn resolve(&self, key: &str) -> Result<SecretString, EngineError> {
        if let Ok(value) = std::env::var(key) {
            if !value.trim().is_empty() {
                tracing::debug!("Using secret '{}' from environment", key);
                return Ok(SecretString::new(value.trim()));
            }
        }

        match self.get_secret(key)? {
            Some(value) if !value.trim().is_empty() => Ok(SecretString::new(value.trim())),
            _ => Err(EngineError::KeyringError(format!(
                "Secret '{}' not found. Export {} or run `lantern secret set {}`",
                key, key, key
            ))),
        }
    }

    /// Retrieves a secret from the OS keychain, `None` when absent.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<Option<String>, EngineError> {
        let entry = self.entry(key)?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Save `value` (trimmed) under `key`; blank values are refused
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(format!(
                "Refusing to store an empty value for '{}'",
                key
            )));
        }

        let entry = self.entry(key)?;
        entry.set_password(value.trim()).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Remove `key` from the keychain
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        let entry = self.entry(key)?;

        entry.delete_password().map_err(|e| {
            EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, e))
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Checks the keychain only; the environment is not consulted.
    pub fn has_secret(&self, key: &str) -> bool {
        matches!(self.get_secret(key), Ok(Some(_)))
    }

    /// Replace anything key-shaped in `text` with `[REDACTED]`
    ///
    /// ```
    /// use lantern_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("lantern");
    /// let clean = manager.scrub("bridge died: token sk-1234567890abcdefghij");
    /// assert_eq!(clean, "bridge died: token [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        key_patterns()
            .iter()
            .fold(text.to_string(), |acc, pattern| {
                pattern.replace_all(&acc, "[REDACTED]").into_owned()
            })
    }

    fn entry(&self, key: &str) -> Result<Entry, EngineError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })
    }
}
