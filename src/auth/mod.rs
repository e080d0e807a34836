//! Storage for the single Gemini API key.

use crate::core::keyring::KeyringAccessError;
use keyring::Entry;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub mod ui;

use self::ui::{prompt_api_key, prompt_confirmation, ConfirmationChoice};

pub const KEYRING_SERVICE: &str = "gemchat";
pub const CREDENTIAL_KEY: &str = "gemini_api_key";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const API_KEY_PREFIX: &str = "AIza";
const API_KEY_MIN_LEN: usize = 20;

/// Where the credential string actually lives.
pub trait CredentialBackend: Send + Sync {
    fn read(&self) -> Result<Option<String>, KeyringAccessError>;
    fn write(&self, value: &str) -> Result<(), KeyringAccessError>;
    fn delete(&self) -> Result<(), KeyringAccessError>;
}

/// System keyring entry under a fixed service/key pair.
pub struct KeyringBackend {
    service: String,
    key: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }

    fn entry(&self) -> Result<Entry, KeyringAccessError> {
        Ok(Entry::new(&self.service, &self.key)?)
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, CREDENTIAL_KEY)
    }
}

impl CredentialBackend for KeyringBackend {
    fn read(&self) -> Result<Option<String>, KeyringAccessError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, value: &str) -> Result<(), KeyringAccessError> {
        Ok(self.entry()?.set_password(value)?)
    }

    fn delete(&self) -> Result<(), KeyringAccessError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local storage, used with `--no-keyring` and in tests.
#[derive(Default)]
pub struct MemoryBackend {
    value: Mutex<Option<String>>,
}

impl CredentialBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, KeyringAccessError> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn write(&self, value: &str) -> Result<(), KeyringAccessError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), KeyringAccessError> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    pub fn keyring() -> Self {
        Self::new(Arc::new(KeyringBackend::default()))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    /// Keyring-backed unless keyring use has been switched off.
    pub fn with_keyring(use_keyring: bool) -> Self {
        if use_keyring {
            Self::keyring()
        } else {
            Self::in_memory()
        }
    }

    /// The stored credential. Backend failures are logged and read as absent.
    pub fn get(&self) -> Option<String> {
        match self.backend.read() {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(err) => {
                warn!(error = %err, recoverable = err.is_recoverable(), "credential lookup failed");
                None
            }
        }
    }

    /// Overwrites the stored credential. No format check happens here.
    pub fn set(&self, value: &str) -> Result<(), KeyringAccessError> {
        self.backend.write(value)?;
        debug!("credential stored");
        Ok(())
    }

    pub fn has(&self) -> bool {
        self.get().is_some()
    }

    pub fn clear(&self) -> Result<(), KeyringAccessError> {
        self.backend.delete()?;
        debug!("credential cleared");
        Ok(())
    }

    /// Advisory check: Gemini keys are longer than 20 characters and start
    /// with `AIza`. Never used to block [`CredentialStore::set`].
    pub fn validate_format(value: &str) -> bool {
        value.len() > API_KEY_MIN_LEN && value.starts_with(API_KEY_PREFIX)
    }

    /// The stored credential, falling back to `GEMINI_API_KEY`.
    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(&self, lookup_env: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        self.get().or_else(|| {
            lookup_env(API_KEY_ENV)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
    }

    /// Prompts for a key and stores it, warning when it does not look like a
    /// Gemini key.
    pub fn interactive_auth<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let key = prompt_api_key(input, output, self.has())?;

        if !Self::validate_format(&key) {
            writeln!(
                output,
                "⚠️  This does not look like a Gemini API key (expected a long key starting with {API_KEY_PREFIX}). Storing it anyway."
            )?;
        }

        self.set(&key)?;
        writeln!(output, "✓ API key stored")?;
        Ok(())
    }

    pub fn interactive_deauth<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if !self.has() {
            writeln!(output, "No API key is stored.")?;
            return Ok(());
        }

        match prompt_confirmation(input, output, "Remove the stored Gemini API key?")? {
            ConfirmationChoice::Yes => {
                self.clear()?;
                writeln!(output, "✅ API key removed")?;
            }
            ConfirmationChoice::No => writeln!(output, "Cancelled.")?,
        }
        Ok(())
    }
}
