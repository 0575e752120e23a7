use anyhow::Result;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::config::AiConfig;

const ENV_API_KEY: &str = "DRAFTWISE_API_KEY";
const KEYRING_SERVICE: &str = "draftwise";
const KEYRING_USER: &str = "api_key";

/// Where the generation service API key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Keyring,
    File,
    Config,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeySource::Environment => "environment (DRAFTWISE_API_KEY)",
            KeySource::Keyring => "keyring",
            KeySource::File => "key file",
            KeySource::Config => "config file",
        };
        f.write_str(name)
    }
}

pub struct ApiKeyStore {
    key_file: PathBuf,
}

impl ApiKeyStore {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    /// Store using `.api_key` in the config directory as its file fallback.
    pub fn in_config_dir() -> Self {
        let key_file = crate::config::Config::config_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".api_key");
        Self::new(key_file)
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    fn env_key() -> Option<String> {
        env::var(ENV_API_KEY)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn keyring_get() -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
        entry.get_password().ok()
    }

    fn keyring_set(key: &str) -> bool {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
            entry.set_password(key).is_ok()
        } else {
            false
        }
    }

    fn file_get(&self) -> Option<String> {
        fs::read_to_string(&self.key_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Write the key file with owner-only permissions
    fn file_set(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.key_file.parent() {
            fs::create_dir_all(parent)?;
        }

        // Create with restricted permissions atomically to avoid TOCTOU
        #[cfg(unix)]
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.key_file)?;
            file.write_all(key.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.key_file, key)?;
        }

        Ok(())
    }

    /// Look the key up: environment, keyring, key file, then `[ai] api_key`.
    pub fn lookup(&self, config: &AiConfig) -> Option<(String, KeySource)> {
        if let Some(key) = Self::env_key() {
            return Some((key, KeySource::Environment));
        }

        if let Some(key) = Self::keyring_get() {
            return Some((key, KeySource::Keyring));
        }

        if let Some(key) = self.file_get() {
            return Some((key, KeySource::File));
        }

        config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| (k.to_string(), KeySource::Config))
    }

    pub fn get_api_key(&self, config: &AiConfig) -> Result<String> {
        match self.lookup(config) {
            Some((key, source)) => {
                tracing::debug!("Using API key from {}", source);
                Ok(key)
            }
            None => anyhow::bail!(
                "API key not found. Set DRAFTWISE_API_KEY env var or run 'draftwise setup'."
            ),
        }
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        if Self::keyring_set(key) && Self::keyring_get().as_deref() == Some(key) {
            return Ok(());
        }

        eprintln!("Note: Keyring unavailable, using file-based storage.");
        self.file_set(key)?;

        Ok(())
    }
}
