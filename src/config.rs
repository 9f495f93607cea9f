//! Server and runtime configuration.
//!
//! [`ServerConfig`] is read from a YAML file where every field is optional, then
//! selectively overridden from the environment. [`RuntimeConfig`] holds the coroutine
//! runtime knobs, which only come from the environment.
//!
//! ```yaml
//! addr: 0.0.0.0:8080
//! public_dir: ./public
//! static_dir: ./static
//! session_timeout_ms: 600000
//! datasource:
//!   max_connections: 4
//! ```

use crate::dispatcher::DispatcherConfig;
use crate::pool::PoolConfig;
use crate::server::CodecConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default coroutine stack size (16 KB)
pub const DEFAULT_STACK_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    pub index_page: String,
    /// Root of the project resource namespace
    pub public_dir: Option<PathBuf>,
    /// Root of the static resource namespace
    pub static_dir: Option<PathBuf>,
    /// Request prefix routed to `static_dir`; empty disables static routing
    pub static_prefix: String,
    pub session_timeout_ms: u64,
    /// Set when fronted by TLS; marks the session cookie `Secure`
    pub use_ssl: bool,
    pub codec: CodecConfig,
    /// Connection pool for data-access code
    pub datasource: Option<PoolConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();
        Self {
            addr: "127.0.0.1:8080".to_string(),
            index_page: dispatcher.index_page,
            public_dir: None,
            static_dir: None,
            static_prefix: dispatcher.static_prefix.unwrap_or_default(),
            session_timeout_ms: dispatcher.session_timeout_ms,
            use_ssl: false,
            codec: CodecConfig::default(),
            datasource: None,
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse YAML text; an empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed YAML or mistyped fields.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `BRRTS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BRRTS_ADDR").filter(|a| !a.trim().is_empty()) {
            self.addr = addr.trim().to_string();
        }
    }

    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            index_page: self.index_page.clone(),
            static_prefix: if self.static_prefix.is_empty() {
                None
            } else {
                Some(self.static_prefix.clone())
            },
            session_timeout_ms: self.session_timeout_ms,
            secure_cookies: self.use_ssl,
        }
    }
}

/// Coroutine runtime settings, read from the environment.
///
/// `BRRTS_STACK_SIZE` accepts decimal (`16384`) or hex (`0x4000`); anything unparsable
/// falls back to [`DEFAULT_STACK_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub stack_size: usize,
}

impl RuntimeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let stack_size = match lookup("BRRTS_STACK_SIZE") {
            Some(val) => {
                let val = val.trim();
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(DEFAULT_STACK_SIZE)
                } else {
                    val.parse().unwrap_or(DEFAULT_STACK_SIZE)
                }
            }
            None => DEFAULT_STACK_SIZE,
        };
        RuntimeConfig { stack_size }
    }
}
