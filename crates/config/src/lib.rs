//! Layered configuration for megascan.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. Built-in defaults.
//! 2. An optional TOML, YAML or JSON file.
//! 3. `MEGASCAN_` environment variables, with `__` separating nested keys
//!    (`MEGASCAN_FACTORY__FALLBACK_DELAY_MS=250`).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use megascan_engine::{DecodeSettings, EngineKind, EngineSettings, LibrarySettings};
use megascan_factory::FactorySettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "MEGASCAN_";
const FILE_NAME: &str = "megascan.toml";
/// Ten years; longer windows are never useful for a rolling history.
const MAX_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub factory: FactorySettings,
    pub engines: EngineSettings,
}

impl Config {
    /// Platform-specific location of the configuration file, such as
    /// `~/.config/megascan/megascan.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "megascan").map(|dirs| dirs.config_dir().join(FILE_NAME))
    }

    /// Load from the default path if that file exists.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path().filter(|path| path.is_file());
        Self::load(path.as_deref())
    }

    /// Load from `path`, which must exist when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                exn::bail!(ErrorKind::Invalid(format!("config file not found: {}", path.display())));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::Invalid(format!("unsupported config format: {}", path.display()))),
            };
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(path = ?path, engines = ?config.factory.engines, "configuration loaded");
        Ok(config)
    }

    /// Reject settings the orchestrator or engines cannot work with.
    pub fn validate(&self) -> Result<()> {
        let factory = &self.factory;
        if factory.engines.is_empty() {
            exn::bail!(ErrorKind::Invalid("factory.engines must list at least one engine".into()));
        }
        if factory.scan_history_limit == 0 || factory.error_history_limit == 0 {
            exn::bail!(ErrorKind::Invalid("history limits must be greater than zero".into()));
        }
        if factory.retention_days == 0 || factory.retention_days > MAX_RETENTION_DAYS {
            exn::bail!(ErrorKind::Invalid(format!(
                "factory.retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }
        let thresholds = &factory.thresholds;
        if thresholds.init_time_ms == 0 || thresholds.scan_time_ms == 0 {
            exn::bail!(ErrorKind::Invalid("timing thresholds must be greater than zero".into()));
        }
        if thresholds.fallback_rate <= 0.0 || thresholds.error_rate <= 0.0 {
            exn::bail!(ErrorKind::Invalid("rate thresholds must be greater than zero".into()));
        }

        let engines = &self.engines;
        if engines.camera.acquire_timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("engines.camera.acquire_timeout_ms must be greater than zero".into()));
        }
        validate_decode("native", &engines.native)?;
        validate_decode("wasm", &engines.wasm.decode)?;
        validate_decode("script", &engines.script.decode)?;
        if factory.enabled(EngineKind::Wasm) {
            validate_library("wasm", &engines.wasm.library)?;
        }
        if factory.enabled(EngineKind::Script) {
            validate_library("script", &engines.script.library)?;
        }
        Ok(())
    }
}

fn validate_decode(engine: &str, decode: &DecodeSettings) -> Result<()> {
    if decode.error_threshold == 0 {
        exn::bail!(ErrorKind::Invalid(format!("engines.{engine}.error_threshold must be greater than zero")));
    }
    if decode.scan_interval_ms == 0 {
        exn::bail!(ErrorKind::Invalid(format!("engines.{engine}.scan_interval_ms must be greater than zero")));
    }
    Ok(())
}

fn validate_library(engine: &str, library: &LibrarySettings) -> Result<()> {
    if library.sources.is_empty() {
        exn::bail!(ErrorKind::Invalid(format!("engines.{engine}.library.sources must not be empty")));
    }
    if library.timeout_ms == 0 {
        exn::bail!(ErrorKind::Invalid(format!("engines.{engine}.library.timeout_ms must be greater than zero")));
    }
    if library.global_symbol.trim().is_empty() {
        exn::bail!(ErrorKind::Invalid(format!("engines.{engine}.library.global_symbol must not be empty")));
    }
    Ok(())
}
