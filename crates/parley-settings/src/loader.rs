//! Layered settings loading.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ParleySettings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PARLEY_";

/// Default settings file location (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default file (if present) plus env overrides.
pub fn load_settings() -> Result<ParleySettings> {
    let path = settings_path();
    let file = path.exists().then_some(path.as_path());
    extract(layers(file))
}

/// Load settings from an explicit file plus env overrides.
///
/// Unlike [`load_settings`], a missing file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    if !path.exists() {
        return Err(SettingsError::NotFound(path.to_path_buf()));
    }
    extract(layers(Some(path)))
}

fn layers(file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ParleySettings::default()));
    if let Some(path) = file {
        debug!(path = %path.display(), "merging settings file");
        figment = figment.merge(Json::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

fn extract(figment: Figment) -> Result<ParleySettings> {
    let settings: ParleySettings = figment.extract()?;
    settings.validate()?;
    Ok(settings)
}
