//! Settings persistence.
//!
//! Loads and saves the settings document as JSON or TOML, chosen by file
//! extension, from the platform configuration directory by default.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::SettingsDocument;
use crate::error::{SettingsError, SettingsResult};

/// Settings persistence layer.
#[derive(Debug, Clone, Default)]
pub struct SettingsPersistence {
    document: SettingsDocument,
}

impl SettingsPersistence {
    /// Create a persistence layer holding the default document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default settings location under the platform config directory.
    pub fn default_path() -> SettingsResult<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("no platform config directory".to_string())
        })?;
        Ok(base.join("rasterkit").join("settings.toml"))
    }

    /// Load from file; a missing file yields the default document.
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::new());
        }
        let document = load_from_file(path)?;
        Ok(Self { document })
    }

    /// Save the held document to file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        save_to_file(&self.document, path)
    }

    pub fn document(&self) -> &SettingsDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut SettingsDocument {
        &mut self.document
    }
}

/// Load a settings document from a `.json` or `.toml` file.
pub fn load_from_file(path: &Path) -> SettingsResult<SettingsDocument> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

    let document = if has_extension(path, "json") {
        serde_json::from_str(&content)
            .map_err(|e| SettingsError::LoadError(format!("invalid JSON settings: {}", e)))?
    } else if has_extension(path, "toml") {
        toml::from_str(&content)
            .map_err(|e| SettingsError::LoadError(format!("invalid TOML settings: {}", e)))?
    } else {
        return Err(SettingsError::UnsupportedFormat(
            path.display().to_string(),
        ));
    };
    debug!(path = %path.display(), "settings loaded");
    Ok(document)
}

/// Save a settings document to a `.json` or `.toml` file.
pub fn save_to_file(document: &SettingsDocument, path: &Path) -> SettingsResult<()> {
    let content = if has_extension(path, "json") {
        serde_json::to_string_pretty(document)
            .map_err(|e| SettingsError::SaveError(format!("serialize failed: {}", e)))?
    } else if has_extension(path, "toml") {
        toml::to_string_pretty(document)
            .map_err(|e| SettingsError::SaveError(format!("serialize failed: {}", e)))?
    } else {
        return Err(SettingsError::UnsupportedFormat(
            path.display().to_string(),
        ));
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, content)
        .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "settings saved");
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}
