//! # RasterKit Settings
//!
//! Persisted machine settings and cumulative statistics: the
//! `machine_settings` and `stats` sections of the settings document, stored
//! as JSON or TOML in the platform configuration directory.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{MachineSettings, SettingsDocument, Stats};
pub use error::{SettingsError, SettingsResult};
pub use persistence::{load_from_file, save_to_file, SettingsPersistence};
