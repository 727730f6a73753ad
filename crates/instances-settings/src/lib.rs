//! # instances-settings
//!
//! Configuration surface of the rejoin subsystem, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`InstancesSettings::default()`]
//! 2. **User file**: `<data dir>/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `INSTANCES_*` overrides (highest priority)
//!
//! The rejoin core only reads settings. The embedding process owns loading
//! and hands an `Arc<InstancesSettings>` to the runtime, replacing it when
//! the user changes a toggle.
//!
//! # Usage
//!
//! ```no_run
//! use instances_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("history keeps {} sessions", settings.history_max_count);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path, SETTINGS_FILE_NAME,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = InstancesSettings::default();
        let path = settings_path();
        assert!(path.ends_with("settings.json"));
    }

    #[test]
    fn load_from_tempdir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let custom = InstancesSettings {
            history_max_count: 2,
            ..InstancesSettings::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&custom).unwrap()).unwrap();

        let loaded = loader::load_file_layers(&path).unwrap();
        assert_eq!(loaded.history_max_count, 2);
    }
}
