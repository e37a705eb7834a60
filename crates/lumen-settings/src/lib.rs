//! # lumen-settings
//!
//! Layered configuration for the Lumen embedding engine.
//!
//! Settings are resolved from three layers (lowest to highest priority):
//! 1. **Compiled defaults**: [`LumenSettings::default()`]
//! 2. **User file**: `~/.lumen/settings.json`, deep-merged over defaults
//! 3. **Environment**: `LUMEN_*` overrides
//!
//! There is no global instance. Callers load once and pass the value down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, expand_home, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
