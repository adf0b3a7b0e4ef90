//! # livetap-settings
//!
//! Layered configuration for every livetap process.
//!
//! Settings are resolved from three layers, lowest priority first:
//! 1. **Compiled defaults**: [`LivetapSettings::default()`]
//! 2. **Settings file**: `~/.livetap/settings.json` (or a path given on the
//!    command line), deep-merged over the defaults
//! 3. **Environment**: `LIVETAP_*` overrides
//!
//! Collector and archiver processes are launched with the same settings
//! file path as the server, so all processes agree on Redis and storage.

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
