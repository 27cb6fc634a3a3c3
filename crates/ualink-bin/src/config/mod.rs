// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Harness configuration.
//!
//! Files are YAML, TOML or JSON, chosen by extension. Every section is
//! optional; a missing file argument means built-in defaults aimed at a
//! local demo server on [`DEFAULT_ENDPOINT`].

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader, DEFAULT_ENV_PREFIX, load_config};
pub use schema::{
    DEFAULT_ENDPOINT, HarnessConfig, HarnessSettings, LoggingSettings, WatchTarget, WriteTarget,
};
