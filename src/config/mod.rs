//! Layered configuration for multi-lookup
//!
//! Values come from the embedded `default-config.toml`, an optional
//! `multi-lookup.toml` in the working directory, an optional file passed with
//! `--config`, and finally `MULTI_LOOKUP_*` environment variables.

pub mod core;

pub use self::core::{ENV_PREFIX, LOCAL_CONFIG_FILE, PipelineConfig};
