use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{LookupError, Result};

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Optional config picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "multi-lookup.toml";

pub const ENV_PREFIX: &str = "MULTI_LOOKUP_";

/// Limits and markers used by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Slots per bounded queue
    pub queue_capacity: usize,
    /// Slot size for host names, terminator byte included
    pub max_name_length: usize,
    /// Slot size for data file names, terminator byte included
    pub max_file_name_length: usize,
    pub max_requester_threads: usize,
    pub max_resolver_threads: usize,
    pub max_input_files: usize,
    /// End-of-work marker; must never occur as a real item
    pub sentinel: String,
    /// Written in place of an address when resolution fails
    pub not_resolved: String,
    /// Pick an IPv4 address when a name has both families
    pub prefer_ipv4: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            max_name_length: 1025,
            max_file_name_length: 4096,
            max_requester_threads: 10,
            max_resolver_threads: 10,
            max_input_files: 100,
            sentinel: "{END}".to_string(),
            not_resolved: "NOT_RESOLVED".to_string(),
            prefer_ipv4: true,
        }
    }
}

impl PipelineConfig {
    /// Embedded defaults, then `multi-lookup.toml`, then `custom_config`,
    /// then `MULTI_LOOKUP_*` environment variables.
    pub fn load_with_custom_config(custom_config: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG))
            .merge(Toml::file(LOCAL_CONFIG_FILE));

        if let Some(path) = custom_config {
            // An explicitly named file has to exist
            if !path.is_file() {
                return Err(LookupError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
                ));
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate a config from an already layered figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| {
            let parameter = if e.path.is_empty() {
                "config".to_string()
            } else {
                e.path.join(".")
            };
            LookupError::config(parameter, e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run impossible, before anything is
    /// allocated.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LookupError::config("queue_capacity", "must be at least 1"));
        }
        for (parameter, len) in [
            ("max_name_length", self.max_name_length),
            ("max_file_name_length", self.max_file_name_length),
        ] {
            if len < 2 {
                return Err(LookupError::config(
                    parameter,
                    "must leave room for at least one byte plus the terminator",
                ));
            }
            if self.sentinel.len() >= len {
                return Err(LookupError::config(
                    "sentinel",
                    format!("'{}' does not fit a {parameter} slot of {len} bytes", self.sentinel),
                ));
            }
        }
        if self.sentinel.is_empty() {
            return Err(LookupError::config("sentinel", "must not be empty"));
        }
        if self.not_resolved.is_empty() {
            return Err(LookupError::config("not_resolved", "must not be empty"));
        }
        if self.not_resolved == self.sentinel {
            return Err(LookupError::config(
                "not_resolved",
                "must differ from the sentinel",
            ));
        }
        Ok(())
    }
}
