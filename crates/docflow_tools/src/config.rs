#![forbid(unsafe_code)]

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use docflow_engines::{ClassifierConfig, ResolverConfig, ResolverRuntime};
use docflow_os::resolve_wiring::ResolveWiringConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_ENV_VAR: &str = "DOCFLOW_CONFIG";

/// Every section is optional; missing fields take the `mvp_v1` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub resolver: ResolverConfig,
    pub classifier: ClassifierConfig,
    pub wiring: ResolveWiringConfig,
}

impl ToolConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Explicit path first, then `$DOCFLOW_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(explicit, env::var_os(CONFIG_ENV_VAR))
    }

    pub fn load_with(explicit: Option<&Path>, env_value: Option<OsString>) -> anyhow::Result<Self> {
        let path = match (explicit, env_value) {
            (Some(p), _) => Some(p.to_path_buf()),
            (None, Some(v)) if !v.is_empty() => Some(PathBuf::from(v)),
            _ => None,
        };
        match path {
            Some(p) => {
                debug!(path = %p.display(), "loading config");
                Self::from_path(&p)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn runtime(&self) -> ResolverRuntime {
        ResolverRuntime::with_classifier(self.resolver, self.classifier)
    }
}
