//! examgate configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examgate_core::policy::{PermissionNames, PolicyConfig};
use examgate_core::scenario::Scenario;
use examgate_core::service::{AssessmentService, ServiceConfig};

use crate::memory::MemoryStore;
use crate::relationships::StaticRelationships;
use crate::resolver::TokenResolver;

/// Top-level examgate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamgateConfig {
    /// Deadline for each store and relationship call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Require declared permission grants for teacher writes.
    #[serde(default)]
    pub enforce_permission_strings: bool,
    /// Require the results grant before a learner sees their own results.
    #[serde(default = "default_true")]
    pub self_results_requires_permission: bool,
    /// Names of the permission grants.
    #[serde(default)]
    pub permissions: PermissionNames,
}

fn default_store_timeout_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for ExamgateConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            enforce_permission_strings: false,
            self_results_requires_permission: default_true(),
            permissions: PermissionNames::default(),
        }
    }
}

impl ExamgateConfig {
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            policy: PolicyConfig {
                enforce_permission_strings: self.enforce_permission_strings,
                self_results_requires_permission: self.self_results_requires_permission,
                grants: self.permissions.clone(),
            },
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(ms) = std::env::var("EXAMGATE_STORE_TIMEOUT_MS") {
            self.store_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("EXAMGATE_STORE_TIMEOUT_MS is not a number: {ms}"))?;
        }
        if let Ok(flag) = std::env::var("EXAMGATE_ENFORCE_PERMISSIONS") {
            self.enforce_permission_strings = parse_flag(&flag)
                .with_context(|| format!("EXAMGATE_ENFORCE_PERMISSIONS is not a boolean: {flag}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            anyhow::bail!("store_timeout_ms must be positive");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognized flag value '{other}'"),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examgate.toml` in the current directory
/// 2. `~/.config/examgate/config.toml`
///
/// Environment variable overrides: `EXAMGATE_STORE_TIMEOUT_MS`,
/// `EXAMGATE_ENFORCE_PERMISSIONS`.
pub fn load_config() -> Result<ExamgateConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamgateConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("examgate.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loading config from {}", path.display());
            toml::from_str::<ExamgateConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamgateConfig::default(),
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examgate"))
}

/// Create an engine over fresh in-memory ports seeded from a scenario.
pub fn create_service(scenario: &Scenario, config: &ExamgateConfig) -> AssessmentService {
    AssessmentService::new(
        Arc::new(TokenResolver::from_fixtures(&scenario.principals)),
        Arc::new(StaticRelationships::from_fixtures(&scenario.courses)),
        Arc::new(MemoryStore::new()),
        config.to_service_config(),
    )
}
