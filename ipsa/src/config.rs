//! Webhook configuration file
//!
//! ```yaml
//! imagePullSecretRules:
//!   "team-.*":
//!     "registry\\.example\\.com/.*": example-pull-secret
//!   ".*":
//!     ".*": default-pull-secret
//! exemptNamespaces:
//!   - monitoring
//! securityDefaults: true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::{Exemptions, Pipeline};
use crate::rules::{RuleMap, RuleTable};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ipsa/config.yaml";

fn default_security_defaults() -> bool {
    true
}

/// Parsed configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Free-form metadata describing the deployment
    #[serde(default)]
    pub application: BTreeMap<String, String>,

    /// Namespace pattern -> image pattern -> image pull secret name
    #[serde(default)]
    pub image_pull_secret_rules: RuleMap,

    /// Namespaces exempt in addition to the system namespaces
    #[serde(default)]
    pub exempt_namespaces: Vec<String>,

    /// Whether pod security context defaults are applied
    #[serde(default = "default_security_defaults")]
    pub security_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application: BTreeMap::new(),
            image_pull_secret_rules: RuleMap::new(),
            exempt_namespaces: Vec::new(),
            security_defaults: default_security_defaults(),
        }
    }
}

impl Config {
    /// Reads and parses the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml(&content)
    }

    /// Parses a configuration document
    ///
    /// An empty document is a valid configuration without rules.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(content)?)
    }

    /// Compiles the image pull secret rules
    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        RuleTable::new(&self.image_pull_secret_rules)
    }

    /// System namespaces plus the configured exemptions
    pub fn exemptions(&self) -> Result<Exemptions, ConfigError> {
        if self.exempt_namespaces.iter().any(|ns| ns.trim().is_empty()) {
            return Err(ConfigError::EmptyExemption);
        }

        Ok(Exemptions::with_namespaces(
            self.exempt_namespaces.iter().cloned(),
        ))
    }

    /// Builds the admission pipeline described by this configuration
    ///
    /// All configuration errors surface here, before any request is served.
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        let rules = self.rule_table()?;

        Ok(Pipeline::new(rules.into())
            .exemptions(self.exemptions()?)
            .security_defaults(self.security_defaults))
    }
}
