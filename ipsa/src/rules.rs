//! Image pull secret rules
//!
//! A [`RuleTable`] maps namespace patterns to image patterns to the name of
//! the image pull secret that pods matching both should receive. Patterns
//! are regular expressions that must match the whole namespace or image
//! reference.
//!
//! Rules are additive: every namespace/image pattern pair that matches
//! contributes its secret, there is no precedence between overlapping rules.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::error::ConfigError;

/// Raw rules as found in the configuration file
pub type RuleMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn compile(source: &str) -> Result<Self, ConfigError> {
        let invalid = |err| ConfigError::InvalidPattern {
            pattern: source.to_owned(),
            source: err,
        };

        // Validate the pattern on its own so that something like `a)|(b`
        // cannot escape the anchors added below.
        Regex::new(source).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(invalid)?;

        Ok(Self {
            source: source.to_owned(),
            regex,
        })
    }

    fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

#[derive(Debug, Clone)]
struct ImageRule {
    image: Pattern,
    secret: String,
}

#[derive(Debug, Clone)]
struct NamespaceRule {
    namespace: Pattern,
    images: Vec<ImageRule>,
}

/// Compiled, immutable set of image pull secret rules
///
/// Built once from the configuration and shared read-only between all
/// admission decisions.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<NamespaceRule>,
}

impl RuleTable {
    /// Compiles the raw rules
    ///
    /// Fails on the first pattern that is not a valid regular expression or
    /// on a rule naming an empty secret.
    pub fn new(rules: &RuleMap) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|(namespace, images)| {
                let images = images
                    .iter()
                    .map(|(image, secret)| {
                        if secret.trim().is_empty() {
                            return Err(ConfigError::EmptyCredential {
                                namespace: namespace.clone(),
                                image: image.clone(),
                            });
                        }

                        Ok(ImageRule {
                            image: Pattern::compile(image)?,
                            secret: secret.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(NamespaceRule {
                    namespace: Pattern::compile(namespace)?,
                    images,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { rules })
    }

    /// Returns true when no rules are configured at all
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of namespace/image pattern pairs
    pub fn len(&self) -> usize {
        self.rules.iter().map(|rule| rule.images.len()).sum()
    }

    /// Returns true when at least one namespace pattern matches `namespace`
    pub fn covers(&self, namespace: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.namespace.is_match(namespace))
    }

    /// Resolves the image pull secrets for `images` running in `namespace`
    ///
    /// The result is the union of the secrets of every matching
    /// namespace/image pattern pair, ordered by name.
    pub fn resolve(&self, namespace: &str, images: &BTreeSet<String>) -> BTreeSet<String> {
        let mut secrets = BTreeSet::new();

        for rule in self.rules.iter().filter(|r| r.namespace.is_match(namespace)) {
            for image_rule in &rule.images {
                if images.iter().any(|image| image_rule.image.is_match(image)) {
                    tracing::trace!(
                        namespace_pattern = %rule.namespace.source,
                        image_pattern = %image_rule.image.source,
                        secret = %image_rule.secret,
                        "rule matched"
                    );
                    secrets.insert(image_rule.secret.clone());
                }
            }
        }

        secrets
    }
}
