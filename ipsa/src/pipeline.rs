//! Image pull secret and security context admission for pods

use std::collections::BTreeSet;
use std::sync::Arc;

use kube::core::admission::AdmissionRequest;
use kube::core::{DynamicObject, GroupVersionResource};
use tracing::{debug, info, warn};

use crate::admission::AdmissionPolicy;
use crate::error::{Error, Result};
use crate::policy::{Decision, pull_secrets, security_context};
use crate::rules::RuleTable;
use crate::workload::Workload;

/// Namespaces that are never subject to admission policies
pub const SYSTEM_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "istio-system"];

/// Namespaces exempt from admission policies
#[derive(Debug, Clone)]
pub struct Exemptions {
    namespaces: BTreeSet<String>,
}

impl Default for Exemptions {
    fn default() -> Self {
        Self {
            namespaces: SYSTEM_NAMESPACES.iter().map(|ns| ns.to_string()).collect(),
        }
    }
}

impl Exemptions {
    /// System namespaces plus the given operator declared namespaces
    pub fn with_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exemptions = Self::default();
        exemptions
            .namespaces
            .extend(namespaces.into_iter().map(Into::into));
        exemptions
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }
}

/// Returns true for the core `v1/pods` resource itself, not its subresources
fn is_pod(resource: &GroupVersionResource, sub_resource: Option<&str>) -> bool {
    resource.group.is_empty()
        && resource.version == "v1"
        && resource.resource == "pods"
        && sub_resource.is_none()
}

/// Decides admission for pods
///
/// Replaces user supplied image pull secrets with the ones selected by the
/// rule table, then applies security context defaults. Holds no state
/// besides its configuration, so one instance serves all requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: Arc<RuleTable>,
    exemptions: Exemptions,
    security_defaults: bool,
}

impl Pipeline {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self {
            rules,
            exemptions: Exemptions::default(),
            security_defaults: true,
        }
    }

    /// Replaces the exempt namespaces
    #[must_use]
    pub fn exemptions(mut self, exemptions: Exemptions) -> Self {
        self.exemptions = exemptions;
        self
    }

    /// Enables or disables the security context defaults
    #[must_use]
    pub fn security_defaults(mut self, enabled: bool) -> Self {
        self.security_defaults = enabled;
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Decides admission for an already decoded pod
    pub fn decide_workload(&self, workload: &Workload) -> Decision {
        if self.exemptions.contains(&workload.namespace) {
            debug!(namespace = %workload.namespace, "namespace exempt");
            return Decision::unchanged();
        }

        let mut patches = pull_secrets::manage(&self.rules, workload);

        if self.security_defaults {
            match security_context::apply_defaults(workload) {
                Ok(defaults) => patches.extend(defaults),
                Err(rejection) => return Decision::Deny(rejection),
            }
        }

        Decision::Allow(patches)
    }
}

impl AdmissionPolicy for Pipeline {
    fn name(&self) -> &'static str {
        "image-pull-secrets"
    }

    fn decide(&self, req: &AdmissionRequest<DynamicObject>) -> Result<Decision> {
        if !is_pod(&req.resource, req.sub_resource.as_deref()) {
            warn!(
                uid = %req.uid,
                resource = %req.resource.resource,
                sub_resource = ?req.sub_resource,
                "expected resource to be v1/pods, passing through"
            );
            return Ok(Decision::unchanged());
        }

        let namespace = req
            .namespace
            .clone()
            .or_else(|| req.object.as_ref().and_then(|o| o.metadata.namespace.clone()))
            .unwrap_or_default();

        if self.exemptions.contains(&namespace) {
            debug!(uid = %req.uid, namespace = %namespace, "namespace exempt");
            return Ok(Decision::unchanged());
        }

        let object = req.object.as_ref().ok_or(Error::MissingObject)?;
        let workload = Workload::decode(namespace, object)?;
        let decision = self.decide_workload(&workload);

        info!(
            uid = %req.uid,
            namespace = %workload.namespace,
            images = workload.images().len(),
            allowed = decision.is_allowed(),
            patches = decision.patches().len(),
            "pod admission decided"
        );

        Ok(decision)
    }
}
