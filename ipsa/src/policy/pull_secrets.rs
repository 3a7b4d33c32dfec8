//! Managed image pull secrets
//!
//! User supplied image pull secrets are always stripped, only secrets
//! selected by the rule table are attached.

use std::collections::BTreeSet;

use crate::patch::{PatchOperation, PatchPath, PatchValue};
use crate::rules::RuleTable;
use crate::workload::Workload;

/// Builds the patches that replace the pod's image pull secrets
///
/// `resolved` is `None` when no rule applies to the pod's namespace. In that
/// case existing secrets are still removed but nothing is attached.
pub fn build_patches(
    has_existing: bool,
    resolved: Option<&BTreeSet<String>>,
) -> Vec<PatchOperation> {
    let mut patches = Vec::new();

    if has_existing {
        patches.push(PatchOperation::remove(PatchPath::PullSecrets));
    }

    if let Some(secrets) = resolved {
        // The list either never existed or was just removed.
        patches.push(PatchOperation::add(
            PatchPath::PullSecrets,
            PatchValue::EmptyList,
        ));
        patches.extend(secrets.iter().map(|secret| {
            PatchOperation::add(
                PatchPath::PullSecretsAppend,
                PatchValue::PullSecret(secret.clone()),
            )
        }));
    }

    patches
}

/// Resolves and builds the image pull secret patches for `workload`
pub fn manage(rules: &RuleTable, workload: &Workload) -> Vec<PatchOperation> {
    let resolved = rules
        .covers(&workload.namespace)
        .then(|| rules.resolve(&workload.namespace, &workload.images()));

    build_patches(workload.has_pull_secrets(), resolved.as_ref())
}
