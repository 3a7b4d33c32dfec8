use std::sync::Arc;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::patch::to_json_patch;
use crate::policy::Decision;

/// A policy deciding on admission requests
///
/// Policies are pure: a decision depends only on the request and on the
/// policy's own immutable configuration.
pub trait AdmissionPolicy: Send + Sync {
    /// Returns the name of this policy for logging purposes
    fn name(&self) -> &'static str;

    /// Decides whether and how the object in the request is admitted
    ///
    /// An `Err` means the request could not be processed at all, which is
    /// different from denying it with [`Decision::Deny`].
    fn decide(&self, req: &AdmissionRequest<DynamicObject>) -> Result<Decision>;
}

/// Ordered set of policies applied to every request
pub type Policies = Arc<Vec<Box<dyn AdmissionPolicy>>>;

/// Runs every policy against the request and combines their decisions
///
/// Policies run in order until one denies. Patches of all policies are
/// concatenated; a denial drops them all.
pub fn decide_all(
    policies: &[Box<dyn AdmissionPolicy>],
    req: &AdmissionRequest<DynamicObject>,
) -> Result<Decision> {
    let mut decision = Decision::unchanged();

    for policy in policies {
        let outcome = policy.decide(req).inspect_err(|err| {
            error!(
                policy = policy.name(),
                uid = %req.uid,
                operation = ?req.operation,
                error = %err,
                "admission failed"
            );
        })?;

        decision = decision.merge(outcome);

        if let Decision::Deny(rejection) = &decision {
            warn!(
                policy = policy.name(),
                uid = %req.uid,
                operation = ?req.operation,
                reason = %rejection,
                "admission denied"
            );
            break;
        }
    }

    Ok(decision)
}

/// Encodes a decision as the response to `req`
pub fn into_response(
    req: &AdmissionRequest<DynamicObject>,
    decision: Decision,
) -> Result<AdmissionResponse> {
    let res = AdmissionResponse::from(req);

    match decision {
        Decision::Deny(rejection) => Ok(res.deny(rejection.to_string())),
        Decision::Allow(patches) if patches.is_empty() => Ok(res),
        Decision::Allow(patches) => {
            for patch in &patches {
                debug!(uid = %req.uid, %patch, "patch");
            }
            Ok(res.with_patch(to_json_patch(&patches))?)
        }
    }
}

/// Decides on `req` with all policies and builds the response
pub fn review(
    policies: &[Box<dyn AdmissionPolicy>],
    req: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionResponse> {
    let decision = decide_all(policies, req)?;
    let patches = decision.patches().len();
    let res = into_response(req, decision)?;

    if res.allowed {
        info!(uid = %req.uid, operation = ?req.operation, patches, "admitted");
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Rejection};
    use crate::patch::{PatchOperation, PatchPath, PatchValue};
    use kube::core::admission::AdmissionReview;
    use serde_json::json;

    struct FixedPolicy(Decision);

    impl AdmissionPolicy for FixedPolicy {
        fn name(&self) -> &'static str {
            "FixedPolicy"
        }

        fn decide(&self, _req: &AdmissionRequest<DynamicObject>) -> Result<Decision> {
            Ok(self.0.clone())
        }
    }

    struct FailingPolicy;

    impl AdmissionPolicy for FailingPolicy {
        fn name(&self) -> &'static str {
            "FailingPolicy"
        }

        fn decide(&self, _req: &AdmissionRequest<DynamicObject>) -> Result<Decision> {
            Err(Error::MissingObject)
        }
    }

    fn create_test_request(name: &str) -> AdmissionRequest<DynamicObject> {
        let review_json = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "test-uid",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": name,
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {},
                "object": {
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": name,
                        "namespace": "default"
                    },
                    "spec": {
                        "containers": []
                    }
                }
            }
        });

        let review: AdmissionReview<DynamicObject> = serde_json::from_value(review_json).unwrap();
        review.try_into().unwrap()
    }

    fn add_user(uid: i64) -> PatchOperation {
        PatchOperation::add(PatchPath::RunAsUser, PatchValue::Uid(uid))
    }

    #[test]
    fn test_unchanged_response_has_no_patch() {
        let req = create_test_request("test-pod");
        let policies: Vec<Box<dyn AdmissionPolicy>> =
            vec![Box::new(FixedPolicy(Decision::unchanged()))];
        let res = review(&policies, &req).unwrap();

        assert!(res.allowed);
        assert!(res.patch.is_none());
        assert_eq!(res.uid, "test-uid");
    }

    #[test]
    fn test_patches_are_combined_in_order() {
        let req = create_test_request("test-pod");
        let policies: Vec<Box<dyn AdmissionPolicy>> = vec![
            Box::new(FixedPolicy(Decision::Allow(vec![add_user(1)]))),
            Box::new(FixedPolicy(Decision::Allow(vec![add_user(2)]))),
        ];
        let res = review(&policies, &req).unwrap();

        assert!(res.allowed);
        let patch: serde_json::Value = serde_json::from_slice(res.patch.as_ref().unwrap()).unwrap();
        assert_eq!(
            patch,
            json!([
                { "op": "add", "path": "/spec/securityContext/runAsUser", "value": 1 },
                { "op": "add", "path": "/spec/securityContext/runAsUser", "value": 2 },
            ])
        );
    }

    #[test]
    fn test_denial_wins() {
        let req = create_test_request("test-pod");
        let policies: Vec<Box<dyn AdmissionPolicy>> = vec![
            Box::new(FixedPolicy(Decision::Allow(vec![add_user(1)]))),
            Box::new(FixedPolicy(Decision::Deny(Rejection::RootUserConflict))),
            Box::new(FailingPolicy),
        ];
        let res = review(&policies, &req).unwrap();

        assert!(!res.allowed, "Should deny when any policy denies");
        assert!(res.patch.is_none());
    }

    #[test]
    fn test_policy_error_is_not_a_denial() {
        let req = create_test_request("test-pod");
        let policies: Vec<Box<dyn AdmissionPolicy>> = vec![
            Box::new(FixedPolicy(Decision::Allow(vec![add_user(1)]))),
            Box::new(FailingPolicy),
        ];
        let err = review(&policies, &req).unwrap_err();

        assert!(matches!(err, Error::MissingObject));
    }
}
