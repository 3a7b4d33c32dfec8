//! The parts of a pod that admission policies look at

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;

use crate::error::{Error, Result};

/// Admission-relevant view of a pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    /// Namespace the pod is created in
    pub namespace: String,
    /// Image references of the primary containers, in declaration order
    pub containers: Vec<String>,
    /// Image references of the init containers, in declaration order
    pub init_containers: Vec<String>,
    /// Names of the image pull secrets declared by the pod
    pub pull_secrets: Vec<String>,
    /// Pod level `securityContext.runAsNonRoot`
    pub run_as_non_root: Option<bool>,
    /// Pod level `securityContext.runAsUser`
    pub run_as_user: Option<i64>,
}

impl Workload {
    /// Reduces a pod to its admission-relevant fields
    pub fn from_pod(namespace: impl Into<String>, pod: &Pod) -> Self {
        let mut workload = Self {
            namespace: namespace.into(),
            ..Default::default()
        };

        let Some(spec) = &pod.spec else {
            return workload;
        };

        workload.containers = spec
            .containers
            .iter()
            .filter_map(|c| c.image.clone())
            .collect();

        workload.init_containers = spec
            .init_containers
            .iter()
            .flatten()
            .filter_map(|c| c.image.clone())
            .collect();

        workload.pull_secrets = spec
            .image_pull_secrets
            .iter()
            .flatten()
            .map(|reference| reference.name.clone())
            .collect();

        if let Some(ctx) = &spec.security_context {
            workload.run_as_non_root = ctx.run_as_non_root;
            workload.run_as_user = ctx.run_as_user;
        }

        workload
    }

    /// Decodes the object of an admission request as a pod
    pub fn decode(namespace: impl Into<String>, object: &DynamicObject) -> Result<Self> {
        let value = serde_json::to_value(object).map_err(Error::Decode)?;
        let pod: Pod = serde_json::from_value(value).map_err(Error::Decode)?;

        Ok(Self::from_pod(namespace, &pod))
    }

    /// Unique image references across primary and init containers
    pub fn images(&self) -> BTreeSet<String> {
        self.containers
            .iter()
            .chain(&self.init_containers)
            .cloned()
            .collect()
    }

    /// Returns true when the pod declares any image pull secret
    pub fn has_pull_secrets(&self) -> bool {
        !self.pull_secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(spec: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "test", "namespace": "team-a" },
            "spec": spec,
        }))
        .unwrap()
    }

    #[test]
    fn test_images_from_containers_and_init_containers() {
        let pod = pod(json!({
            "containers": [
                { "name": "app", "image": "registry.example.com/app:v1" },
                { "name": "sidecar", "image": "registry.example.com/proxy:v2" },
            ],
            "initContainers": [
                { "name": "migrate", "image": "registry.example.com/app:v1" },
                { "name": "init", "image": "busybox" },
            ],
        }));

        let workload = Workload::from_pod("team-a", &pod);
        let images: Vec<_> = workload.images().into_iter().collect();

        assert_eq!(
            images,
            vec![
                "busybox",
                "registry.example.com/app:v1",
                "registry.example.com/proxy:v2",
            ]
        );
    }

    #[test]
    fn test_no_containers_yields_empty_set() {
        let workload = Workload::from_pod("team-a", &pod(json!({ "containers": [] })));
        assert!(workload.images().is_empty());

        let workload = Workload::from_pod("team-a", &Pod::default());
        assert!(workload.images().is_empty());
    }

    #[test]
    fn test_security_context_tri_state() {
        let workload = Workload::from_pod("team-a", &pod(json!({ "containers": [] })));
        assert_eq!(workload.run_as_non_root, None);
        assert_eq!(workload.run_as_user, None);

        let workload = Workload::from_pod(
            "team-a",
            &pod(json!({
                "containers": [],
                "securityContext": { "runAsNonRoot": false, "runAsUser": 0 },
            })),
        );
        assert_eq!(workload.run_as_non_root, Some(false));
        assert_eq!(workload.run_as_user, Some(0));
    }

    #[test]
    fn test_pull_secrets() {
        let workload = Workload::from_pod(
            "team-a",
            &pod(json!({
                "containers": [],
                "imagePullSecrets": [{ "name": "mine" }, { "name": "other" }],
            })),
        );

        assert!(workload.has_pull_secrets());
        assert_eq!(workload.pull_secrets, vec!["mine", "other"]);
    }

    #[test]
    fn test_decode_dynamic_object() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "test" },
            "spec": { "containers": [{ "name": "app", "image": "nginx" }] },
        }))
        .unwrap();

        let workload = Workload::decode("team-a", &obj).unwrap();
        assert_eq!(workload.namespace, "team-a");
        assert_eq!(workload.containers, vec!["nginx"]);
    }

    #[test]
    fn test_decode_rejects_malformed_pod() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "test" },
            "spec": { "containers": "not-a-list" },
        }))
        .unwrap();

        let err = Workload::decode("team-a", &obj).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
