//! Pod security context defaults
//!
//! Pods that do not say whether they run as root get `runAsNonRoot` set,
//! and a non-root user when no user is given either. Pods that ask for
//! `runAsNonRoot` while running as uid 0 are rejected.

use crate::error::Rejection;
use crate::patch::{DEFAULT_RUN_AS_USER, PatchOperation, PatchPath, PatchValue};
use crate::workload::Workload;

/// Computes the security context patches for the given settings
pub fn defaults(
    run_as_non_root: Option<bool>,
    run_as_user: Option<i64>,
) -> Result<Vec<PatchOperation>, Rejection> {
    match (run_as_non_root, run_as_user) {
        (None, user) => {
            // Never default to non-root for a pod that explicitly runs as root.
            let non_root = user != Some(0);
            let mut patches = vec![PatchOperation::add(
                PatchPath::RunAsNonRoot,
                PatchValue::Bool(non_root),
            )];

            if user.is_none() {
                patches.push(PatchOperation::add(
                    PatchPath::RunAsUser,
                    PatchValue::Uid(DEFAULT_RUN_AS_USER),
                ));
            }

            Ok(patches)
        }
        (Some(true), Some(0)) => Err(Rejection::RootUserConflict),
        (Some(_), _) => Ok(Vec::new()),
    }
}

/// Applies [`defaults`] to the pod level security context of `workload`
pub fn apply_defaults(workload: &Workload) -> Result<Vec<PatchOperation>, Rejection> {
    defaults(workload.run_as_non_root, workload.run_as_user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_root(value: bool) -> PatchOperation {
        PatchOperation::add(PatchPath::RunAsNonRoot, PatchValue::Bool(value))
    }

    fn user(uid: i64) -> PatchOperation {
        PatchOperation::add(PatchPath::RunAsUser, PatchValue::Uid(uid))
    }

    #[test]
    fn test_all_combinations() {
        let cases: [(Option<bool>, Option<i64>, Result<Vec<PatchOperation>, Rejection>); 9] = [
            (None, None, Ok(vec![non_root(true), user(1234)])),
            (None, Some(0), Ok(vec![non_root(false)])),
            (None, Some(1000), Ok(vec![non_root(true)])),
            (Some(true), None, Ok(vec![])),
            (Some(true), Some(0), Err(Rejection::RootUserConflict)),
            (Some(true), Some(1000), Ok(vec![])),
            (Some(false), None, Ok(vec![])),
            (Some(false), Some(0), Ok(vec![])),
            (Some(false), Some(1000), Ok(vec![])),
        ];

        for (run_as_non_root, run_as_user, expected) in cases {
            assert_eq!(
                defaults(run_as_non_root, run_as_user),
                expected,
                "runAsNonRoot={run_as_non_root:?} runAsUser={run_as_user:?}"
            );
        }
    }

    #[test]
    fn test_conflict_reason() {
        let err = defaults(Some(true), Some(0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "runAsNonRoot specified, but runAsUser set to 0 (the root user)"
        );
    }

    #[test]
    fn test_apply_defaults_reads_workload() {
        let workload = Workload {
            namespace: "team-a".into(),
            run_as_user: Some(0),
            ..Default::default()
        };

        assert_eq!(apply_defaults(&workload), Ok(vec![non_root(false)]));
    }
}
