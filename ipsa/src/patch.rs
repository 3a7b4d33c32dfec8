//! Patch operations produced by admission policies
//!
//! Policies only ever touch a handful of pod fields, so paths are a closed
//! vocabulary instead of free-form JSON pointers.

use std::fmt;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, RemoveOperation};
use serde_json::{Value, json};

/// Default user id injected when a pod sets neither `runAsNonRoot` nor `runAsUser`
pub const DEFAULT_RUN_AS_USER: i64 = 1234;

/// Pod fields policies may patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPath {
    /// `/spec/imagePullSecrets`
    PullSecrets,
    /// `/spec/imagePullSecrets/-`
    PullSecretsAppend,
    /// `/spec/securityContext/runAsNonRoot`
    RunAsNonRoot,
    /// `/spec/securityContext/runAsUser`
    RunAsUser,
}

impl PatchPath {
    /// The JSON pointer tokens of this path
    pub const fn tokens(self) -> &'static [&'static str] {
        match self {
            Self::PullSecrets => &["spec", "imagePullSecrets"],
            Self::PullSecretsAppend => &["spec", "imagePullSecrets", "-"],
            Self::RunAsNonRoot => &["spec", "securityContext", "runAsNonRoot"],
            Self::RunAsUser => &["spec", "securityContext", "runAsUser"],
        }
    }

    /// The JSON pointer of this path
    pub fn pointer(self) -> PointerBuf {
        PointerBuf::from_tokens(self.tokens().iter().copied())
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in self.tokens() {
            write!(f, "/{token}")?;
        }
        Ok(())
    }
}

/// Values policies may write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    /// An empty list
    EmptyList,
    /// A reference to an image pull secret
    PullSecret(String),
    /// A boolean flag
    Bool(bool),
    /// A user id
    Uid(i64),
}

impl PatchValue {
    /// Renders the value the way the pod API expects it
    ///
    /// Image pull secrets are `LocalObjectReference` objects, not bare names.
    pub fn to_json(&self) -> Value {
        match self {
            Self::EmptyList => json!([]),
            Self::PullSecret(name) => json!({ "name": name }),
            Self::Bool(value) => json!(value),
            Self::Uid(uid) => json!(uid),
        }
    }
}

/// A single edit to the admitted pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOperation {
    Add { path: PatchPath, value: PatchValue },
    Remove { path: PatchPath },
}

impl PatchOperation {
    pub fn add(path: PatchPath, value: PatchValue) -> Self {
        Self::Add { path, value }
    }

    pub fn remove(path: PatchPath) -> Self {
        Self::Remove { path }
    }

    pub fn path(&self) -> PatchPath {
        match self {
            Self::Add { path, .. } | Self::Remove { path } => *path,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { path, value } => write!(f, "add {path} = {}", value.to_json()),
            Self::Remove { path } => write!(f, "remove {path}"),
        }
    }
}

impl From<&PatchOperation> for json_patch::PatchOperation {
    fn from(op: &PatchOperation) -> Self {
        match op {
            PatchOperation::Add { path, value } => Self::Add(AddOperation {
                path: path.pointer(),
                value: value.to_json(),
            }),
            PatchOperation::Remove { path } => Self::Remove(RemoveOperation {
                path: path.pointer(),
            }),
        }
    }
}

/// Converts an ordered list of operations into a JSON patch
pub fn to_json_patch(ops: &[PatchOperation]) -> json_patch::Patch {
    json_patch::Patch(ops.iter().map(Into::into).collect())
}
