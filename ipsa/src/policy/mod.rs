//! Admission policies and their decisions

pub mod pull_secrets;
pub mod security_context;

use crate::error::Rejection;
use crate::patch::PatchOperation;

/// Outcome of running policies against one admission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Admit the object after applying the patches in order
    ///
    /// An empty list admits the object unchanged.
    Allow(Vec<PatchOperation>),
    /// Deny the object
    Deny(Rejection),
}

impl Decision {
    /// Admit the object unchanged
    pub const fn unchanged() -> Self {
        Self::Allow(Vec::new())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Patches to apply, empty for denials
    pub fn patches(&self) -> &[PatchOperation] {
        match self {
            Self::Allow(patches) => patches,
            Self::Deny(_) => &[],
        }
    }

    /// Combines two decisions for the same request
    ///
    /// Patches are concatenated in order. Any denial wins and drops every
    /// patch, a request is never partially admitted.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Deny(rejection), _) | (Self::Allow(_), Self::Deny(rejection)) => {
                Self::Deny(rejection)
            }
            (Self::Allow(mut patches), Self::Allow(more)) => {
                patches.extend(more);
                Self::Allow(patches)
            }
        }
    }
}
