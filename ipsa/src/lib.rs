//! Mutating admission webhook for pods
//!
//! Strips user supplied image pull secrets and attaches the ones selected by
//! namespace and image rules, then fills in safe security context defaults
//! and rejects pods whose security context contradicts itself.
//!
//! The decision logic is pure and synchronous: an [`AdmissionPolicy`] turns
//! an admission request into a [`Decision`], and the [`server`] encodes it
//! into the AdmissionReview response.

pub mod admission;
pub mod config;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod policy;
pub mod rules;
pub mod server;
pub mod workload;

pub use admission::{AdmissionPolicy, Policies};
pub use config::Config;
pub use error::{ConfigError, Error, Rejection, Result};
pub use patch::{PatchOperation, PatchPath, PatchValue};
pub use pipeline::{Exemptions, Pipeline};
pub use policy::Decision;
pub use rules::{RuleMap, RuleTable};
pub use workload::Workload;
