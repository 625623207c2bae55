//! RBAC & Policy (C7): namespaced table access patterns, per-role policy,
//! and the schema-version mismatch policy (spec §4.7).

pub mod error;
pub mod mismatch;
pub mod rbac;
pub mod types;

pub use error::RbacError;
pub use mismatch::{apply as apply_mismatch_policy, MismatchOutcome, MismatchPolicy};
pub use rbac::Rbac;
pub use types::{PolicyConfig, RolePolicy, RolePolicyConfig, TablePattern};
