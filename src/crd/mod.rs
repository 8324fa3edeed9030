//! Custom Resource Definitions for the identity sync operator
//!
//! This module defines the IdentitySyncPolicy CRD and its status types.

mod identity_sync_policy;
mod types;


pub use identity_sync_policy::{
    is_dns_label, IdentitySyncPolicy, IdentitySyncPolicySpec, IdentitySyncPolicyStatus,
    MAX_TARGET_NAMESPACES,
};
pub use types::*;
