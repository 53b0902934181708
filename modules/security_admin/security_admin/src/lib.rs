//! Security Admin Module
//!
//! Permission-state reconciliation for SQL securables and principals.
//!
//! The engine loads the current grant state of every relevant
//! (securable, principal, permission) triple from a [`MetadataSource`],
//! lets the caller toggle grants, denies and revokes in memory, and commits
//! the minimal diff through a [`PermissionMutator`] in a fixed order.
//! Database and server role façades cover ownership and membership.
//!
//! [`MetadataSource`]: security_admin_sdk::MetadataSource
//! [`PermissionMutator`]: security_admin_sdk::PermissionMutator

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;

pub use config::SecurityAdminConfig;
pub use domain::{
    CommitLog, CommitPlan, DatabaseRole, DomainError, Permission, PermissionState,
    PermissionStateCollection, Principal, PrincipalKey, Securable, SecurableKey, ServerRole,
    Service, StateAddress, StateChange,
};
