//! Security Admin SDK
//!
//! This crate provides the public contract of the `security_admin` module:
//!
//! - [`MetadataSource`] - read path: server info, securables, principals, permission rows
//! - [`PermissionMutator`] - write path for grant / deny / revoke calls
//! - [`RoleMutator`] - write path for role lifecycle and membership
//! - [`SecurableType`], [`PrincipalType`], [`PermissionStatus`], [`DisplayStatus`] - domain models
//! - [`ObjectPermission`], [`DatabasePermission`], [`ServerPermission`] - external permission vocabularies
//! - [`SecurityAdminError`] - error type returned by collaborators
//!
//! ## Usage
//!
//! Backends implement the collaborator traits; the engine crate consumes them:
//!
//! ```ignore
//! use security_admin_sdk::MetadataSource;
//!
//! let info = source.server_info().await?;
//! let rows = source.permission_rows(&table, "U1").await?;
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod mutation_api;
pub mod vocabulary;

// Re-export main types at crate root
pub use api::MetadataSource;
pub use error::SecurityAdminError;
pub use models::{
    DenyOptions, DisplayStatus, EngineEdition, EngineType, GrantOptions, PermissionRow,
    PermissionSet, PermissionStatus, PermissionTarget, PrincipalInfo, PrincipalType,
    RevokeOptions, RoleInfo, SchemaInfo, SecurableInfo, SecurableType, ServerInfo, ServerVersion,
    VocabularyScope,
};
pub use mutation_api::{PermissionMutator, RoleMutator};
pub use vocabulary::{DatabasePermission, ObjectPermission, PermissionCode, ServerPermission};
