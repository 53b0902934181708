//! Write-path collaborator traits.
//!
//! These are the only calls the engine issues against the server. A
//! backend has no transaction spanning several calls: every call is applied
//! independently.

use async_trait::async_trait;

use crate::error::SecurityAdminError;
use crate::models::{DenyOptions, GrantOptions, PermissionSet, PermissionTarget, RevokeOptions};

/// Grant / deny / revoke on the four target shapes.
#[async_trait]
pub trait PermissionMutator: Send + Sync {
    /// Grant `permissions` on `target` to `grantee`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the permission set does not match the target shape
    /// - `NotFound` if the target or grantee does not exist
    async fn grant(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &GrantOptions,
    ) -> Result<(), SecurityAdminError>;

    /// Deny `permissions` on `target` to `grantee`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`PermissionMutator::grant`].
    async fn deny(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &DenyOptions,
    ) -> Result<(), SecurityAdminError>;

    /// Remove grants and denies of `permissions` on `target` for `grantee`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`PermissionMutator::grant`].
    async fn revoke(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &RevokeOptions,
    ) -> Result<(), SecurityAdminError>;
}

/// Role lifecycle, ownership and membership.
#[async_trait]
pub trait RoleMutator: Send + Sync {
    async fn create_database_role(
        &self,
        database: &str,
        name: &str,
        owner: Option<&str>,
    ) -> Result<(), SecurityAdminError>;

    async fn alter_database_role_owner(
        &self,
        database: &str,
        name: &str,
        owner: &str,
    ) -> Result<(), SecurityAdminError>;

    async fn add_database_role_member(
        &self,
        database: &str,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError>;

    async fn drop_database_role_member(
        &self,
        database: &str,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError>;

    /// Transfer ownership of `schema` to `owner`.
    async fn set_schema_owner(
        &self,
        database: &str,
        schema: &str,
        owner: &str,
    ) -> Result<(), SecurityAdminError>;

    async fn create_server_role(
        &self,
        name: &str,
        owner: Option<&str>,
    ) -> Result<(), SecurityAdminError>;

    async fn alter_server_role_owner(&self, name: &str, owner: &str)
    -> Result<(), SecurityAdminError>;

    async fn add_server_role_member(&self, role: &str, member: &str)
    -> Result<(), SecurityAdminError>;

    async fn drop_server_role_member(
        &self,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError>;

    /// Make server role `role` a member of server role `parent`.
    async fn add_server_role_membership(
        &self,
        role: &str,
        parent: &str,
    ) -> Result<(), SecurityAdminError>;

    /// Remove server role `role` from server role `parent`.
    async fn drop_server_role_membership(
        &self,
        role: &str,
        parent: &str,
    ) -> Result<(), SecurityAdminError>;
}
