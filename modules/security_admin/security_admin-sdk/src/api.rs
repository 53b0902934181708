//! Read-path collaborator trait.
//!
//! A metadata source answers hierarchical queries about a server: its
//! version, the objects it contains, and the permission rows recorded for
//! them. The query grammar of any concrete backend stays behind this trait.

use async_trait::async_trait;

use crate::error::SecurityAdminError;
use crate::models::{PermissionRow, PrincipalInfo, RoleInfo, SchemaInfo, SecurableInfo, ServerInfo};

/// Read-path API implemented by metadata backends.
///
/// Every method is a single round trip. Implementations must not retry;
/// failures are reported to the caller unchanged.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Version, engine type and edition of the server.
    async fn server_info(&self) -> Result<ServerInfo, SecurityAdminError>;

    /// Look up a securable by URN.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no object has this URN
    async fn find_securable(&self, urn: &str) -> Result<SecurableInfo, SecurityAdminError>;

    /// Look up a principal by name, in `database` or at server scope.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the principal does not exist
    async fn find_principal(
        &self,
        name: &str,
        database: Option<&str>,
    ) -> Result<PrincipalInfo, SecurityAdminError>;

    /// Columns of a table, view or table-valued function, in ordinal order.
    ///
    /// Returns an empty list for kinds without columns.
    async fn columns(
        &self,
        securable: &SecurableInfo,
    ) -> Result<Vec<SecurableInfo>, SecurityAdminError>;

    /// Permission rows recorded on `securable` for `grantee`.
    ///
    /// Columns are addressed by their own [`SecurableInfo`].
    async fn permission_rows(
        &self,
        securable: &SecurableInfo,
        grantee: &str,
    ) -> Result<Vec<PermissionRow>, SecurityAdminError>;

    /// Principals holding at least one permission row on `securable`
    /// (including rows on its columns).
    async fn grantees(
        &self,
        securable: &SecurableInfo,
    ) -> Result<Vec<PrincipalInfo>, SecurityAdminError>;

    /// Securables on which `principal` holds at least one permission row.
    ///
    /// Column rows are reported through their owning object.
    async fn securables_for_grantee(
        &self,
        principal: &PrincipalInfo,
    ) -> Result<Vec<SecurableInfo>, SecurityAdminError>;

    /// Schemas of a database with their owners.
    async fn schemas(&self, database: &str) -> Result<Vec<SchemaInfo>, SecurityAdminError>;

    /// Database role lookup. `Ok(None)` when the role does not exist.
    async fn database_role(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Option<RoleInfo>, SecurityAdminError>;

    /// Server role lookup. `Ok(None)` when the role does not exist.
    async fn server_role(&self, name: &str) -> Result<Option<RoleInfo>, SecurityAdminError>;

    /// Direct members of a role; `database == None` addresses a server role.
    async fn role_members(
        &self,
        database: Option<&str>,
        role: &str,
    ) -> Result<Vec<String>, SecurityAdminError>;

    /// Roles that `member` directly belongs to; `database == None` addresses
    /// server roles.
    async fn role_memberships(
        &self,
        database: Option<&str>,
        member: &str,
    ) -> Result<Vec<String>, SecurityAdminError>;
}
