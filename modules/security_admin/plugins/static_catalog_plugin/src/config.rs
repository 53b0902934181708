//! Configuration for the static catalog plugin.

use security_admin_sdk::{PermissionCode, PermissionStatus, SchemaInfo, SecurableType, ServerInfo};
use serde::Deserialize;

/// Plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticCatalogPluginConfig {
    /// Version and edition reported for the server.
    pub server: ServerInfo,

    /// Login names.
    pub logins: Vec<String>,

    /// Server roles with their members.
    pub server_roles: Vec<RoleConfig>,

    /// Server-scoped objects other than logins and server roles
    /// (endpoints, availability groups).
    pub server_objects: Vec<ObjectConfig>,

    /// Databases with their schemas, principals and objects.
    pub databases: Vec<DatabaseConfig>,

    /// Permission rows present at start-up.
    pub grants: Vec<GrantConfig>,
}

/// Configuration for a single database.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub name: String,

    #[serde(default)]
    pub schemas: Vec<SchemaInfo>,

    /// Database user names.
    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub roles: Vec<RoleConfig>,

    #[serde(default)]
    pub application_roles: Vec<String>,

    /// Schema-scoped and database-scoped objects.
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

/// Configuration for a role.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub name: String,

    #[serde(default)]
    pub owner: Option<String>,

    /// Built-in roles cannot be altered.
    #[serde(default)]
    pub is_fixed: bool,

    #[serde(default)]
    pub members: Vec<String>,
}

/// Configuration for a grantable object.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    pub name: String,

    #[serde(default)]
    pub schema: Option<String>,

    #[serde(rename = "type")]
    pub securable_type: SecurableType,

    /// Column names, in ordinal order.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Permission reference in a grant row: a vocabulary name such as
/// `"CREATE TABLE"`, or a raw code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Code(PermissionCode),
    Name(String),
}

/// Configuration for one permission row.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantConfig {
    /// URN of the object, see [`crate::urn`].
    pub on: String,

    pub grantee: String,

    pub permission: PermissionRef,

    #[serde(default = "default_grant_state")]
    pub state: PermissionStatus,

    /// Defaults to `dbo` inside a database and to none on the server.
    #[serde(default)]
    pub grantor: Option<String>,
}

fn default_grant_state() -> PermissionStatus {
    PermissionStatus::Grant
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn grant_defaults() {
        let grant: GrantConfig = serde_json::from_str(
            r#"{"on": "Server", "grantee": "L1", "permission": "CONTROL SERVER"}"#,
        )
        .unwrap();
        assert_eq!(grant.state, PermissionStatus::Grant);
        assert_eq!(grant.grantor, None);
        assert_eq!(grant.permission, PermissionRef::Name("CONTROL SERVER".to_owned()));
    }

    #[test]
    fn permission_may_be_a_raw_code() {
        let grant: GrantConfig = serde_json::from_str(
            r#"{"on": "Server", "grantee": "L1", "permission": 9999, "state": "deny"}"#,
        )
        .unwrap();
        assert_eq!(grant.permission, PermissionRef::Code(PermissionCode(9999)));
        assert_eq!(grant.state, PermissionStatus::Deny);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<StaticCatalogPluginConfig, _> =
            serde_json::from_str(r#"{"certificates": []}"#);
        assert!(result.is_err());
    }
}
