//! Domain models for the security admin module.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::vocabulary::{DatabasePermission, ObjectPermission, PermissionCode, ServerPermission};

/// Kind of a grantable object.
///
/// The metadata source tags every object it returns with one of these values,
/// so no runtime inspection of object classes is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurableType {
    Server,
    Database,
    Schema,
    Table,
    View,
    Column,
    StoredProcedure,
    ExtendedStoredProcedure,
    ScalarFunction,
    TableValuedFunction,
    InlineFunction,
    AggregateFunction,
    Synonym,
    Sequence,
    UserDefinedDataType,
    UserDefinedTableType,
    UserDefinedType,
    XmlSchemaCollection,
    Assembly,
    Certificate,
    AsymmetricKey,
    SymmetricKey,
    FullTextCatalog,
    FullTextStopList,
    SearchPropertyList,
    MessageType,
    ServiceContract,
    BrokerService,
    ServiceQueue,
    RemoteServiceBinding,
    ServiceRoute,
    ExternalDataSource,
    ExternalFileFormat,
    DatabaseScopedCredential,
    User,
    DatabaseRole,
    ApplicationRole,
    Login,
    ServerRole,
    Endpoint,
    AvailabilityGroup,
}

/// Vocabulary a securable's permissions are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyScope {
    /// Object-level permissions ([`ObjectPermission`]).
    Object,
    /// Database-level permissions ([`DatabasePermission`]).
    Database,
    /// Server-level permissions ([`ServerPermission`]).
    Server,
}

impl SecurableType {
    /// Returns `true` for kinds that carry column-level permissions.
    #[must_use]
    pub fn has_columns(self) -> bool {
        matches!(
            self,
            Self::Table | Self::View | Self::TableValuedFunction | Self::InlineFunction
        )
    }

    /// Returns `true` for objects that live at server scope.
    #[must_use]
    pub fn is_server_scoped(self) -> bool {
        matches!(
            self,
            Self::Server | Self::Login | Self::ServerRole | Self::Endpoint | Self::AvailabilityGroup
        )
    }

    /// Returns `true` for objects that are contained in a schema.
    #[must_use]
    pub fn is_schema_scoped(self) -> bool {
        matches!(
            self,
            Self::Table
                | Self::View
                | Self::StoredProcedure
                | Self::ExtendedStoredProcedure
                | Self::ScalarFunction
                | Self::TableValuedFunction
                | Self::InlineFunction
                | Self::AggregateFunction
                | Self::Synonym
                | Self::Sequence
                | Self::UserDefinedDataType
                | Self::UserDefinedTableType
                | Self::UserDefinedType
                | Self::XmlSchemaCollection
                | Self::ServiceQueue
        )
    }

    /// Vocabulary in which permission codes for this kind are reported.
    #[must_use]
    pub fn vocabulary(self) -> VocabularyScope {
        match self {
            Self::Server => VocabularyScope::Server,
            Self::Database => VocabularyScope::Database,
            _ => VocabularyScope::Object,
        }
    }

    /// Human-readable name used in listings.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::Database => "Database",
            Self::Schema => "Schema",
            Self::Table => "Table",
            Self::View => "View",
            Self::Column => "Column",
            Self::StoredProcedure => "Stored Procedure",
            Self::ExtendedStoredProcedure => "Extended Stored Procedure",
            Self::ScalarFunction => "Scalar Function",
            Self::TableValuedFunction => "Table-valued Function",
            Self::InlineFunction => "Inline Function",
            Self::AggregateFunction => "Aggregate Function",
            Self::Synonym => "Synonym",
            Self::Sequence => "Sequence",
            Self::UserDefinedDataType => "User-Defined Data Type",
            Self::UserDefinedTableType => "User-Defined Table Type",
            Self::UserDefinedType => "User-Defined Type",
            Self::XmlSchemaCollection => "XML Schema Collection",
            Self::Assembly => "Assembly",
            Self::Certificate => "Certificate",
            Self::AsymmetricKey => "Asymmetric Key",
            Self::SymmetricKey => "Symmetric Key",
            Self::FullTextCatalog => "Full-Text Catalog",
            Self::FullTextStopList => "Full-Text Stoplist",
            Self::SearchPropertyList => "Search Property List",
            Self::MessageType => "Message Type",
            Self::ServiceContract => "Contract",
            Self::BrokerService => "Service",
            Self::ServiceQueue => "Queue",
            Self::RemoteServiceBinding => "Remote Service Binding",
            Self::ServiceRoute => "Route",
            Self::ExternalDataSource => "External Data Source",
            Self::ExternalFileFormat => "External File Format",
            Self::DatabaseScopedCredential => "Database Scoped Credential",
            Self::User => "User",
            Self::DatabaseRole => "Database Role",
            Self::ApplicationRole => "Application Role",
            Self::Login => "Login",
            Self::ServerRole => "Server Role",
            Self::Endpoint => "Endpoint",
            Self::AvailabilityGroup => "Availability Group",
        }
    }
}

impl std::fmt::Display for SecurableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Kind of a grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    Login,
    ServerRole,
    User,
    DatabaseRole,
    ApplicationRole,
}

impl PrincipalType {
    /// Returns `true` for server-level principals.
    #[must_use]
    pub fn is_server_scoped(self) -> bool {
        matches!(self, Self::Login | Self::ServerRole)
    }

    /// The securable kind under which this principal can itself be secured.
    #[must_use]
    pub fn as_securable_type(self) -> SecurableType {
        match self {
            Self::Login => SecurableType::Login,
            Self::ServerRole => SecurableType::ServerRole,
            Self::User => SecurableType::User,
            Self::DatabaseRole => SecurableType::DatabaseRole,
            Self::ApplicationRole => SecurableType::ApplicationRole,
        }
    }
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Login => "Login",
            Self::ServerRole => "Server Role",
            Self::User => "User",
            Self::DatabaseRole => "Database Role",
            Self::ApplicationRole => "Application Role",
        };
        f.write_str(s)
    }
}

/// Grant status of a single (securable, principal, permission) triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// No explicit grant or deny.
    #[default]
    Revoke,
    /// Granted.
    Grant,
    /// Granted with the right to grant onward.
    WithGrant,
    /// Explicitly denied.
    Deny,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Revoke => "revoke",
            Self::Grant => "grant",
            Self::WithGrant => "with grant",
            Self::Deny => "deny",
        };
        f.write_str(s)
    }
}

/// UI-facing status: a [`PermissionStatus`] or a summary of mixed children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    #[default]
    Revoke,
    Grant,
    WithGrant,
    Deny,
    PartialGrant,
    PartialWithGrant,
    PartialDeny,
    PartialGrantDeny,
    Indeterminate,
}

impl From<PermissionStatus> for DisplayStatus {
    fn from(status: PermissionStatus) -> Self {
        match status {
            PermissionStatus::Revoke => Self::Revoke,
            PermissionStatus::Grant => Self::Grant,
            PermissionStatus::WithGrant => Self::WithGrant,
            PermissionStatus::Deny => Self::Deny,
        }
    }
}

impl std::fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Revoke => "revoke",
            Self::Grant => "grant",
            Self::WithGrant => "with grant",
            Self::Deny => "deny",
            Self::PartialGrant => "partial grant",
            Self::PartialWithGrant => "partial with grant",
            Self::PartialDeny => "partial deny",
            Self::PartialGrantDeny => "partial grant/deny",
            Self::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

impl DisplayStatus {
    /// Returns `true` for the partial and indeterminate values.
    #[must_use]
    pub fn is_mixed(self) -> bool {
        matches!(
            self,
            Self::PartialGrant
                | Self::PartialWithGrant
                | Self::PartialDeny
                | Self::PartialGrantDeny
                | Self::Indeterminate
        )
    }
}

/// Server product version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
    #[serde(default)]
    pub build: u32,
}

impl ServerVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build }
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Hosting model of the database engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    #[default]
    Standalone,
    SqlAzureDatabase,
    SqlOnDemand,
}

/// Edition of the database engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEdition {
    #[default]
    Unknown,
    Personal,
    Standard,
    Enterprise,
    Express,
    SqlDatabase,
    SqlDataWarehouse,
    SqlStretchDatabase,
    SqlManagedInstance,
    SqlOnDemand,
}

/// Version and edition information for the connected server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: ServerVersion,
    #[serde(default)]
    pub engine_type: EngineType,
    #[serde(default)]
    pub engine_edition: EngineEdition,
}

/// Descriptor of a grantable object as returned by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurableInfo {
    /// Hierarchical path identifying the object.
    pub urn: String,
    /// Object name (column name for columns).
    pub name: String,
    /// Containing schema for schema-scoped objects and columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Object kind.
    #[serde(rename = "type")]
    pub securable_type: SecurableType,
    /// Containing database; `None` for server-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Descriptor of a grantee as returned by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    /// Containing database; `None` for logins and server roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// One enumerated permission entry for a (securable, grantee) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    /// Reported state; rows without a recognised state read as `Revoke`.
    #[serde(default)]
    pub state: PermissionStatus,
    /// Permission code in the vocabulary of the securable type.
    pub code: PermissionCode,
    /// Name of the principal that issued the grant or deny.
    #[serde(default)]
    pub grantor: String,
}

/// Schema name and owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: String,
}

/// Role name, owner and whether it is a built-in fixed role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub is_fixed: bool,
}

/// Object a permission call is issued against.
///
/// Each variant corresponds to a distinct call shape of the object model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionTarget {
    /// A schema-scoped or server-scoped object carrying object permissions.
    Object {
        urn: String,
        securable_type: SecurableType,
    },
    /// Columns of a table, view or function, routed through the owner object.
    Columns { parent_urn: String, columns: Vec<String> },
    /// A database.
    Database { name: String },
    /// The server itself.
    Server,
}

/// Set of permissions in one of the three external vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "permissions", rename_all = "snake_case")]
pub enum PermissionSet {
    Object(BTreeSet<ObjectPermission>),
    Database(BTreeSet<DatabasePermission>),
    Server(BTreeSet<ServerPermission>),
}

impl PermissionSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Object(s) => s.is_empty(),
            Self::Database(s) => s.is_empty(),
            Self::Server(s) => s.is_empty(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Object(s) => s.len(),
            Self::Database(s) => s.len(),
            Self::Server(s) => s.len(),
        }
    }

    /// SQL names of the contained permissions, in vocabulary order.
    #[must_use]
    pub fn sql_names(&self) -> Vec<&'static str> {
        match self {
            Self::Object(s) => s.iter().map(|p| p.sql_name()).collect(),
            Self::Database(s) => s.iter().map(|p| p.sql_name()).collect(),
            Self::Server(s) => s.iter().map(|p| p.sql_name()).collect(),
        }
    }
}

/// Options for a grant call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOptions {
    pub with_grant_option: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grantor: Option<String>,
}

/// Options for a deny call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyOptions {
    pub cascade: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grantor: Option<String>,
}

/// Options for a revoke call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeOptions {
    pub cascade: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grantor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_bearing_kinds() {
        assert!(SecurableType::Table.has_columns());
        assert!(SecurableType::View.has_columns());
        assert!(SecurableType::InlineFunction.has_columns());
        assert!(SecurableType::TableValuedFunction.has_columns());
        assert!(!SecurableType::ScalarFunction.has_columns());
        assert!(!SecurableType::Schema.has_columns());
    }

    #[test]
    fn vocabulary_follows_securable_kind() {
        assert_eq!(SecurableType::Server.vocabulary(), VocabularyScope::Server);
        assert_eq!(SecurableType::Database.vocabulary(), VocabularyScope::Database);
        assert_eq!(SecurableType::Login.vocabulary(), VocabularyScope::Object);
        assert_eq!(SecurableType::Column.vocabulary(), VocabularyScope::Object);
    }

    #[test]
    fn permission_row_state_defaults_to_revoke() {
        let row: PermissionRow = serde_json::from_str(r#"{"code": 11}"#).unwrap();
        assert_eq!(row.state, PermissionStatus::Revoke);
        assert_eq!(row.code, PermissionCode(11));
        assert!(row.grantor.is_empty());
    }

    #[test]
    fn securable_info_uses_type_key() {
        let json = r#"{"urn":"db/t","name":"t","schema":"dbo","type":"table","database":"db"}"#;
        let info: SecurableInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.securable_type, SecurableType::Table);
        assert_eq!(info.schema.as_deref(), Some("dbo"));
    }
}
