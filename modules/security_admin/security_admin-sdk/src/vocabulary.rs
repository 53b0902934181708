//! External permission vocabularies.
//!
//! The object model exposes three separate permission enumerations: one for
//! schema-scoped and server-scoped objects, one for databases and one for the
//! server itself. Metadata rows carry a numeric [`PermissionCode`] that must be
//! read in the vocabulary implied by the securable type.

use serde::{Deserialize, Serialize};

/// Numeric permission code as reported by the metadata source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(pub u32);

impl std::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! permission_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $variant:ident = $code:literal => $sql:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                #[doc = $sql]
                $variant,
            )+
        }

        impl $name {
            /// Every value of this vocabulary, in code order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Code reported by the metadata source for this permission.
            #[must_use]
            pub const fn code(self) -> PermissionCode {
                match self {
                    $( $name::$variant => PermissionCode($code), )+
                }
            }

            /// Resolves a reported code. Unknown codes yield `None`.
            #[must_use]
            pub const fn from_code(code: PermissionCode) -> Option<Self> {
                match code.0 {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Permission name as written in a `GRANT` statement.
            #[must_use]
            pub const fn sql_name(self) -> &'static str {
                match self {
                    $( $name::$variant => $sql, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.sql_name())
            }
        }
    };
}

permission_vocabulary! {
    /// Permissions on schema-scoped objects, columns and server-scoped objects
    /// (logins, endpoints, server roles, availability groups).
    ObjectPermission {
        Alter = 1 => "ALTER",
        Connect = 2 => "CONNECT",
        Control = 3 => "CONTROL",
        CreateSequence = 4 => "CREATE SEQUENCE",
        Delete = 5 => "DELETE",
        Execute = 6 => "EXECUTE",
        Impersonate = 7 => "IMPERSONATE",
        Insert = 8 => "INSERT",
        Receive = 9 => "RECEIVE",
        References = 10 => "REFERENCES",
        Select = 11 => "SELECT",
        Send = 12 => "SEND",
        TakeOwnership = 13 => "TAKE OWNERSHIP",
        Update = 14 => "UPDATE",
        ViewChangeTracking = 15 => "VIEW CHANGE TRACKING",
        ViewDefinition = 16 => "VIEW DEFINITION",
        Unmask = 17 => "UNMASK",
    }
}

permission_vocabulary! {
    /// Database-level permissions.
    DatabasePermission {
        Alter = 1 => "ALTER",
        AlterAnyApplicationRole = 2 => "ALTER ANY APPLICATION ROLE",
        AlterAnyAssembly = 3 => "ALTER ANY ASSEMBLY",
        AlterAnyAsymmetricKey = 4 => "ALTER ANY ASYMMETRIC KEY",
        AlterAnyCertificate = 5 => "ALTER ANY CERTIFICATE",
        AlterAnyContract = 6 => "ALTER ANY CONTRACT",
        AlterAnyDatabaseAudit = 7 => "ALTER ANY DATABASE AUDIT",
        AlterAnyDatabaseDdlTrigger = 8 => "ALTER ANY DATABASE DDL TRIGGER",
        AlterAnyDatabaseEventNotification = 9 => "ALTER ANY DATABASE EVENT NOTIFICATION",
        AlterAnyDatabaseScopedConfiguration = 10 => "ALTER ANY DATABASE SCOPED CONFIGURATION",
        AlterAnyDataspace = 11 => "ALTER ANY DATASPACE",
        AlterAnyExternalDataSource = 12 => "ALTER ANY EXTERNAL DATA SOURCE",
        AlterAnyExternalFileFormat = 13 => "ALTER ANY EXTERNAL FILE FORMAT",
        AlterAnyFulltextCatalog = 14 => "ALTER ANY FULLTEXT CATALOG",
        AlterAnyMask = 15 => "ALTER ANY MASK",
        AlterAnyMessageType = 16 => "ALTER ANY MESSAGE TYPE",
        AlterAnyRemoteServiceBinding = 17 => "ALTER ANY REMOTE SERVICE BINDING",
        AlterAnyRole = 18 => "ALTER ANY ROLE",
        AlterAnyRoute = 19 => "ALTER ANY ROUTE",
        AlterAnySchema = 20 => "ALTER ANY SCHEMA",
        AlterAnySecurityPolicy = 21 => "ALTER ANY SECURITY POLICY",
        AlterAnyService = 22 => "ALTER ANY SERVICE",
        AlterAnySymmetricKey = 23 => "ALTER ANY SYMMETRIC KEY",
        AlterAnyUser = 24 => "ALTER ANY USER",
        Authenticate = 25 => "AUTHENTICATE",
        BackupDatabase = 26 => "BACKUP DATABASE",
        BackupLog = 27 => "BACKUP LOG",
        Checkpoint = 28 => "CHECKPOINT",
        Connect = 29 => "CONNECT",
        ConnectReplication = 30 => "CONNECT REPLICATION",
        Control = 31 => "CONTROL",
        CreateAggregate = 32 => "CREATE AGGREGATE",
        CreateAssembly = 33 => "CREATE ASSEMBLY",
        CreateAsymmetricKey = 34 => "CREATE ASYMMETRIC KEY",
        CreateCertificate = 35 => "CREATE CERTIFICATE",
        CreateContract = 36 => "CREATE CONTRACT",
        CreateDatabase = 37 => "CREATE DATABASE",
        CreateDatabaseDdlEventNotification = 38 => "CREATE DATABASE DDL EVENT NOTIFICATION",
        CreateDefault = 39 => "CREATE DEFAULT",
        CreateFulltextCatalog = 40 => "CREATE FULLTEXT CATALOG",
        CreateFunction = 41 => "CREATE FUNCTION",
        CreateMessageType = 42 => "CREATE MESSAGE TYPE",
        CreateProcedure = 43 => "CREATE PROCEDURE",
        CreateQueue = 44 => "CREATE QUEUE",
        CreateRemoteServiceBinding = 45 => "CREATE REMOTE SERVICE BINDING",
        CreateRole = 46 => "CREATE ROLE",
        CreateRoute = 47 => "CREATE ROUTE",
        CreateRule = 48 => "CREATE RULE",
        CreateSchema = 49 => "CREATE SCHEMA",
        CreateService = 50 => "CREATE SERVICE",
        CreateSymmetricKey = 51 => "CREATE SYMMETRIC KEY",
        CreateSynonym = 52 => "CREATE SYNONYM",
        CreateTable = 53 => "CREATE TABLE",
        CreateType = 54 => "CREATE TYPE",
        CreateView = 55 => "CREATE VIEW",
        CreateXmlSchemaCollection = 56 => "CREATE XML SCHEMA COLLECTION",
        Delete = 57 => "DELETE",
        Execute = 58 => "EXECUTE",
        ExecuteAnyExternalScript = 59 => "EXECUTE ANY EXTERNAL SCRIPT",
        Insert = 60 => "INSERT",
        KillDatabaseConnection = 61 => "KILL DATABASE CONNECTION",
        References = 62 => "REFERENCES",
        Select = 63 => "SELECT",
        Showplan = 64 => "SHOWPLAN",
        SubscribeQueryNotifications = 65 => "SUBSCRIBE QUERY NOTIFICATIONS",
        TakeOwnership = 66 => "TAKE OWNERSHIP",
        Unmask = 67 => "UNMASK",
        Update = 68 => "UPDATE",
        ViewDatabaseState = 69 => "VIEW DATABASE STATE",
        ViewDefinition = 70 => "VIEW DEFINITION",
    }
}

permission_vocabulary! {
    /// Server-level permissions.
    ServerPermission {
        AdministerBulkOperations = 1 => "ADMINISTER BULK OPERATIONS",
        AlterAnyAvailabilityGroup = 2 => "ALTER ANY AVAILABILITY GROUP",
        AlterAnyConnection = 3 => "ALTER ANY CONNECTION",
        AlterAnyCredential = 4 => "ALTER ANY CREDENTIAL",
        AlterAnyDatabase = 5 => "ALTER ANY DATABASE",
        AlterAnyEndpoint = 6 => "ALTER ANY ENDPOINT",
        AlterAnyEventNotification = 7 => "ALTER ANY EVENT NOTIFICATION",
        AlterAnyEventSession = 8 => "ALTER ANY EVENT SESSION",
        AlterAnyLinkedServer = 9 => "ALTER ANY LINKED SERVER",
        AlterAnyLogin = 10 => "ALTER ANY LOGIN",
        AlterAnyServerAudit = 11 => "ALTER ANY SERVER AUDIT",
        AlterAnyServerRole = 12 => "ALTER ANY SERVER ROLE",
        AlterResources = 13 => "ALTER RESOURCES",
        AlterServerState = 14 => "ALTER SERVER STATE",
        AlterSettings = 15 => "ALTER SETTINGS",
        AlterTrace = 16 => "ALTER TRACE",
        AuthenticateServer = 17 => "AUTHENTICATE SERVER",
        ConnectAnyDatabase = 18 => "CONNECT ANY DATABASE",
        ConnectSql = 19 => "CONNECT SQL",
        ControlServer = 20 => "CONTROL SERVER",
        CreateAnyDatabase = 21 => "CREATE ANY DATABASE",
        CreateAvailabilityGroup = 22 => "CREATE AVAILABILITY GROUP",
        CreateDdlEventNotification = 23 => "CREATE DDL EVENT NOTIFICATION",
        CreateEndpoint = 24 => "CREATE ENDPOINT",
        CreateServerRole = 25 => "CREATE SERVER ROLE",
        CreateTraceEventNotification = 26 => "CREATE TRACE EVENT NOTIFICATION",
        ExternalAccessAssembly = 27 => "EXTERNAL ACCESS ASSEMBLY",
        ImpersonateAnyLogin = 28 => "IMPERSONATE ANY LOGIN",
        SelectAllUserSecurables = 29 => "SELECT ALL USER SECURABLES",
        Shutdown = 30 => "SHUTDOWN",
        UnsafeAssembly = 31 => "UNSAFE ASSEMBLY",
        ViewAnyDatabase = 32 => "VIEW ANY DATABASE",
        ViewAnyDefinition = 33 => "VIEW ANY DEFINITION",
        ViewServerState = 34 => "VIEW SERVER STATE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_resolve_back_to_the_same_value() {
        for p in ObjectPermission::ALL {
            assert_eq!(ObjectPermission::from_code(p.code()), Some(*p));
        }
        for p in DatabasePermission::ALL {
            assert_eq!(DatabasePermission::from_code(p.code()), Some(*p));
        }
        for p in ServerPermission::ALL {
            assert_eq!(ServerPermission::from_code(p.code()), Some(*p));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(ObjectPermission::from_code(PermissionCode(9999)), None);
        assert_eq!(ServerPermission::from_code(PermissionCode(0)), None);
    }

    #[test]
    fn display_uses_sql_name() {
        assert_eq!(ObjectPermission::TakeOwnership.to_string(), "TAKE OWNERSHIP");
        assert_eq!(ServerPermission::ConnectSql.to_string(), "CONNECT SQL");
    }
}
