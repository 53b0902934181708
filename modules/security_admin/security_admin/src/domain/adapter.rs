//! Translation from permission changes to mutation call shapes.

use std::collections::BTreeSet;

use security_admin_sdk::{PermissionSet, PermissionTarget, SecurableType, VocabularyScope};
use tracing::warn;

use super::permission::Permission;
use super::securable::Securable;

/// Call shape of the object a batch is issued against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionsAdapter {
    /// Object permissions on a schema- or server-scoped object.
    Object {
        urn: String,
        securable_type: SecurableType,
    },
    /// Object permissions on one column, routed through the owning object.
    Column { parent_urn: String, column: String },
    Database { name: String },
    Server,
}

impl PermissionsAdapter {
    /// Adapter for a securable's own permissions.
    #[must_use]
    pub fn for_securable(securable: &Securable) -> Self {
        match securable.securable_type() {
            SecurableType::Server => Self::Server,
            SecurableType::Database => Self::Database {
                name: securable.name().to_owned(),
            },
            securable_type => Self::Object {
                urn: securable.urn().to_owned(),
                securable_type,
            },
        }
    }

    /// Adapter for one column of `parent`.
    #[must_use]
    pub fn for_column(parent: &Securable, column: &str) -> Self {
        Self::Column {
            parent_urn: parent.urn().to_owned(),
            column: column.to_owned(),
        }
    }

    #[must_use]
    pub fn scope(&self) -> VocabularyScope {
        match self {
            Self::Object { .. } | Self::Column { .. } => VocabularyScope::Object,
            Self::Database { .. } => VocabularyScope::Database,
            Self::Server => VocabularyScope::Server,
        }
    }

    #[must_use]
    pub fn target(&self) -> PermissionTarget {
        match self {
            Self::Object {
                urn,
                securable_type,
            } => PermissionTarget::Object {
                urn: urn.clone(),
                securable_type: *securable_type,
            },
            Self::Column { parent_urn, column } => PermissionTarget::Columns {
                parent_urn: parent_urn.clone(),
                columns: vec![column.clone()],
            },
            Self::Database { name } => PermissionTarget::Database { name: name.clone() },
            Self::Server => PermissionTarget::Server,
        }
    }

    /// Maps permissions into this adapter's vocabulary.
    ///
    /// Permissions without a value in the vocabulary are skipped with a
    /// warning.
    #[must_use]
    pub fn permission_set(&self, permissions: &[Permission]) -> PermissionSet {
        let scope = self.scope();
        for p in permissions.iter().filter(|p| !p.supports(scope)) {
            warn!(permission = %p, ?scope, "permission has no equivalent for target, skipping");
        }
        match scope {
            VocabularyScope::Object => PermissionSet::Object(
                permissions.iter().filter_map(|p| p.object()).collect::<BTreeSet<_>>(),
            ),
            VocabularyScope::Database => PermissionSet::Database(
                permissions.iter().filter_map(|p| p.database()).collect::<BTreeSet<_>>(),
            ),
            VocabularyScope::Server => PermissionSet::Server(
                permissions.iter().filter_map(|p| p.server()).collect::<BTreeSet<_>>(),
            ),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_admin_sdk::{DatabasePermission, SecurableInfo, ServerPermission};

    use super::*;
    use crate::domain::catalog::CatalogContext;

    fn securable(securable_type: SecurableType, name: &str) -> Securable {
        Securable::new(
            SecurableInfo {
                urn: format!("urn/{name}"),
                name: name.to_owned(),
                schema: None,
                securable_type,
                database: None,
            },
            true,
            &CatalogContext::default(),
        )
    }

    #[test]
    fn shape_follows_securable_kind() {
        assert_eq!(
            PermissionsAdapter::for_securable(&securable(SecurableType::Server, "srv")),
            PermissionsAdapter::Server
        );
        assert_eq!(
            PermissionsAdapter::for_securable(&securable(SecurableType::Database, "sales")).target(),
            PermissionTarget::Database {
                name: "sales".to_owned()
            }
        );
        let table = securable(SecurableType::Table, "t");
        assert_eq!(
            PermissionsAdapter::for_column(&table, "c").target(),
            PermissionTarget::Columns {
                parent_urn: "urn/t".to_owned(),
                columns: vec!["c".to_owned()],
            }
        );
    }

    #[test]
    fn unmappable_permissions_are_skipped() {
        let select = Permission::by_name("SELECT").unwrap();
        let control_server = Permission::by_name("CONTROL SERVER").unwrap();
        let create_table = Permission::by_name("CREATE TABLE").unwrap();

        let db = PermissionsAdapter::Database {
            name: "sales".to_owned(),
        };
        let set = db.permission_set(&[select, create_table, control_server]);
        assert_eq!(
            set,
            PermissionSet::Database(
                [DatabasePermission::Select, DatabasePermission::CreateTable].into()
            )
        );

        let set = PermissionsAdapter::Server.permission_set(&[select, control_server]);
        assert_eq!(set, PermissionSet::Server([ServerPermission::ControlServer].into()));
    }
}
