//! Domain service for the static catalog plugin.

use std::collections::{BTreeSet, HashMap};

use parking_lot::{Mutex, RwLock};
use security_admin_sdk::{
    DatabasePermission, ObjectPermission, PermissionCode, PermissionRow, PermissionSet,
    PermissionStatus, PermissionTarget, PrincipalInfo, PrincipalType, RoleInfo, SchemaInfo,
    SecurableInfo, SecurableType, SecurityAdminError, ServerInfo, ServerPermission,
    VocabularyScope,
};
use tracing::warn;

use crate::config::{
    DatabaseConfig, GrantConfig, ObjectConfig, PermissionRef, RoleConfig, StaticCatalogPluginConfig,
};
use crate::urn;

/// Role membership key: `None` database addresses a server role.
pub(super) type RoleKey = (Option<String>, String);

/// `dbo` inside a database; server-scope rows carry no grantor.
fn default_grantor(in_database: bool) -> &'static str {
    if in_database { "dbo" } else { "" }
}

/// One stored permission row.
#[derive(Debug, Clone)]
pub(super) struct StoredRow {
    pub(super) urn: String,
    pub(super) grantee: String,
    pub(super) row: PermissionRow,
}

/// Mutable part of the catalog.
#[derive(Debug, Default)]
pub(super) struct Catalog {
    pub(super) principals: Vec<PrincipalInfo>,
    pub(super) schemas: HashMap<String, Vec<SchemaInfo>>,
    pub(super) database_roles: HashMap<(String, String), RoleInfo>,
    pub(super) server_roles: HashMap<String, RoleInfo>,
    pub(super) members: HashMap<RoleKey, BTreeSet<String>>,
    pub(super) rows: Vec<StoredRow>,
}

impl Catalog {
    pub(super) fn principal(&self, name: &str, database: Option<&str>) -> Option<&PrincipalInfo> {
        self.principals
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name) && p.database.as_deref() == database)
    }

    pub(super) fn has_grantee(&self, name: &str) -> bool {
        self.principals
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Static catalog service.
///
/// Objects are fixed at construction; principals, roles, schema owners and
/// permission rows change as mutation calls are applied. Every call is
/// recorded in a call log.
pub struct Service {
    pub(super) server: ServerInfo,
    /// Securables by URN, columns included.
    pub(super) securables: HashMap<String, SecurableInfo>,
    /// Column descriptors by owning object URN.
    pub(super) columns: HashMap<String, Vec<SecurableInfo>>,
    /// Owning object URN by column URN.
    pub(super) column_parents: HashMap<String, String>,
    pub(super) catalog: RwLock<Catalog>,
    pub(super) calls: Mutex<Vec<String>>,
}

impl Service {
    /// Creates a new service from configuration.
    ///
    /// Grant rows naming an unknown object or permission are skipped.
    #[must_use]
    pub fn from_config(cfg: &StaticCatalogPluginConfig) -> Self {
        let mut service = Self {
            server: cfg.server,
            securables: HashMap::new(),
            columns: HashMap::new(),
            column_parents: HashMap::new(),
            catalog: RwLock::new(Catalog::default()),
            calls: Mutex::new(Vec::new()),
        };
        let mut catalog = Catalog::default();

        service.add_securable(SecurableInfo {
            urn: urn::SERVER.to_owned(),
            name: urn::SERVER.to_owned(),
            schema: None,
            securable_type: SecurableType::Server,
            database: None,
        });
        for login in &cfg.logins {
            service.add_securable(server_securable(SecurableType::Login, login));
            catalog.principals.push(principal(login, PrincipalType::Login, None));
        }
        for role in &cfg.server_roles {
            service.add_securable(server_securable(SecurableType::ServerRole, &role.name));
            catalog
                .principals
                .push(principal(&role.name, PrincipalType::ServerRole, None));
            catalog
                .members
                .insert((None, role.name.clone()), role.members.iter().cloned().collect());
            catalog.server_roles.insert(role.name.clone(), role_info(role));
        }
        for object in &cfg.server_objects {
            service.add_securable(server_securable(object.securable_type, &object.name));
        }

        for db in &cfg.databases {
            service.add_database(&mut catalog, db);
        }
        catalog.rows = service.stored_rows(&cfg.grants);

        service.catalog = RwLock::new(catalog);
        service
    }

    fn add_database(&mut self, catalog: &mut Catalog, db: &DatabaseConfig) {
        let name = db.name.as_str();
        self.add_securable(SecurableInfo {
            urn: urn::database(name),
            name: name.to_owned(),
            schema: None,
            securable_type: SecurableType::Database,
            database: Some(name.to_owned()),
        });
        for schema in &db.schemas {
            self.add_securable(database_securable(name, SecurableType::Schema, None, &schema.name));
        }
        catalog.schemas.insert(name.to_owned(), db.schemas.clone());

        let principals = db
            .users
            .iter()
            .map(|u| (u, PrincipalType::User))
            .chain(db.roles.iter().map(|r| (&r.name, PrincipalType::DatabaseRole)))
            .chain(
                db.application_roles
                    .iter()
                    .map(|a| (a, PrincipalType::ApplicationRole)),
            );
        for (principal_name, principal_type) in principals {
            self.add_securable(database_securable(
                name,
                principal_type.as_securable_type(),
                None,
                principal_name,
            ));
            catalog
                .principals
                .push(principal(principal_name, principal_type, Some(name)));
        }
        for role in &db.roles {
            let key = (name.to_owned(), role.name.clone());
            catalog.members.insert(
                (Some(name.to_owned()), role.name.clone()),
                role.members.iter().cloned().collect(),
            );
            catalog.database_roles.insert(key, role_info(role));
        }
        for object in &db.objects {
            self.add_object(name, object);
        }
    }

    fn stored_rows(&self, grants: &[GrantConfig]) -> Vec<StoredRow> {
        let mut rows = Vec::new();
        for grant in grants {
            let Some(securable) = self.securables.get(&grant.on) else {
                warn!(urn = %grant.on, "grant on unknown object, skipping");
                continue;
            };
            let code = match &grant.permission {
                PermissionRef::Code(code) => Some(*code),
                PermissionRef::Name(permission) => {
                    code_by_name(securable.securable_type.vocabulary(), permission)
                }
            };
            let Some(code) = code else {
                warn!(urn = %grant.on, permission = ?grant.permission, "unknown permission, skipping");
                continue;
            };
            rows.push(StoredRow {
                urn: grant.on.clone(),
                grantee: grant.grantee.clone(),
                row: PermissionRow {
                    state: grant.state,
                    code,
                    grantor: grant
                        .grantor
                        .clone()
                        .unwrap_or_else(|| default_grantor(securable.database.is_some()).to_owned()),
                },
            });
        }
        rows
    }

    fn add_securable(&mut self, info: SecurableInfo) {
        self.securables.insert(info.urn.clone(), info);
    }

    fn add_object(&mut self, database: &str, object: &ObjectConfig) {
        let info = database_securable(
            database,
            object.securable_type,
            object.schema.as_deref(),
            &object.name,
        );
        let columns: Vec<SecurableInfo> = object
            .columns
            .iter()
            .map(|c| SecurableInfo {
                urn: urn::column(&info.urn, c),
                name: c.clone(),
                schema: object.schema.clone(),
                securable_type: SecurableType::Column,
                database: Some(database.to_owned()),
            })
            .collect();
        for column in &columns {
            self.column_parents
                .insert(column.urn.clone(), info.urn.clone());
            self.add_securable(column.clone());
        }
        if !columns.is_empty() {
            self.columns.insert(info.urn.clone(), columns);
        }
        self.add_securable(info);
    }

    /// Calls recorded so far, in issue order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(super) fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    /// URNs and vocabulary of the objects a permission call addresses.
    /// Grantor recorded for a call that names none.
    pub(super) fn target_grantor(&self, target: &PermissionTarget) -> &'static str {
        let in_database = match target {
            PermissionTarget::Object { urn, .. }
            | PermissionTarget::Columns {
                parent_urn: urn, ..
            } => self
                .securables
                .get(urn)
                .is_some_and(|s| s.database.is_some()),
            PermissionTarget::Database { .. } => true,
            PermissionTarget::Server => false,
        };
        default_grantor(in_database)
    }

    pub(super) fn resolve_target(
        &self,
        target: &PermissionTarget,
    ) -> Result<(Vec<String>, VocabularyScope), SecurityAdminError> {
        match target {
            PermissionTarget::Object {
                urn,
                securable_type,
            } => {
                let info = self
                    .securables
                    .get(urn)
                    .ok_or_else(|| SecurityAdminError::not_found("securable", urn.clone()))?;
                if info.securable_type != *securable_type {
                    return Err(SecurityAdminError::invalid_argument(format!(
                        "{urn} is a {}, not a {securable_type}",
                        info.securable_type
                    )));
                }
                Ok((vec![urn.clone()], VocabularyScope::Object))
            }
            PermissionTarget::Columns {
                parent_urn,
                columns,
            } => {
                if !self.securables.contains_key(parent_urn) {
                    return Err(SecurityAdminError::not_found("securable", parent_urn.clone()));
                }
                let urns = columns
                    .iter()
                    .map(|c| {
                        let column_urn = urn::column(parent_urn, c);
                        if self.securables.contains_key(&column_urn) {
                            Ok(column_urn)
                        } else {
                            Err(SecurityAdminError::not_found("column", column_urn))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((urns, VocabularyScope::Object))
            }
            PermissionTarget::Database { name } => {
                let database_urn = urn::database(name);
                if !self.securables.contains_key(&database_urn) {
                    return Err(SecurityAdminError::not_found("database", name.clone()));
                }
                Ok((vec![database_urn], VocabularyScope::Database))
            }
            PermissionTarget::Server => Ok((vec![urn::SERVER.to_owned()], VocabularyScope::Server)),
        }
    }

    /// Owning object for column URNs, the URN itself otherwise.
    pub(super) fn owner_of<'a>(&'a self, urn: &'a str) -> &'a str {
        self.column_parents.get(urn).map_or(urn, String::as_str)
    }
}

fn principal(name: &str, principal_type: PrincipalType, database: Option<&str>) -> PrincipalInfo {
    PrincipalInfo {
        name: name.to_owned(),
        principal_type,
        database: database.map(str::to_owned),
    }
}

fn role_info(role: &RoleConfig) -> RoleInfo {
    RoleInfo {
        name: role.name.clone(),
        owner: role.owner.clone(),
        is_fixed: role.is_fixed,
    }
}

fn server_securable(securable_type: SecurableType, name: &str) -> SecurableInfo {
    SecurableInfo {
        urn: urn::server_object(securable_type, name),
        name: name.to_owned(),
        schema: None,
        securable_type,
        database: None,
    }
}

fn database_securable(
    database: &str,
    securable_type: SecurableType,
    schema: Option<&str>,
    name: &str,
) -> SecurableInfo {
    SecurableInfo {
        urn: urn::database_object(database, securable_type, schema, name),
        name: name.to_owned(),
        schema: schema.map(str::to_owned),
        securable_type,
        database: Some(database.to_owned()),
    }
}

/// Code of the permission named `name` in `scope`'s vocabulary.
pub(super) fn code_by_name(scope: VocabularyScope, name: &str) -> Option<PermissionCode> {
    let name = name.trim();
    match scope {
        VocabularyScope::Object => ObjectPermission::ALL
            .iter()
            .find(|p| p.sql_name().eq_ignore_ascii_case(name))
            .map(|p| p.code()),
        VocabularyScope::Database => DatabasePermission::ALL
            .iter()
            .find(|p| p.sql_name().eq_ignore_ascii_case(name))
            .map(|p| p.code()),
        VocabularyScope::Server => ServerPermission::ALL
            .iter()
            .find(|p| p.sql_name().eq_ignore_ascii_case(name))
            .map(|p| p.code()),
    }
}

/// Vocabulary and codes of a permission set.
pub(super) fn set_codes(set: &PermissionSet) -> (VocabularyScope, Vec<PermissionCode>) {
    match set {
        PermissionSet::Object(s) => (VocabularyScope::Object, s.iter().map(|p| p.code()).collect()),
        PermissionSet::Database(s) => {
            (VocabularyScope::Database, s.iter().map(|p| p.code()).collect())
        }
        PermissionSet::Server(s) => (VocabularyScope::Server, s.iter().map(|p| p.code()).collect()),
    }
}

/// Short call-log form of a target.
pub(super) fn describe_target(target: &PermissionTarget) -> String {
    match target {
        PermissionTarget::Object { urn, .. } => urn.clone(),
        PermissionTarget::Columns {
            parent_urn,
            columns,
        } => format!("{parent_urn}({})", columns.join(", ")),
        PermissionTarget::Database { name } => format!("DATABASE::{name}"),
        PermissionTarget::Server => "SERVER".to_owned(),
    }
}

/// Returns `true` if `state` is a grant of either flavour.
pub(super) fn is_grant(state: PermissionStatus) -> bool {
    matches!(state, PermissionStatus::Grant | PermissionStatus::WithGrant)
}
