//! Client implementation for the static catalog plugin.
//!
//! Implements `MetadataSource`, `PermissionMutator` and `RoleMutator` using
//! the domain service.

use std::collections::BTreeSet;

use async_trait::async_trait;
use security_admin_sdk::{
    DenyOptions, GrantOptions, MetadataSource, PermissionCode, PermissionMutator, PermissionRow,
    PermissionSet, PermissionStatus, PermissionTarget, PrincipalInfo, PrincipalType,
    RevokeOptions, RoleInfo, RoleMutator, SchemaInfo, SecurableInfo, SecurityAdminError,
    ServerInfo,
};

use super::service::{
    Catalog, Service, StoredRow, describe_target, is_grant, set_codes,
};

impl Service {
    /// Resolves a permission call into (urn, code) pairs after validating
    /// the target, vocabulary and grantee.
    fn permission_cells(
        &self,
        catalog: &Catalog,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
    ) -> Result<Vec<(String, PermissionCode)>, SecurityAdminError> {
        let (urns, target_scope) = self.resolve_target(target)?;
        let (set_scope, codes) = set_codes(permissions);
        if set_scope != target_scope {
            return Err(SecurityAdminError::invalid_argument(format!(
                "permission set does not match {}",
                describe_target(target)
            )));
        }
        if !catalog.has_grantee(grantee) {
            return Err(SecurityAdminError::not_found("principal", grantee));
        }
        Ok(urns
            .iter()
            .flat_map(|urn| codes.iter().map(move |code| (urn.clone(), *code)))
            .collect())
    }

    fn ensure_database(&self, database: &str) -> Result<(), SecurityAdminError> {
        if self.catalog.read().schemas.contains_key(database) {
            Ok(())
        } else {
            Err(SecurityAdminError::not_found("database", database))
        }
    }
}

fn matches_cell(stored: &StoredRow, urn: &str, grantee: &str, code: PermissionCode) -> bool {
    stored.urn == urn && stored.grantee.eq_ignore_ascii_case(grantee) && stored.row.code == code
}

fn grant_suffix(grantor: Option<&str>) -> String {
    grantor.map(|g| format!(" AS {g}")).unwrap_or_default()
}

#[async_trait]
impl MetadataSource for Service {
    async fn server_info(&self) -> Result<ServerInfo, SecurityAdminError> {
        Ok(self.server)
    }

    async fn find_securable(&self, urn: &str) -> Result<SecurableInfo, SecurityAdminError> {
        self.securables
            .get(urn)
            .cloned()
            .ok_or_else(|| SecurityAdminError::not_found("securable", urn))
    }

    async fn find_principal(
        &self,
        name: &str,
        database: Option<&str>,
    ) -> Result<PrincipalInfo, SecurityAdminError> {
        self.catalog
            .read()
            .principal(name, database)
            .cloned()
            .ok_or_else(|| SecurityAdminError::not_found("principal", name))
    }

    async fn columns(
        &self,
        securable: &SecurableInfo,
    ) -> Result<Vec<SecurableInfo>, SecurityAdminError> {
        Ok(self.columns.get(&securable.urn).cloned().unwrap_or_default())
    }

    async fn permission_rows(
        &self,
        securable: &SecurableInfo,
        grantee: &str,
    ) -> Result<Vec<PermissionRow>, SecurityAdminError> {
        Ok(self
            .catalog
            .read()
            .rows
            .iter()
            .filter(|r| r.urn == securable.urn && r.grantee.eq_ignore_ascii_case(grantee))
            .map(|r| r.row.clone())
            .collect())
    }

    async fn grantees(
        &self,
        securable: &SecurableInfo,
    ) -> Result<Vec<PrincipalInfo>, SecurityAdminError> {
        let catalog = self.catalog.read();
        let names: BTreeSet<&str> = catalog
            .rows
            .iter()
            .filter(|r| self.owner_of(&r.urn) == securable.urn)
            .map(|r| r.grantee.as_str())
            .collect();
        Ok(names
            .into_iter()
            .filter_map(|name| catalog.principal(name, securable.database.as_deref()))
            .cloned()
            .collect())
    }

    async fn securables_for_grantee(
        &self,
        principal: &PrincipalInfo,
    ) -> Result<Vec<SecurableInfo>, SecurityAdminError> {
        let catalog = self.catalog.read();
        let urns: BTreeSet<&str> = catalog
            .rows
            .iter()
            .filter(|r| r.grantee.eq_ignore_ascii_case(&principal.name))
            .map(|r| self.owner_of(&r.urn))
            .collect();
        Ok(urns
            .into_iter()
            .filter_map(|urn| self.securables.get(urn))
            .filter(|s| s.database == principal.database)
            .cloned()
            .collect())
    }

    async fn schemas(&self, database: &str) -> Result<Vec<SchemaInfo>, SecurityAdminError> {
        self.catalog
            .read()
            .schemas
            .get(database)
            .cloned()
            .ok_or_else(|| SecurityAdminError::not_found("database", database))
    }

    async fn database_role(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Option<RoleInfo>, SecurityAdminError> {
        self.ensure_database(database)?;
        Ok(self
            .catalog
            .read()
            .database_roles
            .get(&(database.to_owned(), name.to_owned()))
            .cloned())
    }

    async fn server_role(&self, name: &str) -> Result<Option<RoleInfo>, SecurityAdminError> {
        Ok(self.catalog.read().server_roles.get(name).cloned())
    }

    async fn role_members(
        &self,
        database: Option<&str>,
        role: &str,
    ) -> Result<Vec<String>, SecurityAdminError> {
        Ok(self
            .catalog
            .read()
            .members
            .get(&(database.map(str::to_owned), role.to_owned()))
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn role_memberships(
        &self,
        database: Option<&str>,
        member: &str,
    ) -> Result<Vec<String>, SecurityAdminError> {
        let catalog = self.catalog.read();
        let mut roles: Vec<String> = catalog
            .members
            .iter()
            .filter(|((db, _), members)| db.as_deref() == database && members.contains(member))
            .map(|((_, role), _)| role.clone())
            .collect();
        roles.sort();
        Ok(roles)
    }
}

#[async_trait]
impl PermissionMutator for Service {
    async fn grant(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &GrantOptions,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        let cells = self.permission_cells(&catalog, target, permissions, grantee)?;
        let grantor = options
            .grantor
            .as_deref()
            .unwrap_or_else(|| self.target_grantor(target));
        let state = if options.with_grant_option {
            PermissionStatus::WithGrant
        } else {
            PermissionStatus::Grant
        };
        for (urn, code) in cells {
            catalog.rows.retain(|r| {
                !(matches_cell(r, &urn, grantee, code)
                    && (r.row.state == PermissionStatus::Deny
                        || (is_grant(r.row.state) && r.row.grantor == grantor)))
            });
            catalog.rows.push(StoredRow {
                urn,
                grantee: grantee.to_owned(),
                row: PermissionRow {
                    state,
                    code,
                    grantor: grantor.to_owned(),
                },
            });
        }
        self.record(format!(
            "GRANT {} ON {} TO {grantee}{}{}",
            permissions.sql_names().join(", "),
            describe_target(target),
            if options.with_grant_option {
                " WITH GRANT OPTION"
            } else {
                ""
            },
            grant_suffix(options.grantor.as_deref()),
        ));
        Ok(())
    }

    async fn deny(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &DenyOptions,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        let cells = self.permission_cells(&catalog, target, permissions, grantee)?;
        let grantor = options
            .grantor
            .as_deref()
            .unwrap_or_else(|| self.target_grantor(target));
        for (urn, code) in cells {
            catalog
                .rows
                .retain(|r| !matches_cell(r, &urn, grantee, code));
            catalog.rows.push(StoredRow {
                urn,
                grantee: grantee.to_owned(),
                row: PermissionRow {
                    state: PermissionStatus::Deny,
                    code,
                    grantor: grantor.to_owned(),
                },
            });
        }
        self.record(format!(
            "DENY {} ON {} TO {grantee}{}{}",
            permissions.sql_names().join(", "),
            describe_target(target),
            if options.cascade { " CASCADE" } else { "" },
            grant_suffix(options.grantor.as_deref()),
        ));
        Ok(())
    }

    async fn revoke(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &RevokeOptions,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        let cells = self.permission_cells(&catalog, target, permissions, grantee)?;
        let grantor = options.grantor.as_deref();
        for (urn, code) in cells {
            catalog.rows.retain(|r| {
                !(matches_cell(r, &urn, grantee, code)
                    && grantor.is_none_or(|g| r.row.grantor == g))
            });
        }
        self.record(format!(
            "REVOKE {} ON {} FROM {grantee}{}{}",
            permissions.sql_names().join(", "),
            describe_target(target),
            if options.cascade { " CASCADE" } else { "" },
            grant_suffix(grantor),
        ));
        Ok(())
    }
}

#[async_trait]
impl RoleMutator for Service {
    async fn create_database_role(
        &self,
        database: &str,
        name: &str,
        owner: Option<&str>,
    ) -> Result<(), SecurityAdminError> {
        self.ensure_database(database)?;
        let mut catalog = self.catalog.write();
        let key = (database.to_owned(), name.to_owned());
        if catalog.database_roles.contains_key(&key) {
            return Err(SecurityAdminError::invalid_argument(format!(
                "role {name} already exists in {database}"
            )));
        }
        catalog.database_roles.insert(
            key,
            RoleInfo {
                name: name.to_owned(),
                owner: owner.map(str::to_owned),
                is_fixed: false,
            },
        );
        catalog.principals.push(PrincipalInfo {
            name: name.to_owned(),
            principal_type: PrincipalType::DatabaseRole,
            database: Some(database.to_owned()),
        });
        catalog
            .members
            .insert((Some(database.to_owned()), name.to_owned()), BTreeSet::new());
        self.record(format!(
            "CREATE ROLE {database}.{name}{}",
            owner.map(|o| format!(" AUTHORIZATION {o}")).unwrap_or_default()
        ));
        Ok(())
    }

    async fn alter_database_role_owner(
        &self,
        database: &str,
        name: &str,
        owner: &str,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        let role = catalog
            .database_roles
            .get_mut(&(database.to_owned(), name.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("database role", name))?;
        if role.is_fixed {
            return Err(SecurityAdminError::invalid_argument(format!(
                "fixed role {name} cannot be altered"
            )));
        }
        role.owner = Some(owner.to_owned());
        self.record(format!(
            "ALTER AUTHORIZATION ON ROLE::{database}.{name} TO {owner}"
        ));
        Ok(())
    }

    async fn add_database_role_member(
        &self,
        database: &str,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        if catalog.principal(member, Some(database)).is_none() {
            return Err(SecurityAdminError::not_found("principal", member));
        }
        catalog
            .members
            .get_mut(&(Some(database.to_owned()), role.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("database role", role))?
            .insert(member.to_owned());
        self.record(format!("ALTER ROLE {database}.{role} ADD MEMBER {member}"));
        Ok(())
    }

    async fn drop_database_role_member(
        &self,
        database: &str,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError> {
        self.catalog
            .write()
            .members
            .get_mut(&(Some(database.to_owned()), role.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("database role", role))?
            .remove(member);
        self.record(format!("ALTER ROLE {database}.{role} DROP MEMBER {member}"));
        Ok(())
    }

    async fn set_schema_owner(
        &self,
        database: &str,
        schema: &str,
        owner: &str,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        if catalog.principal(owner, Some(database)).is_none() {
            return Err(SecurityAdminError::not_found("principal", owner));
        }
        let entry = catalog
            .schemas
            .get_mut(database)
            .ok_or_else(|| SecurityAdminError::not_found("database", database))?
            .iter_mut()
            .find(|s| s.name == schema)
            .ok_or_else(|| SecurityAdminError::not_found("schema", schema))?;
        owner.clone_into(&mut entry.owner);
        self.record(format!(
            "ALTER AUTHORIZATION ON SCHEMA::{database}.{schema} TO {owner}"
        ));
        Ok(())
    }

    async fn create_server_role(
        &self,
        name: &str,
        owner: Option<&str>,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        if catalog.server_roles.contains_key(name) {
            return Err(SecurityAdminError::invalid_argument(format!(
                "server role {name} already exists"
            )));
        }
        catalog.server_roles.insert(
            name.to_owned(),
            RoleInfo {
                name: name.to_owned(),
                owner: owner.map(str::to_owned),
                is_fixed: false,
            },
        );
        catalog.principals.push(PrincipalInfo {
            name: name.to_owned(),
            principal_type: PrincipalType::ServerRole,
            database: None,
        });
        catalog.members.insert((None, name.to_owned()), BTreeSet::new());
        self.record(format!(
            "CREATE SERVER ROLE {name}{}",
            owner.map(|o| format!(" AUTHORIZATION {o}")).unwrap_or_default()
        ));
        Ok(())
    }

    async fn alter_server_role_owner(&self, name: &str, owner: &str)
    -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        let role = catalog
            .server_roles
            .get_mut(name)
            .ok_or_else(|| SecurityAdminError::not_found("server role", name))?;
        if role.is_fixed {
            return Err(SecurityAdminError::invalid_argument(format!(
                "fixed role {name} cannot be altered"
            )));
        }
        role.owner = Some(owner.to_owned());
        self.record(format!("ALTER AUTHORIZATION ON SERVER ROLE::{name} TO {owner}"));
        Ok(())
    }

    async fn add_server_role_member(&self, role: &str, member: &str)
    -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        if catalog.principal(member, None).is_none() {
            return Err(SecurityAdminError::not_found("principal", member));
        }
        catalog
            .members
            .get_mut(&(None, role.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("server role", role))?
            .insert(member.to_owned());
        self.record(format!("ALTER SERVER ROLE {role} ADD MEMBER {member}"));
        Ok(())
    }

    async fn drop_server_role_member(
        &self,
        role: &str,
        member: &str,
    ) -> Result<(), SecurityAdminError> {
        self.catalog
            .write()
            .members
            .get_mut(&(None, role.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("server role", role))?
            .remove(member);
        self.record(format!("ALTER SERVER ROLE {role} DROP MEMBER {member}"));
        Ok(())
    }

    async fn add_server_role_membership(
        &self,
        role: &str,
        parent: &str,
    ) -> Result<(), SecurityAdminError> {
        let mut catalog = self.catalog.write();
        if !catalog.server_roles.contains_key(role) {
            return Err(SecurityAdminError::not_found("server role", role));
        }
        catalog
            .members
            .get_mut(&(None, parent.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("server role", parent))?
            .insert(role.to_owned());
        self.record(format!("ALTER SERVER ROLE {parent} ADD MEMBER {role}"));
        Ok(())
    }

    async fn drop_server_role_membership(
        &self,
        role: &str,
        parent: &str,
    ) -> Result<(), SecurityAdminError> {
        self.catalog
            .write()
            .members
            .get_mut(&(None, parent.to_owned()))
            .ok_or_else(|| SecurityAdminError::not_found("server role", parent))?
            .remove(role);
        self.record(format!("ALTER SERVER ROLE {parent} DROP MEMBER {role}"));
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_admin_sdk::{DatabasePermission, ObjectPermission, SecurableType};

    use super::*;
    use crate::config::{
        DatabaseConfig, GrantConfig, ObjectConfig, PermissionRef, RoleConfig,
        StaticCatalogPluginConfig,
    };
    use crate::urn;

    fn table_urn() -> String {
        urn::database_object("sales", SecurableType::Table, Some("dbo"), "t1")
    }

    fn service() -> Service {
        Service::from_config(&StaticCatalogPluginConfig {
            logins: vec!["L1".to_owned()],
            server_roles: vec![RoleConfig {
                name: "sysadmin".to_owned(),
                owner: None,
                is_fixed: true,
                members: vec!["L1".to_owned()],
            }],
            databases: vec![DatabaseConfig {
                name: "sales".to_owned(),
                schemas: vec![SchemaInfo {
                    name: "dbo".to_owned(),
                    owner: "dbo".to_owned(),
                }],
                users: vec!["U1".to_owned(), "U2".to_owned()],
                roles: vec![RoleConfig {
                    name: "readers".to_owned(),
                    owner: Some("dbo".to_owned()),
                    is_fixed: false,
                    members: vec!["U2".to_owned()],
                }],
                application_roles: Vec::new(),
                objects: vec![ObjectConfig {
                    name: "t1".to_owned(),
                    schema: Some("dbo".to_owned()),
                    securable_type: SecurableType::Table,
                    columns: vec!["c1".to_owned()],
                }],
            }],
            grants: vec![GrantConfig {
                on: urn::column(&table_urn(), "c1"),
                grantee: "U1".to_owned(),
                permission: PermissionRef::Name("SELECT".to_owned()),
                state: PermissionStatus::Deny,
                grantor: Some("dbo".to_owned()),
            }],
            ..StaticCatalogPluginConfig::default()
        })
    }

    fn select() -> PermissionSet {
        PermissionSet::Object([ObjectPermission::Select].into())
    }

    fn table_target() -> PermissionTarget {
        PermissionTarget::Object {
            urn: table_urn(),
            securable_type: SecurableType::Table,
        }
    }

    #[tokio::test]
    async fn column_rows_report_through_the_owning_object() {
        let svc = service();
        let user = svc.find_principal("U1", Some("sales")).await.unwrap();
        let securables = svc.securables_for_grantee(&user).await.unwrap();
        assert_eq!(securables.len(), 1);
        assert_eq!(securables[0].urn, table_urn());

        let table = svc.find_securable(&table_urn()).await.unwrap();
        let grantees = svc.grantees(&table).await.unwrap();
        assert_eq!(grantees, vec![user]);
        assert!(svc.permission_rows(&table, "U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn grant_replaces_deny_and_revoke_clears() {
        let svc = service();
        let target = PermissionTarget::Columns {
            parent_urn: table_urn(),
            columns: vec!["c1".to_owned()],
        };
        let column = svc
            .find_securable(&urn::column(&table_urn(), "c1"))
            .await
            .unwrap();

        svc.grant(&target, &select(), "U1", &GrantOptions::default())
            .await
            .unwrap();
        let rows = svc.permission_rows(&column, "U1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, PermissionStatus::Grant);

        svc.revoke(&target, &select(), "U1", &RevokeOptions::default())
            .await
            .unwrap();
        assert!(svc.permission_rows(&column, "U1").await.unwrap().is_empty());

        assert_eq!(
            svc.calls(),
            vec![
                format!("GRANT SELECT ON {}(c1) TO U1", table_urn()),
                format!("REVOKE SELECT ON {}(c1) FROM U1", table_urn()),
            ]
        );
    }

    #[tokio::test]
    async fn deny_with_cascade_is_logged() {
        let svc = service();
        svc.deny(
            &table_target(),
            &select(),
            "U2",
            &DenyOptions {
                cascade: true,
                grantor: Some("dbo".to_owned()),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            svc.calls(),
            vec![format!("DENY SELECT ON {} TO U2 CASCADE AS dbo", table_urn())]
        );
    }

    #[tokio::test]
    async fn mismatched_vocabulary_is_rejected() {
        let svc = service();
        let err = svc
            .grant(
                &table_target(),
                &PermissionSet::Database([DatabasePermission::CreateTable].into()),
                "U1",
                &GrantOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityAdminError::InvalidArgument(_)));
        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_grantee_is_not_found() {
        let svc = service();
        let err = svc
            .grant(&table_target(), &select(), "ghost", &GrantOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityAdminError::NotFound { .. }));
    }

    #[tokio::test]
    async fn database_role_lifecycle() {
        let svc = service();
        svc.create_database_role("sales", "writers", Some("dbo"))
            .await
            .unwrap();
        svc.add_database_role_member("sales", "writers", "U1")
            .await
            .unwrap();
        svc.set_schema_owner("sales", "dbo", "writers").await.unwrap();

        assert_eq!(
            svc.role_members(Some("sales"), "writers").await.unwrap(),
            vec!["U1".to_owned()]
        );
        assert_eq!(
            svc.role_memberships(Some("sales"), "U2").await.unwrap(),
            vec!["readers".to_owned()]
        );
        assert_eq!(svc.schemas("sales").await.unwrap()[0].owner, "writers");
        assert!(
            svc.create_database_role("sales", "writers", None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn fixed_server_role_cannot_change_owner() {
        let svc = service();
        let err = svc
            .alter_server_role_owner("sysadmin", "L1")
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityAdminError::InvalidArgument(_)));

        svc.create_server_role("auditors", None).await.unwrap();
        svc.add_server_role_membership("auditors", "sysadmin")
            .await
            .unwrap();
        assert_eq!(
            svc.role_memberships(None, "auditors").await.unwrap(),
            vec!["sysadmin".to_owned()]
        );
    }
}
