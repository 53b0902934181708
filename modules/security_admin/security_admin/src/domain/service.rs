//! Domain service for the security admin module.
//!
//! Orchestrates the collaborator traits: every metadata query is bounded by
//! the query timeout and every mutation call by the commit timeout. The
//! in-memory model is edited synchronously between calls.

use std::future::Future;
use std::sync::Arc;

use security_admin_sdk::{
    MetadataSource, PermissionMutator, PrincipalInfo, RoleMutator, SecurableInfo, SecurableType,
    SecurityAdminError,
};
use tracing::{debug, info};

use super::catalog::CatalogContext;
use super::collections::PermissionStateCollection;
use super::commit::{CommitLog, CommitPlan};
use super::error::DomainError;
use super::keys::{PrincipalKey, SecurableKey};
use super::population::{GrantRows, populate_permission_states};
use super::principal::Principal;
use super::roles::{DatabaseRole, RoleOperation, ServerRole, execute_role_operations};
use super::securable::Securable;
use crate::config::SecurityAdminConfig;

const DATABASE_OWNER: &str = "dbo";

/// Security admin service.
pub struct Service {
    source: Arc<dyn MetadataSource>,
    permissions: Arc<dyn PermissionMutator>,
    roles: Arc<dyn RoleMutator>,
    config: SecurityAdminConfig,
}

impl Service {
    #[must_use]
    pub fn new(
        source: Arc<dyn MetadataSource>,
        permissions: Arc<dyn PermissionMutator>,
        roles: Arc<dyn RoleMutator>,
        config: SecurityAdminConfig,
    ) -> Self {
        Self {
            source,
            permissions,
            roles,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SecurityAdminConfig {
        &self.config
    }

    async fn query<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, SecurityAdminError>>,
    ) -> Result<T, DomainError> {
        tokio::time::timeout(self.config.query_timeout(), call)
            .await
            .map_err(|_| DomainError::Timeout { operation })?
            .map_err(DomainError::from)
    }

    /// Server facts for the catalog, scoped to `database`.
    ///
    /// # Errors
    ///
    /// Metadata source errors and timeouts.
    pub async fn catalog_context(&self, database: Option<&str>) -> Result<CatalogContext, DomainError> {
        let server = self.query("server info", self.source.server_info()).await?;
        Ok(CatalogContext::new(&server, database))
    }

    /// Opens an existing securable by URN, columns included.
    ///
    /// # Errors
    ///
    /// - `Source(NotFound)` if no object has this URN
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(urn = %urn))]
    pub async fn open_securable(&self, urn: &str) -> Result<Securable, DomainError> {
        let info = self
            .query("find securable", self.source.find_securable(urn))
            .await?;
        self.build_securable(info, true).await
    }

    /// A securable that does not exist on the server yet.
    ///
    /// Its states are all `Revoke` baselines.
    ///
    /// # Errors
    ///
    /// Metadata source errors and timeouts.
    pub async fn new_securable(&self, info: SecurableInfo) -> Result<Securable, DomainError> {
        self.build_securable(info, false).await
    }

    async fn build_securable(&self, info: SecurableInfo, exists: bool) -> Result<Securable, DomainError> {
        let ctx = self.catalog_context(info.database.as_deref()).await?;
        let mut securable = Securable::new(info, exists, &ctx);
        let grantor = self.expected_grantor(&securable).await?;
        securable.set_expected_grantor(grantor);
        if exists && securable.is_column_parent() {
            let columns = self
                .query("columns", self.source.columns(securable.info()))
                .await?;
            securable.set_columns(columns, &ctx)?;
        }
        Ok(securable)
    }

    /// Grantor assumed for permissions nobody has granted yet: the owner of
    /// the containing schema, `dbo` for databases, nothing otherwise.
    async fn expected_grantor(&self, securable: &Securable) -> Result<Option<String>, DomainError> {
        let schema = match securable.securable_type() {
            SecurableType::Database => return Ok(Some(DATABASE_OWNER.to_owned())),
            SecurableType::Schema => Some(securable.name()),
            t if t.is_schema_scoped() => securable.info().schema.as_deref(),
            _ => None,
        };
        let (Some(schema), Some(database)) = (schema, securable.database()) else {
            return Ok(None);
        };
        let schemas = self.query("schemas", self.source.schemas(database)).await?;
        Ok(schemas
            .into_iter()
            .find(|s| s.name == schema)
            .map(|s| s.owner))
    }

    async fn load_states(
        &self,
        securable: &Securable,
        principal: &PrincipalInfo,
        principal_exists: bool,
    ) -> Result<PermissionStateCollection, DomainError> {
        let mut rows = GrantRows::default();
        if securable.exists() && principal_exists {
            rows.object = self
                .query(
                    "permission rows",
                    self.source.permission_rows(securable.info(), &principal.name),
                )
                .await?;
            for column in securable.columns() {
                let column_rows = self
                    .query(
                        "permission rows",
                        self.source.permission_rows(column.info(), &principal.name),
                    )
                    .await?;
                if !column_rows.is_empty() {
                    rows.columns.insert(column.name().to_owned(), column_rows);
                }
            }
        }
        Ok(populate_permission_states(
            securable,
            &PrincipalKey::from_info(principal),
            &rows,
            self.config.default_expected_grantor.as_deref(),
        ))
    }

    /// Tracks every principal holding a permission on `securable`.
    ///
    /// Returns the number of principals added.
    ///
    /// # Errors
    ///
    /// Metadata source errors and timeouts.
    #[tracing::instrument(skip_all, fields(securable = %securable.key()))]
    pub async fn load_securable_principals(&self, securable: &mut Securable) -> Result<usize, DomainError> {
        if !securable.exists() {
            return Ok(0);
        }
        let grantees = self
            .query("grantees", self.source.grantees(securable.info()))
            .await?;
        let mut added = 0;
        for principal in grantees {
            if securable.principal(&PrincipalKey::from_info(&principal)).is_some() {
                continue;
            }
            let states = self.load_states(securable, &principal, true).await?;
            securable.add_principal(principal, true, states);
            added += 1;
        }
        debug!(added, "loaded principals");
        Ok(added)
    }

    /// Starts tracking principal `name` on `securable`.
    ///
    /// # Errors
    ///
    /// - `Source(NotFound)` if the principal does not exist
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(securable = %securable.key(), principal = %name))]
    pub async fn add_principal_to_securable(
        &self,
        securable: &mut Securable,
        name: &str,
    ) -> Result<PrincipalKey, DomainError> {
        let database = if securable.securable_type().is_server_scoped() {
            None
        } else {
            securable.database()
        };
        let principal = self
            .query("find principal", self.source.find_principal(name, database))
            .await?;
        let key = PrincipalKey::from_info(&principal);
        let states = self.load_states(securable, &principal, true).await?;
        securable.add_principal(principal, true, states);
        Ok(key)
    }

    /// Opens an existing principal.
    ///
    /// # Errors
    ///
    /// - `Source(NotFound)` if the principal does not exist
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(principal = %name))]
    pub async fn open_principal(&self, name: &str, database: Option<&str>) -> Result<Principal, DomainError> {
        let info = self
            .query("find principal", self.source.find_principal(name, database))
            .await?;
        let ctx = self.catalog_context(info.database.as_deref()).await?;
        Ok(Principal::new(info, true, &ctx))
    }

    /// A principal that does not exist on the server yet.
    ///
    /// # Errors
    ///
    /// Metadata source errors and timeouts.
    pub async fn new_principal(&self, info: PrincipalInfo) -> Result<Principal, DomainError> {
        let ctx = self.catalog_context(info.database.as_deref()).await?;
        Ok(Principal::new(info, false, &ctx))
    }

    /// Tracks every securable `principal` holds a permission on.
    ///
    /// Kinds not relevant for the principal are skipped. Returns the number
    /// of securables added.
    ///
    /// # Errors
    ///
    /// Metadata source errors and timeouts.
    #[tracing::instrument(skip_all, fields(principal = %principal.key()))]
    pub async fn load_principal_securables(&self, principal: &mut Principal) -> Result<usize, DomainError> {
        if !principal.exists() {
            return Ok(0);
        }
        let infos = self
            .query(
                "securables for grantee",
                self.source.securables_for_grantee(principal.info()),
            )
            .await?;
        let mut added = 0;
        for info in infos {
            if !principal
                .relevant_securable_types()
                .contains(&info.securable_type)
            {
                debug!(urn = %info.urn, kind = %info.securable_type, "skipping irrelevant securable");
                continue;
            }
            if principal.securable(&SecurableKey::from_info(&info)).is_some() {
                continue;
            }
            let securable = self.build_securable(info, true).await?;
            let states = self.load_states(&securable, principal.info(), true).await?;
            principal.add_securable(securable, states)?;
            added += 1;
        }
        debug!(added, "loaded securables");
        Ok(added)
    }

    /// Starts tracking securable `urn` on `principal`.
    ///
    /// # Errors
    ///
    /// - `Source(NotFound)` if no object has this URN
    /// - `InvalidArgument` if the kind is not relevant for the principal
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(principal = %principal.key(), urn = %urn))]
    pub async fn add_securable_to_principal(
        &self,
        principal: &mut Principal,
        urn: &str,
    ) -> Result<SecurableKey, DomainError> {
        let securable = self.open_securable(urn).await?;
        let key = securable.key().clone();
        let states = self
            .load_states(&securable, principal.info(), principal.exists())
            .await?;
        principal.add_securable(securable, states)?;
        Ok(key)
    }

    /// Commits the changes on `securable` and resets it on success.
    ///
    /// # Errors
    ///
    /// `PartialCommit` with the operation log if a call fails; the model
    /// is left untouched in that case.
    #[tracing::instrument(skip_all, fields(securable = %securable.key()))]
    pub async fn apply_securable_changes(&self, securable: &mut Securable) -> Result<CommitLog, DomainError> {
        let plan = CommitPlan::for_securable(securable);
        let log = plan
            .execute(self.permissions.as_ref(), self.config.commit_timeout())
            .await?;
        securable.reset();
        info!(operations = log.total(), "securable changes applied");
        Ok(log)
    }

    /// Commits the changes of `principal` and resets it on success.
    ///
    /// # Errors
    ///
    /// `PartialCommit` with the operation log if a call fails.
    #[tracing::instrument(skip_all, fields(principal = %principal.key()))]
    pub async fn apply_principal_changes(&self, principal: &mut Principal) -> Result<CommitLog, DomainError> {
        let plan = CommitPlan::for_principal(principal);
        let log = plan
            .execute(self.permissions.as_ref(), self.config.commit_timeout())
            .await?;
        principal.reset();
        info!(operations = log.total(), "principal changes applied");
        Ok(log)
    }

    /// Re-reads the states of every tracked principal from the server.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if the URN now names an object of another kind
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(securable = %securable.key()))]
    pub async fn reload_securable(&self, securable: &mut Securable) -> Result<(), DomainError> {
        let info = self
            .query("find securable", self.source.find_securable(securable.urn()))
            .await?;
        if info.securable_type != securable.securable_type() {
            return Err(DomainError::TypeMismatch {
                name: info.urn,
                expected: securable.securable_type(),
                actual: info.securable_type,
            });
        }
        securable.replace_info(info);
        if securable.is_column_parent() {
            let ctx = self.catalog_context(securable.database()).await?;
            let columns = self
                .query("columns", self.source.columns(securable.info()))
                .await?;
            securable.set_columns(columns, &ctx)?;
        }

        let principals: Vec<PrincipalInfo> = securable
            .principals()
            .map(|e| e.principal.clone())
            .collect();
        for principal in principals {
            let states = self.load_states(securable, &principal, true).await?;
            securable.replace_states(&PrincipalKey::from_info(&principal), states);
        }
        securable.reset();
        Ok(())
    }

    /// Re-reads the states of `principal` on every tracked securable.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if a tracked URN now names an object of another kind
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(principal = %principal.key()))]
    pub async fn reload_principal(&self, principal: &mut Principal) -> Result<(), DomainError> {
        let info = self
            .query(
                "find principal",
                self.source
                    .find_principal(principal.name(), principal.database()),
            )
            .await?;
        if info.principal_type != principal.principal_type() {
            return Err(DomainError::TypeMismatch {
                name: info.name,
                expected: principal.principal_type().as_securable_type(),
                actual: info.principal_type.as_securable_type(),
            });
        }
        principal.set_exists();

        let tracked: Vec<(SecurableKey, String, SecurableType)> = principal
            .securables()
            .map(|e| {
                let s = &e.securable;
                (s.key().clone(), s.urn().to_owned(), s.securable_type())
            })
            .collect();
        for (key, urn, securable_type) in tracked {
            let found = self
                .query("find securable", self.source.find_securable(&urn))
                .await?;
            if found.securable_type != securable_type {
                return Err(DomainError::TypeMismatch {
                    name: found.urn,
                    expected: securable_type,
                    actual: found.securable_type,
                });
            }
            let securable = self.build_securable(found, true).await?;
            let states = self.load_states(&securable, principal.info(), true).await?;
            principal.replace_entry(&key, securable, states);
        }
        principal.reset();
        Ok(())
    }

    /// Opens an existing database role.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the role does not exist
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(database = %database, role = %name))]
    pub async fn open_database_role(&self, database: &str, name: &str) -> Result<DatabaseRole, DomainError> {
        let role = self
            .query("database role", self.source.database_role(database, name))
            .await?
            .ok_or_else(|| DomainError::not_found("database role", name))?;
        let schemas = self.query("schemas", self.source.schemas(database)).await?;
        let members = self
            .query("role members", self.source.role_members(Some(database), name))
            .await?;
        Ok(DatabaseRole::existing(
            database, role.name, role.owner, schemas, members,
        ))
    }

    /// A database role to be created.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the role already exists
    /// - metadata source errors and timeouts
    pub async fn new_database_role(&self, database: &str, name: &str) -> Result<DatabaseRole, DomainError> {
        if self
            .query("database role", self.source.database_role(database, name))
            .await?
            .is_some()
        {
            return Err(DomainError::invalid_argument(format!(
                "database role {name} already exists in {database}"
            )));
        }
        let schemas = self.query("schemas", self.source.schemas(database)).await?;
        Ok(DatabaseRole::new(database, name, schemas))
    }

    /// Applies the edits of a database role and resets it on success.
    ///
    /// Returns the issued calls.
    ///
    /// # Errors
    ///
    /// The first failing call's error; calls already issued are not undone.
    #[tracing::instrument(skip_all, fields(database = %role.database(), role = %role.name()))]
    pub async fn apply_database_role(&self, role: &mut DatabaseRole) -> Result<Vec<RoleOperation>, DomainError> {
        let ops = role.operations();
        execute_role_operations(&ops, self.roles.as_ref(), self.config.commit_timeout()).await?;
        role.reset();
        info!(operations = ops.len(), "database role applied");
        Ok(ops)
    }

    /// Opens an existing server role.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the role does not exist
    /// - metadata source errors and timeouts
    #[tracing::instrument(skip_all, fields(role = %name))]
    pub async fn open_server_role(&self, name: &str) -> Result<ServerRole, DomainError> {
        let role = self
            .query("server role", self.source.server_role(name))
            .await?
            .ok_or_else(|| DomainError::not_found("server role", name))?;
        let members = self
            .query("role members", self.source.role_members(None, name))
            .await?;
        let memberships = self
            .query("role memberships", self.source.role_memberships(None, name))
            .await?;
        Ok(ServerRole::existing(
            role.name,
            role.owner,
            role.is_fixed,
            members,
            memberships,
        ))
    }

    /// A server role to be created.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the role already exists
    /// - metadata source errors and timeouts
    pub async fn new_server_role(&self, name: &str) -> Result<ServerRole, DomainError> {
        if self
            .query("server role", self.source.server_role(name))
            .await?
            .is_some()
        {
            return Err(DomainError::invalid_argument(format!(
                "server role {name} already exists"
            )));
        }
        Ok(ServerRole::new(name))
    }

    /// Applies the edits of a server role and resets it on success.
    ///
    /// # Errors
    ///
    /// The first failing call's error.
    #[tracing::instrument(skip_all, fields(role = %role.name()))]
    pub async fn apply_server_role(&self, role: &mut ServerRole) -> Result<Vec<RoleOperation>, DomainError> {
        let ops = role.operations();
        execute_role_operations(&ops, self.roles.as_ref(), self.config.commit_timeout()).await?;
        role.reset();
        info!(operations = ops.len(), "server role applied");
        Ok(ops)
    }
}
