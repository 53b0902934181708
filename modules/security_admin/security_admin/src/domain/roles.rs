//! Database and server role façades.
//!
//! Both keep the loaded values next to the edited ones and turn the
//! difference into an ordered list of [`RoleOperation`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use security_admin_sdk::{RoleMutator, SchemaInfo};
use serde::Serialize;
use tracing::debug;

use super::error::DomainError;

/// One role lifecycle, ownership or membership call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoleOperation {
    CreateDatabaseRole {
        database: String,
        name: String,
        owner: Option<String>,
    },
    AlterDatabaseRoleOwner {
        database: String,
        name: String,
        owner: String,
    },
    SetSchemaOwner {
        database: String,
        schema: String,
        owner: String,
    },
    AddDatabaseRoleMember {
        database: String,
        role: String,
        member: String,
    },
    DropDatabaseRoleMember {
        database: String,
        role: String,
        member: String,
    },
    CreateServerRole {
        name: String,
        owner: Option<String>,
    },
    AlterServerRoleOwner {
        name: String,
        owner: String,
    },
    AddServerRoleMember {
        role: String,
        member: String,
    },
    DropServerRoleMember {
        role: String,
        member: String,
    },
    AddServerRoleMembership {
        role: String,
        parent: String,
    },
    DropServerRoleMembership {
        role: String,
        parent: String,
    },
}

impl RoleOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateDatabaseRole { .. } => "create database role",
            Self::AlterDatabaseRoleOwner { .. } => "alter database role owner",
            Self::SetSchemaOwner { .. } => "set schema owner",
            Self::AddDatabaseRoleMember { .. } => "add database role member",
            Self::DropDatabaseRoleMember { .. } => "drop database role member",
            Self::CreateServerRole { .. } => "create server role",
            Self::AlterServerRoleOwner { .. } => "alter server role owner",
            Self::AddServerRoleMember { .. } => "add server role member",
            Self::DropServerRoleMember { .. } => "drop server role member",
            Self::AddServerRoleMembership { .. } => "add server role membership",
            Self::DropServerRoleMembership { .. } => "drop server role membership",
        }
    }

    async fn issue(&self, mutator: &dyn RoleMutator) -> Result<(), security_admin_sdk::SecurityAdminError> {
        match self {
            Self::CreateDatabaseRole {
                database,
                name,
                owner,
            } => {
                mutator
                    .create_database_role(database, name, owner.as_deref())
                    .await
            }
            Self::AlterDatabaseRoleOwner {
                database,
                name,
                owner,
            } => mutator.alter_database_role_owner(database, name, owner).await,
            Self::SetSchemaOwner {
                database,
                schema,
                owner,
            } => mutator.set_schema_owner(database, schema, owner).await,
            Self::AddDatabaseRoleMember {
                database,
                role,
                member,
            } => mutator.add_database_role_member(database, role, member).await,
            Self::DropDatabaseRoleMember {
                database,
                role,
                member,
            } => mutator.drop_database_role_member(database, role, member).await,
            Self::CreateServerRole { name, owner } => {
                mutator.create_server_role(name, owner.as_deref()).await
            }
            Self::AlterServerRoleOwner { name, owner } => {
                mutator.alter_server_role_owner(name, owner).await
            }
            Self::AddServerRoleMember { role, member } => {
                mutator.add_server_role_member(role, member).await
            }
            Self::DropServerRoleMember { role, member } => {
                mutator.drop_server_role_member(role, member).await
            }
            Self::AddServerRoleMembership { role, parent } => {
                mutator.add_server_role_membership(role, parent).await
            }
            Self::DropServerRoleMembership { role, parent } => {
                mutator.drop_server_role_membership(role, parent).await
            }
        }
    }
}

/// Issues `operations` in order, each bounded by `timeout`.
///
/// # Errors
///
/// Stops at the first failing call and returns its error.
pub async fn execute_role_operations(
    operations: &[RoleOperation],
    mutator: &dyn RoleMutator,
    timeout: Duration,
) -> Result<(), DomainError> {
    for op in operations {
        debug!(?op, "issuing role call");
        tokio::time::timeout(timeout, op.issue(mutator))
            .await
            .map_err(|_| DomainError::Timeout {
                operation: op.name(),
            })??;
    }
    Ok(())
}

/// A database role: owner, owned schemas and members.
#[derive(Debug, Clone)]
pub struct DatabaseRole {
    database: String,
    name: String,
    exists: bool,
    original_owner: Option<String>,
    owner: Option<String>,
    schemas: BTreeMap<String, String>,
    original_owned: BTreeSet<String>,
    owned: BTreeSet<String>,
    released: BTreeMap<String, String>,
    original_members: BTreeSet<String>,
    members: BTreeSet<String>,
}

impl DatabaseRole {
    /// A role that does not exist yet.
    #[must_use]
    pub fn new(database: impl Into<String>, name: impl Into<String>, schemas: Vec<SchemaInfo>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            exists: false,
            original_owner: None,
            owner: None,
            schemas: schemas.into_iter().map(|s| (s.name, s.owner)).collect(),
            original_owned: BTreeSet::new(),
            owned: BTreeSet::new(),
            released: BTreeMap::new(),
            original_members: BTreeSet::new(),
            members: BTreeSet::new(),
        }
    }

    /// A role loaded from the server.
    #[must_use]
    pub fn existing(
        database: impl Into<String>,
        name: impl Into<String>,
        owner: Option<String>,
        schemas: Vec<SchemaInfo>,
        members: Vec<String>,
    ) -> Self {
        let mut role = Self::new(database, name, schemas);
        role.exists = true;
        role.original_owner.clone_from(&owner);
        role.owner = owner;
        role.original_owned = role
            .schemas
            .iter()
            .filter(|(_, owner)| **owner == role.name)
            .map(|(schema, _)| schema.clone())
            .collect();
        role.owned = role.original_owned.clone();
        role.original_members = members.into_iter().collect();
        role.members = role.original_members.clone();
        role
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    /// Schemas of the database in name order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn owned_schemas(&self) -> impl Iterator<Item = &str> {
        self.owned.iter().map(String::as_str)
    }

    /// Makes the role the owner of `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the database has no such schema.
    pub fn own_schema(&mut self, schema: &str) -> Result<(), DomainError> {
        if !self.schemas.contains_key(schema) {
            return Err(DomainError::not_found("schema", schema));
        }
        self.released.remove(schema);
        self.owned.insert(schema.to_owned());
        Ok(())
    }

    /// Hands a schema the role owns over to `new_owner`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] if the role does not own the
    /// schema or `new_owner` is the role itself.
    pub fn release_schema(&mut self, schema: &str, new_owner: &str) -> Result<(), DomainError> {
        if !self.owned.contains(schema) {
            return Err(DomainError::invalid_argument(format!(
                "role {} does not own schema {schema}",
                self.name
            )));
        }
        if new_owner == self.name {
            return Err(DomainError::invalid_argument(format!(
                "schema {schema} must be released to another principal"
            )));
        }
        self.owned.remove(schema);
        if self.original_owned.contains(schema) {
            self.released.insert(schema.to_owned(), new_owner.to_owned());
        }
        Ok(())
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Returns `false` if `member` already belongs to the role.
    pub fn add_member(&mut self, member: impl Into<String>) -> bool {
        self.members.insert(member.into())
    }

    /// Returns `false` if `member` did not belong to the role.
    pub fn remove_member(&mut self, member: &str) -> bool {
        self.members.remove(member)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.exists || !self.operations().is_empty()
    }

    /// Calls needed to apply the edits, in issue order.
    #[must_use]
    pub fn operations(&self) -> Vec<RoleOperation> {
        let mut ops = Vec::new();
        if !self.exists {
            ops.push(RoleOperation::CreateDatabaseRole {
                database: self.database.clone(),
                name: self.name.clone(),
                owner: self.owner.clone(),
            });
        } else if self.owner != self.original_owner
            && let Some(owner) = &self.owner
        {
            ops.push(RoleOperation::AlterDatabaseRoleOwner {
                database: self.database.clone(),
                name: self.name.clone(),
                owner: owner.clone(),
            });
        }

        for schema in self.owned.difference(&self.original_owned) {
            ops.push(RoleOperation::SetSchemaOwner {
                database: self.database.clone(),
                schema: schema.clone(),
                owner: self.name.clone(),
            });
        }
        for (schema, owner) in &self.released {
            ops.push(RoleOperation::SetSchemaOwner {
                database: self.database.clone(),
                schema: schema.clone(),
                owner: owner.clone(),
            });
        }

        for member in self.members.difference(&self.original_members) {
            ops.push(RoleOperation::AddDatabaseRoleMember {
                database: self.database.clone(),
                role: self.name.clone(),
                member: member.clone(),
            });
        }
        for member in self.original_members.difference(&self.members) {
            ops.push(RoleOperation::DropDatabaseRoleMember {
                database: self.database.clone(),
                role: self.name.clone(),
                member: member.clone(),
            });
        }
        ops
    }

    /// Accepts the edited values as loaded.
    pub fn reset(&mut self) {
        self.exists = true;
        self.original_owner.clone_from(&self.owner);
        for (schema, owner) in std::mem::take(&mut self.released) {
            self.schemas.insert(schema, owner);
        }
        for schema in &self.owned {
            self.schemas.insert(schema.clone(), self.name.clone());
        }
        self.original_owned.clone_from(&self.owned);
        self.original_members.clone_from(&self.members);
    }
}

/// A server role: owner, members and memberships in other server roles.
#[derive(Debug, Clone)]
pub struct ServerRole {
    name: String,
    exists: bool,
    is_fixed: bool,
    original_owner: Option<String>,
    owner: Option<String>,
    original_members: BTreeSet<String>,
    members: BTreeSet<String>,
    original_memberships: BTreeSet<String>,
    memberships: BTreeSet<String>,
}

impl ServerRole {
    /// A role that does not exist yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            is_fixed: false,
            original_owner: None,
            owner: None,
            original_members: BTreeSet::new(),
            members: BTreeSet::new(),
            original_memberships: BTreeSet::new(),
            memberships: BTreeSet::new(),
        }
    }

    /// A role loaded from the server.
    #[must_use]
    pub fn existing(
        name: impl Into<String>,
        owner: Option<String>,
        is_fixed: bool,
        members: Vec<String>,
        memberships: Vec<String>,
    ) -> Self {
        let members: BTreeSet<String> = members.into_iter().collect();
        let memberships: BTreeSet<String> = memberships.into_iter().collect();
        Self {
            name: name.into(),
            exists: true,
            is_fixed,
            original_owner: owner.clone(),
            owner,
            original_members: members.clone(),
            members,
            original_memberships: memberships.clone(),
            memberships,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.is_fixed
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for fixed roles.
    pub fn set_owner(&mut self, owner: Option<String>) -> Result<(), DomainError> {
        self.ensure_not_fixed("owner")?;
        self.owner = owner;
        Ok(())
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn add_member(&mut self, member: impl Into<String>) -> bool {
        self.members.insert(member.into())
    }

    pub fn remove_member(&mut self, member: &str) -> bool {
        self.members.remove(member)
    }

    pub fn memberships(&self) -> impl Iterator<Item = &str> {
        self.memberships.iter().map(String::as_str)
    }

    /// Makes this role a member of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for fixed roles or when
    /// `parent` is the role itself.
    pub fn add_membership(&mut self, parent: impl Into<String>) -> Result<bool, DomainError> {
        self.ensure_not_fixed("memberships")?;
        let parent = parent.into();
        if parent == self.name {
            return Err(DomainError::invalid_argument(format!(
                "server role {} cannot be a member of itself",
                self.name
            )));
        }
        Ok(self.memberships.insert(parent))
    }

    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for fixed roles.
    pub fn remove_membership(&mut self, parent: &str) -> Result<bool, DomainError> {
        self.ensure_not_fixed("memberships")?;
        Ok(self.memberships.remove(parent))
    }

    fn ensure_not_fixed(&self, what: &str) -> Result<(), DomainError> {
        if self.is_fixed {
            return Err(DomainError::invalid_argument(format!(
                "cannot change {what} of fixed server role {}",
                self.name
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.exists || !self.operations().is_empty()
    }

    /// Calls needed to apply the edits, in issue order.
    #[must_use]
    pub fn operations(&self) -> Vec<RoleOperation> {
        let mut ops = Vec::new();
        if !self.exists {
            ops.push(RoleOperation::CreateServerRole {
                name: self.name.clone(),
                owner: self.owner.clone(),
            });
        } else if self.owner != self.original_owner
            && let Some(owner) = &self.owner
        {
            ops.push(RoleOperation::AlterServerRoleOwner {
                name: self.name.clone(),
                owner: owner.clone(),
            });
        }

        for member in self.members.difference(&self.original_members) {
            ops.push(RoleOperation::AddServerRoleMember {
                role: self.name.clone(),
                member: member.clone(),
            });
        }
        for member in self.original_members.difference(&self.members) {
            ops.push(RoleOperation::DropServerRoleMember {
                role: self.name.clone(),
                member: member.clone(),
            });
        }
        for parent in self.memberships.difference(&self.original_memberships) {
            ops.push(RoleOperation::AddServerRoleMembership {
                role: self.name.clone(),
                parent: parent.clone(),
            });
        }
        for parent in self.original_memberships.difference(&self.memberships) {
            ops.push(RoleOperation::DropServerRoleMembership {
                role: self.name.clone(),
                parent: parent.clone(),
            });
        }
        ops
    }

    pub fn reset(&mut self) {
        self.exists = true;
        self.original_owner.clone_from(&self.owner);
        self.original_members.clone_from(&self.members);
        self.original_memberships.clone_from(&self.memberships);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn schemas() -> Vec<SchemaInfo> {
        ["dbo", "sales", "hr"]
            .into_iter()
            .map(|name| SchemaInfo {
                name: name.to_owned(),
                owner: if name == "hr" { "auditors" } else { "dbo" }.to_owned(),
            })
            .collect()
    }

    #[test]
    fn new_database_role_is_created_first() {
        let mut role = DatabaseRole::new("db", "readers", schemas());
        role.set_owner(Some("dbo".to_owned()));
        role.own_schema("sales").unwrap();
        role.add_member("alice");

        let ops = role.operations();
        assert_eq!(
            ops,
            vec![
                RoleOperation::CreateDatabaseRole {
                    database: "db".to_owned(),
                    name: "readers".to_owned(),
                    owner: Some("dbo".to_owned()),
                },
                RoleOperation::SetSchemaOwner {
                    database: "db".to_owned(),
                    schema: "sales".to_owned(),
                    owner: "readers".to_owned(),
                },
                RoleOperation::AddDatabaseRoleMember {
                    database: "db".to_owned(),
                    role: "readers".to_owned(),
                    member: "alice".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn existing_role_reports_only_differences() {
        let mut role = DatabaseRole::existing(
            "db",
            "auditors",
            Some("dbo".to_owned()),
            schemas(),
            vec!["bob".to_owned(), "carol".to_owned()],
        );
        assert_eq!(role.owned_schemas().collect::<Vec<_>>(), vec!["hr"]);
        assert!(!role.has_changes());

        role.remove_member("bob");
        role.add_member("dave");
        role.release_schema("hr", "dbo").unwrap();

        let ops = role.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], RoleOperation::SetSchemaOwner { owner, .. } if owner == "dbo"));
        assert!(matches!(&ops[1], RoleOperation::AddDatabaseRoleMember { member, .. } if member == "dave"));
        assert!(matches!(&ops[2], RoleOperation::DropDatabaseRoleMember { member, .. } if member == "bob"));

        role.reset();
        assert!(!role.has_changes());
        assert_eq!(role.owned_schemas().count(), 0);
    }

    #[test]
    fn schema_rules() {
        let mut role = DatabaseRole::existing("db", "auditors", None, schemas(), Vec::new());
        assert!(matches!(role.own_schema("nope"), Err(DomainError::NotFound { .. })));
        assert!(role.release_schema("sales", "dbo").is_err());
        assert!(role.release_schema("hr", "auditors").is_err());
    }

    #[test]
    fn fixed_server_role_rejects_owner_and_membership_changes() {
        let mut role = ServerRole::existing("sysadmin", Some("sa".to_owned()), true, Vec::new(), Vec::new());
        assert!(role.set_owner(Some("bob".to_owned())).is_err());
        assert!(role.add_membership("other").is_err());
        assert!(role.add_member("alice"));
        assert_eq!(
            role.operations(),
            vec![RoleOperation::AddServerRoleMember {
                role: "sysadmin".to_owned(),
                member: "alice".to_owned(),
            }]
        );
    }

    #[test]
    fn server_role_membership_changes() {
        let mut role = ServerRole::existing(
            "ops",
            Some("sa".to_owned()),
            false,
            vec!["alice".to_owned()],
            vec!["monitoring".to_owned()],
        );
        role.set_owner(Some("bob".to_owned())).unwrap();
        role.remove_membership("monitoring").unwrap();
        role.add_membership("processadmin").unwrap();
        assert!(role.add_membership("ops").is_err());

        let ops = role.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], RoleOperation::AlterServerRoleOwner { owner, .. } if owner == "bob"));
        assert!(matches!(&ops[1], RoleOperation::AddServerRoleMembership { parent, .. } if parent == "processadmin"));
        assert!(matches!(&ops[2], RoleOperation::DropServerRoleMembership { parent, .. } if parent == "monitoring"));
    }
}
