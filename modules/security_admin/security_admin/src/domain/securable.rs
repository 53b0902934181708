//! Securables and their related principals.

use security_admin_sdk::{PrincipalInfo, SecurableInfo, SecurableType};

use super::catalog::{CatalogContext, relevant_permissions};
use super::collections::{KeyedCollection, PermissionStateCollection};
use super::error::DomainError;
use super::keys::{PrincipalKey, SecurableKey};
use super::permission::Permission;
use super::state::{PermissionState, StateAddress, StateChange, StateMutation};

/// Permission states of one principal on a securable.
#[derive(Debug, Clone)]
pub struct PrincipalEntry {
    pub principal: PrincipalInfo,
    pub exists: bool,
    pub states: PermissionStateCollection,
}

/// Whether a securable carries column-level permissions.
#[derive(Debug, Clone)]
pub enum SecurableShape {
    Leaf,
    /// Table, view or table-valued function with its columns.
    ColumnParent { columns: Vec<Securable> },
}

/// A grantable object.
#[derive(Debug, Clone)]
pub struct Securable {
    info: SecurableInfo,
    key: SecurableKey,
    exists: bool,
    removed: bool,
    expected_grantor: Option<String>,
    relevant_permissions: Vec<Permission>,
    shape: SecurableShape,
    parent: Option<SecurableKey>,
    principals: KeyedCollection<PrincipalKey, PrincipalEntry>,
    removed_principals: KeyedCollection<PrincipalKey, PrincipalEntry>,
}

impl Securable {
    /// Builds a securable from a metadata descriptor.
    ///
    /// Column-bearing kinds get the column-parent shape with no columns yet;
    /// see [`Self::set_columns`].
    #[must_use]
    pub fn new(info: SecurableInfo, exists: bool, ctx: &CatalogContext) -> Self {
        let shape = if info.securable_type.has_columns() {
            SecurableShape::ColumnParent {
                columns: Vec::new(),
            }
        } else {
            SecurableShape::Leaf
        };
        Self {
            key: SecurableKey::from_info(&info),
            relevant_permissions: relevant_permissions(info.securable_type, ctx),
            info,
            exists,
            removed: false,
            expected_grantor: None,
            shape,
            parent: None,
            principals: KeyedCollection::new(),
            removed_principals: KeyedCollection::new(),
        }
    }

    /// Replaces the column list of a column parent.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] for kinds without columns or
    /// if a descriptor is not a column.
    pub fn set_columns(
        &mut self,
        columns: Vec<SecurableInfo>,
        ctx: &CatalogContext,
    ) -> Result<(), DomainError> {
        let SecurableShape::ColumnParent { columns: current } = &mut self.shape else {
            return Err(DomainError::invalid_argument(format!(
                "{} {} has no columns",
                self.info.securable_type, self.key
            )));
        };
        if let Some(bad) = columns
            .iter()
            .find(|c| c.securable_type != SecurableType::Column)
        {
            return Err(DomainError::invalid_argument(format!(
                "{} is a {}, not a column",
                bad.name, bad.securable_type
            )));
        }
        *current = columns
            .into_iter()
            .map(|info| {
                let mut column = Securable::new(info, self.exists, ctx);
                column.parent = Some(self.key.clone());
                column
            })
            .collect();
        Ok(())
    }

    #[must_use]
    pub fn info(&self) -> &SecurableInfo {
        &self.info
    }

    #[must_use]
    pub fn key(&self) -> &SecurableKey {
        &self.key
    }

    #[must_use]
    pub fn urn(&self) -> &str {
        &self.info.urn
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[must_use]
    pub fn securable_type(&self) -> SecurableType {
        self.info.securable_type
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.info.database.as_deref()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    #[must_use]
    pub fn expected_grantor(&self) -> Option<&str> {
        self.expected_grantor.as_deref()
    }

    pub fn set_expected_grantor(&mut self, grantor: Option<String>) {
        self.expected_grantor = grantor;
    }

    #[must_use]
    pub fn relevant_permissions(&self) -> &[Permission] {
        &self.relevant_permissions
    }

    #[must_use]
    pub fn shape(&self) -> &SecurableShape {
        &self.shape
    }

    #[must_use]
    pub fn is_column_parent(&self) -> bool {
        matches!(self.shape, SecurableShape::ColumnParent { .. })
    }

    /// Columns of a column parent; empty for every other shape.
    #[must_use]
    pub fn columns(&self) -> &[Securable] {
        match &self.shape {
            SecurableShape::ColumnParent { columns } => columns,
            SecurableShape::Leaf => &[],
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Securable> {
        self.columns().iter().find(|c| c.name() == name)
    }

    /// Owning object of a column.
    #[must_use]
    pub fn parent(&self) -> Option<&SecurableKey> {
        self.parent.as_ref()
    }

    /// Tracks `principal` with its loaded states.
    ///
    /// A principal removed earlier in this session is taken back.
    pub fn add_principal(
        &mut self,
        principal: PrincipalInfo,
        exists: bool,
        states: PermissionStateCollection,
    ) {
        let key = PrincipalKey::from_info(&principal);
        self.removed_principals.remove(&key);
        self.principals.insert(
            key,
            PrincipalEntry {
                principal,
                exists,
                states,
            },
        );
    }

    /// Stops tracking `principal` and revokes all its states.
    ///
    /// Principals that exist on the server are kept aside so the revokes
    /// are committed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the principal is not tracked.
    pub fn remove_principal(&mut self, key: &PrincipalKey) -> Result<Vec<StateChange>, DomainError> {
        let mut entry = self
            .principals
            .remove(key)
            .ok_or_else(|| DomainError::not_found("principal", key.name.clone()))?;
        let events = entry.states.revoke_all();
        if entry.exists {
            self.removed_principals.insert(key.clone(), entry);
        }
        Ok(events)
    }

    /// Adds one state to a tracked principal's collection.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the principal is not tracked, or
    /// [`DomainError::InvalidArgument`] if the state belongs elsewhere.
    pub fn add_permission_state(&mut self, state: PermissionState) -> Result<(), DomainError> {
        if state.securable() != &self.key {
            return Err(DomainError::invalid_argument(format!(
                "state for {} added to {}",
                state.securable(),
                self.key
            )));
        }
        let entry = self
            .principals
            .get_mut(state.principal())
            .ok_or_else(|| DomainError::not_found("principal", state.principal().name.clone()))?;
        entry.states.insert(state);
        Ok(())
    }

    /// Marks the securable as dropped and revokes every tracked state.
    ///
    /// The mark cannot be cleared.
    pub fn mark_removed(&mut self) -> Vec<StateChange> {
        self.removed = true;
        self.principals
            .values_mut()
            .flat_map(|entry| entry.states.revoke_all())
            .collect()
    }

    #[must_use]
    pub fn principal(&self, key: &PrincipalKey) -> Option<&PrincipalEntry> {
        self.principals.get(key)
    }

    #[must_use]
    pub fn states(&self, key: &PrincipalKey) -> Option<&PermissionStateCollection> {
        self.principals.get(key).map(|e| &e.states)
    }

    pub fn principals(&self) -> impl Iterator<Item = &PrincipalEntry> {
        self.principals.values()
    }

    pub fn principals_mut(&mut self) -> impl Iterator<Item = &mut PrincipalEntry> {
        self.principals.values_mut()
    }

    pub fn removed_principals(&self) -> impl Iterator<Item = &PrincipalEntry> {
        self.removed_principals.values()
    }

    /// Tracked and removed principals, tracked first.
    pub fn all_principals(&self) -> impl Iterator<Item = &PrincipalEntry> {
        self.principals.values().chain(self.removed_principals.values())
    }

    /// Principal keys with unchanged principals first.
    #[must_use]
    pub fn principals_in_display_order(&self) -> Vec<&PrincipalKey> {
        self.principals.display_order(|e| e.states.any_changed())
    }

    /// Applies a mutation to one of `principal`'s states.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] for an unknown principal or address.
    pub fn apply(
        &mut self,
        principal: &PrincipalKey,
        address: &StateAddress,
        mutation: StateMutation,
    ) -> Result<Vec<StateChange>, DomainError> {
        self.principals
            .get_mut(principal)
            .ok_or_else(|| DomainError::not_found("principal", principal.name.clone()))?
            .states
            .apply(address, mutation)
    }

    /// Returns `true` if anything would be committed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.removed_principals.is_empty()
            || self.principals.values().any(|e| e.states.any_changed())
    }

    /// Accepts the current states as the new baseline and forgets removed
    /// principals.
    pub fn reset(&mut self) {
        for entry in self.principals.values_mut() {
            entry.states.reset();
        }
        self.removed_principals.clear();
    }

    pub(crate) fn replace_info(&mut self, info: SecurableInfo) {
        self.key = SecurableKey::from_info(&info);
        self.info = info;
        self.exists = true;
    }

    pub(crate) fn replace_states(&mut self, key: &PrincipalKey, states: PermissionStateCollection) {
        if let Some(entry) = self.principals.get_mut(key) {
            entry.states = states;
            entry.exists = true;
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_admin_sdk::{PermissionStatus, PrincipalType};

    use super::*;

    fn table() -> Securable {
        let info = SecurableInfo {
            urn: "sales/dbo/Orders".to_owned(),
            name: "Orders".to_owned(),
            schema: Some("dbo".to_owned()),
            securable_type: SecurableType::Table,
            database: Some("sales".to_owned()),
        };
        Securable::new(info, true, &CatalogContext::default())
    }

    fn user(name: &str) -> PrincipalInfo {
        PrincipalInfo {
            name: name.to_owned(),
            principal_type: PrincipalType::User,
            database: Some("sales".to_owned()),
        }
    }

    fn granted(securable: &Securable, principal: &PrincipalInfo) -> PermissionStateCollection {
        let pkey = PrincipalKey::from_info(principal);
        let mut states = PermissionStateCollection::new(securable.key().clone(), pkey.clone());
        states.insert(PermissionState::new(
            Permission::by_name("SELECT").unwrap(),
            securable.key().clone(),
            pkey,
            "dbo",
            PermissionStatus::Grant,
        ));
        states
    }

    #[test]
    fn tables_are_column_parents() {
        let t = table();
        assert!(t.is_column_parent());
        assert!(t.relevant_permissions().iter().any(|p| p.name() == "SELECT"));
    }

    #[test]
    fn leaf_rejects_columns() {
        let info = SecurableInfo {
            urn: "sales/dbo/p".to_owned(),
            name: "p".to_owned(),
            schema: Some("dbo".to_owned()),
            securable_type: SecurableType::StoredProcedure,
            database: Some("sales".to_owned()),
        };
        let mut proc = Securable::new(info, true, &CatalogContext::default());
        let err = proc.set_columns(Vec::new(), &CatalogContext::default());
        assert!(matches!(err, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn removing_existing_principal_keeps_it_for_commit() {
        let mut t = table();
        let u = user("U1");
        let states = granted(&t, &u);
        t.add_principal(u.clone(), true, states);

        let key = PrincipalKey::from_info(&u);
        let events = t.remove_principal(&key).unwrap();
        assert_eq!(events.len(), 1);
        assert!(t.principal(&key).is_none());
        assert_eq!(t.removed_principals().count(), 1);
        assert!(t.has_changes());

        t.reset();
        assert_eq!(t.removed_principals().count(), 0);
        assert!(!t.has_changes());
    }

    #[test]
    fn removing_new_principal_forgets_it() {
        let mut t = table();
        let u = user("U2");
        let states = granted(&t, &u);
        t.add_principal(u.clone(), false, states);
        t.remove_principal(&PrincipalKey::from_info(&u)).unwrap();
        assert_eq!(t.removed_principals().count(), 0);
    }

    #[test]
    fn mark_removed_is_sticky_and_revokes() {
        let mut t = table();
        let u = user("U1");
        let states = granted(&t, &u);
        t.add_principal(u, true, states);
        let events = t.mark_removed();
        assert_eq!(events.len(), 1);
        assert!(t.is_removed());
        assert!(t.has_changes());
    }

    #[test]
    fn state_for_other_securable_is_rejected() {
        let mut t = table();
        let u = user("U1");
        let states = granted(&t, &u);
        t.add_principal(u.clone(), true, states);
        let stray = PermissionState::new(
            Permission::by_name("SELECT").unwrap(),
            SecurableKey::new(Some("dbo"), "Other", SecurableType::Table),
            PrincipalKey::from_info(&u),
            "dbo",
            PermissionStatus::Grant,
        );
        assert!(t.add_permission_state(stray).is_err());
    }
}
