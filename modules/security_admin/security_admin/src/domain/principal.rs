//! Principals and their related securables.

use security_admin_sdk::{PrincipalInfo, PrincipalType, SecurableType};

use super::catalog::{CatalogContext, relevant_securable_types};
use super::collections::{KeyedCollection, PermissionStateCollection};
use super::error::DomainError;
use super::keys::{PrincipalKey, SecurableKey};
use super::securable::Securable;
use super::state::{StateAddress, StateChange, StateMutation};

/// Permission states of a principal on one securable.
///
/// `securable` describes the object only; its own principal list is unused
/// in this direction.
#[derive(Debug, Clone)]
pub struct SecurableEntry {
    pub securable: Securable,
    pub states: PermissionStateCollection,
}

/// A grantee.
#[derive(Debug, Clone)]
pub struct Principal {
    info: PrincipalInfo,
    key: PrincipalKey,
    exists: bool,
    removed: bool,
    relevant_securable_types: Vec<SecurableType>,
    securables: KeyedCollection<SecurableKey, SecurableEntry>,
    removed_securables: KeyedCollection<SecurableKey, SecurableEntry>,
}

impl Principal {
    #[must_use]
    pub fn new(info: PrincipalInfo, exists: bool, ctx: &CatalogContext) -> Self {
        Self {
            key: PrincipalKey::from_info(&info),
            relevant_securable_types: relevant_securable_types(info.principal_type, ctx),
            info,
            exists,
            removed: false,
            securables: KeyedCollection::new(),
            removed_securables: KeyedCollection::new(),
        }
    }

    #[must_use]
    pub fn info(&self) -> &PrincipalInfo {
        &self.info
    }

    #[must_use]
    pub fn key(&self) -> &PrincipalKey {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[must_use]
    pub fn principal_type(&self) -> PrincipalType {
        self.info.principal_type
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.info.database.as_deref()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Object kinds this principal can hold permissions on.
    #[must_use]
    pub fn relevant_securable_types(&self) -> &[SecurableType] {
        &self.relevant_securable_types
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Marks the principal as dropped and revokes every tracked state.
    ///
    /// The mark cannot be cleared.
    pub fn mark_removed(&mut self) -> Vec<StateChange> {
        self.removed = true;
        self.securables
            .values_mut()
            .flat_map(|entry| entry.states.revoke_all())
            .collect()
    }

    /// Tracks `securable` with this principal's states on it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidArgument`] if `states` belongs to a
    /// different pair, or the kind is not relevant for this principal.
    pub fn add_securable(
        &mut self,
        securable: Securable,
        states: PermissionStateCollection,
    ) -> Result<(), DomainError> {
        if !self
            .relevant_securable_types
            .contains(&securable.securable_type())
        {
            return Err(DomainError::invalid_argument(format!(
                "{} is not relevant for {} {}",
                securable.securable_type(),
                self.info.principal_type,
                self.key
            )));
        }
        if states.principal() != &self.key || states.securable() != securable.key() {
            return Err(DomainError::invalid_argument(format!(
                "states for {}/{} added to {}/{}",
                states.securable(),
                states.principal(),
                securable.key(),
                self.key
            )));
        }
        let key = securable.key().clone();
        self.removed_securables.remove(&key);
        self.securables
            .insert(key, SecurableEntry { securable, states });
        Ok(())
    }

    /// Stops tracking a securable and revokes all states on it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the securable is not tracked.
    pub fn remove_securable(&mut self, key: &SecurableKey) -> Result<Vec<StateChange>, DomainError> {
        let mut entry = self
            .securables
            .remove(key)
            .ok_or_else(|| DomainError::not_found("securable", key.to_string()))?;
        let events = entry.states.revoke_all();
        if entry.securable.exists() {
            self.removed_securables.insert(key.clone(), entry);
        }
        Ok(events)
    }

    #[must_use]
    pub fn securable(&self, key: &SecurableKey) -> Option<&SecurableEntry> {
        self.securables.get(key)
    }

    #[must_use]
    pub fn states(&self, key: &SecurableKey) -> Option<&PermissionStateCollection> {
        self.securables.get(key).map(|e| &e.states)
    }

    pub fn securables(&self) -> impl Iterator<Item = &SecurableEntry> {
        self.securables.values()
    }

    pub fn securables_mut(&mut self) -> impl Iterator<Item = &mut SecurableEntry> {
        self.securables.values_mut()
    }

    pub fn removed_securables(&self) -> impl Iterator<Item = &SecurableEntry> {
        self.removed_securables.values()
    }

    /// Tracked and removed securables, tracked first.
    pub fn all_securables(&self) -> impl Iterator<Item = &SecurableEntry> {
        self.securables
            .values()
            .chain(self.removed_securables.values())
    }

    /// Securable keys with unchanged entries first.
    #[must_use]
    pub fn securables_in_display_order(&self) -> Vec<&SecurableKey> {
        self.securables.display_order(|e| e.states.any_changed())
    }

    /// Applies a mutation to this principal's state on `securable`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] for an unknown securable or address.
    pub fn apply(
        &mut self,
        securable: &SecurableKey,
        address: &StateAddress,
        mutation: StateMutation,
    ) -> Result<Vec<StateChange>, DomainError> {
        self.securables
            .get_mut(securable)
            .ok_or_else(|| DomainError::not_found("securable", securable.to_string()))?
            .states
            .apply(address, mutation)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.removed_securables.is_empty()
            || self.securables.values().any(|e| e.states.any_changed())
    }

    /// Clears local diff state without fetching anything.
    pub fn reset(&mut self) {
        for entry in self.securables.values_mut() {
            entry.states.reset();
        }
        self.removed_securables.clear();
    }

    pub(crate) fn replace_entry(
        &mut self,
        key: &SecurableKey,
        securable: Securable,
        states: PermissionStateCollection,
    ) {
        if let Some(entry) = self.securables.get_mut(key) {
            entry.securable = securable;
            entry.states = states;
        }
    }

    pub(crate) fn set_exists(&mut self) {
        self.exists = true;
    }
}
