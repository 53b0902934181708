//! Ordered keyed collections.
//!
//! [`KeyedCollection`] is one `BTreeMap` with a generation counter. A
//! [`Cursor`] remembers the generation it was taken at; stepping it after
//! an insert or remove returns [`DomainError::CollectionModified`] instead
//! of yielding stale entries.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::error::DomainError;
use super::keys::{PrincipalKey, SecurableKey};
use super::permission::Permission;
use super::state::{PermissionState, StateAddress, StateChange, StateMutation};

/// Position in a [`KeyedCollection`] iteration.
#[derive(Debug, Clone)]
pub struct Cursor<K> {
    generation: u64,
    last: Option<K>,
}

/// Ordered map with modification-checked cursors.
#[derive(Debug, Clone)]
pub struct KeyedCollection<K, V> {
    items: BTreeMap<K, V>,
    generation: u64,
}

impl<K, V> Default for KeyedCollection<K, V> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            generation: 0,
        }
    }
}

impl<K: Ord + Clone, V> KeyedCollection<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    /// Inserts or replaces; invalidates open cursors.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.generation += 1;
        self.items.insert(key, value)
    }

    /// Removes an entry; invalidates open cursors if something was removed.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.items.remove(key);
        if removed.is_some() {
            self.generation += 1;
        }
        removed
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.generation += 1;
            self.items.clear();
        }
    }

    /// Returns the existing value or inserts one built by `make`.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        if !self.items.contains_key(&key) {
            self.generation += 1;
        }
        self.items.entry(key).or_insert_with(make)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.items.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.items.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.items.values_mut()
    }

    /// Takes every entry out, leaving the collection empty.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> {
        if !self.items.is_empty() {
            self.generation += 1;
        }
        std::mem::take(&mut self.items).into_iter()
    }

    /// Starts a cursor at the first entry.
    #[must_use]
    pub fn cursor(&self) -> Cursor<K> {
        Cursor {
            generation: self.generation,
            last: None,
        }
    }

    /// Advances `cursor` and returns the next entry.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::CollectionModified`] if the collection was
    /// changed after the cursor was taken.
    pub fn advance(&self, cursor: &mut Cursor<K>) -> Result<Option<(&K, &V)>, DomainError> {
        if cursor.generation != self.generation {
            return Err(DomainError::CollectionModified);
        }
        let next = match &cursor.last {
            None => self.items.iter().next(),
            Some(last) => self
                .items
                .range::<K, _>((Bound::Excluded(last), Bound::Unbounded))
                .next(),
        };
        if let Some((key, _)) = next {
            cursor.last = Some(key.clone());
        }
        Ok(next)
    }

    /// Keys in display order: entries for which `changed` is false first,
    /// then changed entries, each group in key order.
    pub fn display_order(&self, changed: impl Fn(&V) -> bool) -> Vec<&K> {
        let (changed, unchanged): (Vec<_>, Vec<_>) =
            self.items.iter().partition(|(_, v)| changed(v));
        unchanged
            .into_iter()
            .chain(changed)
            .map(|(k, _)| k)
            .collect()
    }
}

/// Key of an object-level state inside a [`PermissionStateCollection`].
pub type StateKey = (Permission, String);

/// Permission states of one (securable, principal) pair.
///
/// Object-level states are keyed by permission and grantor; column-level
/// states are children of the object-level state they refine.
#[derive(Debug, Clone)]
pub struct PermissionStateCollection {
    securable: SecurableKey,
    principal: PrincipalKey,
    states: KeyedCollection<StateKey, PermissionState>,
}

impl PermissionStateCollection {
    #[must_use]
    pub fn new(securable: SecurableKey, principal: PrincipalKey) -> Self {
        Self {
            securable,
            principal,
            states: KeyedCollection::new(),
        }
    }

    #[must_use]
    pub fn securable(&self) -> &SecurableKey {
        &self.securable
    }

    #[must_use]
    pub fn principal(&self) -> &PrincipalKey {
        &self.principal
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[must_use]
    pub fn get(&self, permission: Permission, grantor: &str) -> Option<&PermissionState> {
        self.states.get(&(permission, grantor.to_owned()))
    }

    pub fn get_mut(&mut self, permission: Permission, grantor: &str) -> Option<&mut PermissionState> {
        self.states.get_mut(&(permission, grantor.to_owned()))
    }

    /// Resolves an address, descending into columns.
    #[must_use]
    pub fn find(&self, address: &StateAddress) -> Option<&PermissionState> {
        let state = self.get(address.permission, &address.grantor)?;
        match &address.column {
            None => Some(state),
            Some(column) => state.child(column),
        }
    }

    /// Adds or replaces the object-level state with the same key.
    pub fn insert(&mut self, state: PermissionState) -> Option<PermissionState> {
        let key = (state.permission(), state.grantor().to_owned());
        self.states.insert(key, state)
    }

    /// Returns the object-level state, inserting one built by `make` if absent.
    pub fn get_or_insert_with(
        &mut self,
        permission: Permission,
        grantor: &str,
        make: impl FnOnce() -> PermissionState,
    ) -> &mut PermissionState {
        self.states
            .get_or_insert_with((permission, grantor.to_owned()), make)
    }

    /// Object-level states in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionState> {
        self.states.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PermissionState> {
        self.states.values_mut()
    }

    /// States for `permission`, one per grantor.
    pub fn for_permission(&self, permission: Permission) -> impl Iterator<Item = &PermissionState> {
        self.states
            .iter()
            .filter(move |((p, _), _)| *p == permission)
            .map(|(_, state)| state)
    }

    /// Cursor over the object-level states.
    #[must_use]
    pub fn cursor(&self) -> Cursor<StateKey> {
        self.states.cursor()
    }

    /// Advances a cursor obtained from [`Self::cursor`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::CollectionModified`] if a state was added or
    /// removed since the cursor was taken.
    pub fn advance(&self, cursor: &mut Cursor<StateKey>) -> Result<Option<&PermissionState>, DomainError> {
        Ok(self.states.advance(cursor)?.map(|(_, state)| state))
    }

    /// Applies `mutation` to the addressed state.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the address resolves to nothing.
    pub fn apply(
        &mut self,
        address: &StateAddress,
        mutation: StateMutation,
    ) -> Result<Vec<StateChange>, DomainError> {
        let state = self
            .states
            .get_mut(&(address.permission, address.grantor.clone()))
            .ok_or_else(|| {
                DomainError::not_found(
                    "permission state",
                    format!("{} ({})", address.permission, address.grantor),
                )
            })?;
        state.apply(address.column.as_deref(), mutation)
    }

    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn toggle_grant(
        &mut self,
        address: &StateAddress,
        with_grant: bool,
    ) -> Result<Vec<StateChange>, DomainError> {
        self.apply(address, StateMutation::ToggleGrant { with_grant })
    }

    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn toggle_deny(&mut self, address: &StateAddress) -> Result<Vec<StateChange>, DomainError> {
        self.apply(address, StateMutation::ToggleDeny)
    }

    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn revoke(&mut self, address: &StateAddress) -> Result<Vec<StateChange>, DomainError> {
        self.apply(address, StateMutation::Revoke)
    }

    /// Revokes every state, columns included.
    pub fn revoke_all(&mut self) -> Vec<StateChange> {
        self.states
            .values_mut()
            .flat_map(PermissionState::revoke_all)
            .collect()
    }

    /// Returns `true` if any state or column state changed.
    #[must_use]
    pub fn any_changed(&self) -> bool {
        self.states.values().any(PermissionState::any_changed)
    }

    /// Makes every current state the new original.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            state.reset();
        }
    }

    /// Object-level keys with unchanged states first.
    #[must_use]
    pub fn display_order(&self) -> Vec<&StateKey> {
        self.states.display_order(PermissionState::any_changed)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_admin_sdk::{PermissionStatus, PrincipalType, SecurableType};

    use super::*;

    #[test]
    fn cursor_walks_in_key_order() {
        let mut c = KeyedCollection::new();
        c.insert("b", 2);
        c.insert("a", 1);
        c.insert("c", 3);

        let mut cursor = c.cursor();
        let mut seen = Vec::new();
        while let Some((k, _)) = c.advance(&mut cursor).unwrap() {
            seen.push(*k);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn cursor_fails_after_modification() {
        let mut c = KeyedCollection::new();
        c.insert(1, "one");
        c.insert(2, "two");

        let mut cursor = c.cursor();
        assert!(c.advance(&mut cursor).unwrap().is_some());
        c.insert(3, "three");
        assert!(matches!(
            c.advance(&mut cursor),
            Err(DomainError::CollectionModified)
        ));

        // a fresh cursor works again
        let mut cursor = c.cursor();
        assert!(c.advance(&mut cursor).is_ok());
    }

    #[test]
    fn removing_missing_key_keeps_cursors_valid() {
        let mut c = KeyedCollection::new();
        c.insert(1, ());
        let mut cursor = c.cursor();
        assert!(c.remove(&7).is_none());
        assert!(c.advance(&mut cursor).is_ok());
    }

    #[test]
    fn display_order_puts_changed_last() {
        let mut c = KeyedCollection::new();
        c.insert("a", true);
        c.insert("b", false);
        c.insert("c", true);
        c.insert("d", false);
        assert_eq!(c.display_order(|v| *v), vec![&"b", &"d", &"a", &"c"]);
    }

    fn collection() -> PermissionStateCollection {
        let securable = SecurableKey::new(Some("dbo"), "T", SecurableType::Table);
        let principal = PrincipalKey::new("U1", PrincipalType::User);
        let mut coll = PermissionStateCollection::new(securable.clone(), principal.clone());
        for name in ["SELECT", "INSERT"] {
            coll.insert(PermissionState::new(
                Permission::by_name(name).unwrap(),
                securable.clone(),
                principal.clone(),
                "dbo",
                PermissionStatus::Revoke,
            ));
        }
        coll
    }

    #[test]
    fn state_collection_addresses_by_permission_and_grantor() {
        let mut coll = collection();
        let select = Permission::by_name("SELECT").unwrap();
        let address = StateAddress::new(select, "dbo");

        let events = coll.toggle_grant(&address, false).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(coll.find(&address).unwrap().state(), PermissionStatus::Grant);
        assert!(coll.any_changed());

        let missing = StateAddress::new(select, "other");
        assert!(coll.revoke(&missing).is_err());
    }

    #[test]
    fn state_collection_display_order() {
        let mut coll = collection();
        let select = Permission::by_name("SELECT").unwrap();
        coll.toggle_deny(&StateAddress::new(select, "dbo")).unwrap();
        let order: Vec<_> = coll.display_order().into_iter().map(|(p, _)| p.name()).collect();
        assert_eq!(order, vec!["INSERT", "SELECT"]);
    }
}
