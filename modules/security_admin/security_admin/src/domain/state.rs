//! Permission state tree.
//!
//! A [`PermissionState`] is the grant status of one (securable, principal,
//! permission, grantor) combination. Table-level states own their
//! column-level states as children. Every mutation runs synchronously and
//! returns the [`StateChange`] events it produced:
//!
//! - setting a node forces every non-revoked descendant back to `Revoke`;
//! - changing a child resets every ancestor on its path to `Revoke`.
//!
//! Siblings of a changed node are never touched.

use security_admin_sdk::{DisplayStatus, PermissionStatus};
use serde::Serialize;

use super::error::DomainError;
use super::keys::{PrincipalKey, SecurableKey};
use super::permission::Permission;

/// Addresses one state inside a [`PermissionStateCollection`].
///
/// `column` is `None` for the object-level state.
///
/// [`PermissionStateCollection`]: super::collections::PermissionStateCollection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StateAddress {
    pub permission: Permission,
    pub grantor: String,
    pub column: Option<String>,
}

impl StateAddress {
    #[must_use]
    pub fn new(permission: Permission, grantor: impl Into<String>) -> Self {
        Self {
            permission,
            grantor: grantor.into(),
            column: None,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// A state transition observed on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub address: StateAddress,
    pub securable: SecurableKey,
    pub principal: PrincipalKey,
    pub old_state: PermissionStatus,
    pub new_state: PermissionStatus,
    pub old_display: DisplayStatus,
    pub new_display: DisplayStatus,
}

/// A requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMutation {
    /// Toggle a grant; `with_grant` asks for the grant option as well.
    ToggleGrant { with_grant: bool },
    ToggleDeny,
    Revoke,
}

/// Grant status of one (securable, principal, permission, grantor).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionState {
    permission: Permission,
    securable: SecurableKey,
    principal: PrincipalKey,
    grantor: String,
    original: PermissionStatus,
    current: PermissionStatus,
    display: DisplayStatus,
    children: Vec<PermissionState>,
}

impl PermissionState {
    /// A state loaded with `status` as both original and current value.
    #[must_use]
    pub fn new(
        permission: Permission,
        securable: SecurableKey,
        principal: PrincipalKey,
        grantor: impl Into<String>,
        status: PermissionStatus,
    ) -> Self {
        Self {
            permission,
            securable,
            principal,
            grantor: grantor.into(),
            original: status,
            current: status,
            display: status.into(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
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
    pub fn grantor(&self) -> &str {
        &self.grantor
    }

    #[must_use]
    pub fn original_state(&self) -> PermissionStatus {
        self.original
    }

    #[must_use]
    pub fn state(&self) -> PermissionStatus {
        self.current
    }

    #[must_use]
    pub fn display_state(&self) -> DisplayStatus {
        self.display
    }

    #[must_use]
    pub fn children(&self) -> &[PermissionState] {
        &self.children
    }

    #[must_use]
    pub fn child(&self, column: &str) -> Option<&PermissionState> {
        self.children.iter().find(|c| c.securable.name == column)
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Returns `true` when the current state differs from the loaded one.
    #[must_use]
    pub fn state_changed(&self) -> bool {
        self.original != self.current
    }

    /// Returns `true` when this node or any descendant changed.
    #[must_use]
    pub fn any_changed(&self) -> bool {
        self.state_changed() || self.children.iter().any(PermissionState::any_changed)
    }

    /// Whether a revoke or deny must cascade to grants made onward.
    #[must_use]
    pub fn cascade_needed(&self) -> bool {
        self.original == PermissionStatus::WithGrant
            || self
                .children
                .iter()
                .any(|c| c.original == PermissionStatus::WithGrant)
    }

    /// State the toggles act on.
    ///
    /// A node with children reads its display state; mixed displays read
    /// as `Revoke`.
    #[must_use]
    pub fn effective_state(&self) -> PermissionStatus {
        if self.children.is_empty() {
            return self.current;
        }
        match self.display {
            DisplayStatus::Grant => PermissionStatus::Grant,
            DisplayStatus::WithGrant => PermissionStatus::WithGrant,
            DisplayStatus::Deny => PermissionStatus::Deny,
            _ => PermissionStatus::Revoke,
        }
    }

    /// Address of this node within its collection.
    #[must_use]
    pub fn address(&self) -> StateAddress {
        let address = StateAddress::new(self.permission, self.grantor.clone());
        if self.securable.is_column() {
            address.with_column(self.securable.name.clone())
        } else {
            address
        }
    }

    /// Adds a column-level child and recomputes the display state.
    ///
    /// Returns `false` if a child for the same column already exists.
    pub fn add_child(&mut self, child: PermissionState) -> bool {
        if self.child(&child.securable.name).is_some() {
            return false;
        }
        self.children.push(child);
        self.refresh_display();
        true
    }

    pub fn toggle_grant(&mut self, with_grant: bool) -> Vec<StateChange> {
        self.mutate(StateMutation::ToggleGrant { with_grant })
    }

    pub fn toggle_deny(&mut self) -> Vec<StateChange> {
        self.mutate(StateMutation::ToggleDeny)
    }

    /// Sets the state to `Revoke`. Does nothing if it already is.
    pub fn revoke(&mut self) -> Vec<StateChange> {
        self.mutate(StateMutation::Revoke)
    }

    /// Applies `mutation` to this node or to one of its columns.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if `column` names no child.
    pub fn apply(
        &mut self,
        column: Option<&str>,
        mutation: StateMutation,
    ) -> Result<Vec<StateChange>, DomainError> {
        let Some(column) = column else {
            return Ok(self.mutate(mutation));
        };

        let child = self
            .children
            .iter_mut()
            .find(|c| c.securable.name == column)
            .ok_or_else(|| DomainError::not_found("column", column))?;
        let child_events = child.mutate(mutation);
        if child_events.is_empty() {
            return Ok(child_events);
        }

        let mut events = Vec::with_capacity(child_events.len() + 1);
        let old = (self.current, self.display);
        self.current = PermissionStatus::Revoke;
        self.refresh_display();
        self.record(old, &mut events);
        events.extend(child_events);
        Ok(events)
    }

    /// Revokes this node and every descendant, whatever their state.
    pub fn revoke_all(&mut self) -> Vec<StateChange> {
        let mut events = Vec::new();
        let old = (self.current, self.display);
        let mut child_events = Vec::new();
        for child in &mut self.children {
            child_events.extend(child.revoke_all());
        }
        self.current = PermissionStatus::Revoke;
        self.refresh_display();
        self.record(old, &mut events);
        events.extend(child_events);
        events
    }

    /// Makes the current state the new original, recursively.
    pub fn reset(&mut self) {
        self.original = self.current;
        for child in &mut self.children {
            child.reset();
        }
    }

    fn mutate(&mut self, mutation: StateMutation) -> Vec<StateChange> {
        if mutation == StateMutation::Revoke && self.current == PermissionStatus::Revoke {
            return Vec::new();
        }
        let next = next_status(self.effective_state(), mutation);
        self.set_current(next)
    }

    fn set_current(&mut self, next: PermissionStatus) -> Vec<StateChange> {
        let old = (self.current, self.display);
        self.current = next;

        let mut child_events = Vec::new();
        for child in &mut self.children {
            child.force_revoke(&mut child_events);
        }
        self.refresh_display();

        let mut events = Vec::with_capacity(child_events.len() + 1);
        self.record(old, &mut events);
        events.extend(child_events);
        events
    }

    fn force_revoke(&mut self, events: &mut Vec<StateChange>) {
        if self.current == PermissionStatus::Revoke {
            return;
        }
        let old = (self.current, self.display);
        self.current = PermissionStatus::Revoke;
        let mut child_events = Vec::new();
        for child in &mut self.children {
            child.force_revoke(&mut child_events);
        }
        self.refresh_display();
        self.record(old, events);
        events.extend(child_events);
    }

    fn refresh_display(&mut self) {
        self.display = determine_display_state(
            self.current,
            self.children.iter().map(|c| c.current),
        );
    }

    fn record(&self, old: (PermissionStatus, DisplayStatus), events: &mut Vec<StateChange>) {
        let (old_state, old_display) = old;
        if old_state == self.current && old_display == self.display {
            return;
        }
        events.push(StateChange {
            address: self.address(),
            securable: self.securable.clone(),
            principal: self.principal.clone(),
            old_state,
            new_state: self.current,
            old_display,
            new_display: self.display,
        });
    }
}

fn next_status(effective: PermissionStatus, mutation: StateMutation) -> PermissionStatus {
    match mutation {
        StateMutation::ToggleGrant { with_grant } => {
            let requested = if with_grant {
                PermissionStatus::WithGrant
            } else {
                PermissionStatus::Grant
            };
            if requested == PermissionStatus::WithGrant && effective == PermissionStatus::WithGrant
            {
                PermissionStatus::Grant
            } else if requested == effective
                || (requested == PermissionStatus::Grant
                    && effective == PermissionStatus::WithGrant)
            {
                PermissionStatus::Revoke
            } else {
                requested
            }
        }
        StateMutation::ToggleDeny => {
            if effective == PermissionStatus::Deny {
                PermissionStatus::Revoke
            } else {
                PermissionStatus::Deny
            }
        }
        StateMutation::Revoke => PermissionStatus::Revoke,
    }
}

/// Derives the display state of a node from its own state and the states
/// of its direct children.
///
/// A node without children displays its own state.
pub fn determine_display_state(
    current: PermissionStatus,
    children: impl IntoIterator<Item = PermissionStatus>,
) -> DisplayStatus {
    let mut has_children = false;
    let (mut granted, mut with_grant, mut denied, mut revoked) = (false, false, false, false);
    for status in children {
        has_children = true;
        match status {
            PermissionStatus::Grant => granted = true,
            PermissionStatus::WithGrant => with_grant = true,
            PermissionStatus::Deny => denied = true,
            PermissionStatus::Revoke => revoked = true,
        }
    }
    if !has_children {
        return current.into();
    }

    if with_grant && denied {
        DisplayStatus::Indeterminate
    } else if with_grant && revoked {
        DisplayStatus::PartialWithGrant
    } else if denied && granted && revoked {
        DisplayStatus::PartialGrantDeny
    } else if granted && revoked {
        DisplayStatus::PartialGrant
    } else if denied && revoked {
        DisplayStatus::PartialDeny
    } else if with_grant || current == PermissionStatus::WithGrant {
        DisplayStatus::WithGrant
    } else if granted || current == PermissionStatus::Grant {
        DisplayStatus::Grant
    } else if denied || current == PermissionStatus::Deny {
        DisplayStatus::Deny
    } else {
        DisplayStatus::Revoke
    }
}
