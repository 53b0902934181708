//! Building permission states from enumerated rows.
//!
//! The reported rows are combined with the securable's relevant permission
//! list: anything not reported becomes a `Revoke` baseline. Column rows
//! become children of the object-level state with the same permission and
//! grantor.

use std::collections::{BTreeMap, HashSet};

use security_admin_sdk::{PermissionRow, PermissionStatus};
use tracing::debug;

use super::collections::PermissionStateCollection;
use super::keys::{PrincipalKey, SecurableKey};
use super::permission::Permission;
use super::securable::Securable;
use super::state::PermissionState;

/// Rows reported for one (securable, principal) pair.
#[derive(Debug, Clone, Default)]
pub struct GrantRows {
    /// Rows on the securable itself.
    pub object: Vec<PermissionRow>,
    /// Rows per column name.
    pub columns: BTreeMap<String, Vec<PermissionRow>>,
}

/// Builds the permission states of `principal` on `securable`.
///
/// `default_grantor` is used when neither the securable nor its parent has
/// an expected grantor.
#[must_use]
pub fn populate_permission_states(
    securable: &Securable,
    principal: &PrincipalKey,
    rows: &GrantRows,
    default_grantor: Option<&str>,
) -> PermissionStateCollection {
    let expected = securable
        .expected_grantor()
        .or(default_grantor)
        .unwrap_or_default();

    let mut collection = PermissionStateCollection::new(securable.key().clone(), principal.clone());
    for state in object_states(securable, principal, &rows.object, expected) {
        collection.insert(state);
    }

    if securable.columns().is_empty() {
        return collection;
    }

    for column in securable.columns() {
        let column_rows = rows.columns.get(column.name()).map_or(&[][..], Vec::as_slice);
        let column_expected = column.expected_grantor().unwrap_or(expected);
        for child in object_states(column, principal, column_rows, column_expected) {
            let parent = collection.get_or_insert_with(child.permission(), child.grantor(), || {
                PermissionState::new(
                    child.permission(),
                    securable.key().clone(),
                    principal.clone(),
                    child.grantor(),
                    PermissionStatus::Revoke,
                )
            });
            parent.add_child(child);
        }
    }

    add_children_to_empty_parents(&mut collection, securable, principal);
    collection
}

fn object_states(
    securable: &Securable,
    principal: &PrincipalKey,
    rows: &[PermissionRow],
    expected_grantor: &str,
) -> Vec<PermissionState> {
    let scope = securable.securable_type().vocabulary();
    let mut states: BTreeMap<(Permission, String), PermissionState> = BTreeMap::new();

    for row in rows {
        let Some(permission) = Permission::from_code(scope, row.code) else {
            debug!(
                securable = %securable.key(),
                code = %row.code,
                "dropping unknown permission code"
            );
            continue;
        };
        states.insert(
            (permission, row.grantor.clone()),
            PermissionState::new(
                permission,
                securable.key().clone(),
                principal.clone(),
                row.grantor.clone(),
                row.state,
            ),
        );
    }

    let mut synthesized = 0usize;
    for permission in securable.relevant_permissions() {
        states
            .entry((*permission, expected_grantor.to_owned()))
            .or_insert_with(|| {
                synthesized += 1;
                PermissionState::new(
                    *permission,
                    securable.key().clone(),
                    principal.clone(),
                    expected_grantor,
                    PermissionStatus::Revoke,
                )
            });
    }
    if synthesized > 0 {
        debug!(
            securable = %securable.key(),
            principal = %principal,
            synthesized,
            "added revoke baseline states"
        );
    }

    states.into_values().collect()
}

/// Gives every grantor of a permission the same set of columns.
///
/// When one grantor's state has column children, sibling states for the
/// same permission from other named grantors get a `Revoke` child for each
/// column they lack.
fn add_children_to_empty_parents(
    collection: &mut PermissionStateCollection,
    securable: &Securable,
    principal: &PrincipalKey,
) {
    let mut columns_by_permission: BTreeMap<Permission, Vec<SecurableKey>> = BTreeMap::new();
    for state in collection.iter() {
        for child in state.children() {
            let keys = columns_by_permission.entry(state.permission()).or_default();
            if !keys.contains(child.securable()) {
                keys.push(child.securable().clone());
            }
        }
    }

    for state in collection.iter_mut() {
        if state.grantor().is_empty() {
            continue;
        }
        let Some(columns) = columns_by_permission.get(&state.permission()) else {
            continue;
        };
        let present: HashSet<String> = state
            .children()
            .iter()
            .map(|c| c.securable().name.clone())
            .collect();
        for column in columns {
            if present.contains(&column.name) || securable.column(&column.name).is_none() {
                continue;
            }
            let child = PermissionState::new(
                state.permission(),
                column.clone(),
                principal.clone(),
                state.grantor().to_owned(),
                PermissionStatus::Revoke,
            );
            state.add_child(child);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use security_admin_sdk::{
        DisplayStatus, ObjectPermission, PermissionCode, PrincipalType, SecurableInfo,
        SecurableType,
    };

    use tracing_test::traced_test;

    use super::*;
    use crate::domain::catalog::CatalogContext;

    fn table1() -> Securable {
        let ctx = CatalogContext::default();
        let mut table = Securable::new(
            SecurableInfo {
                urn: "db/dbo/Table1".to_owned(),
                name: "Table1".to_owned(),
                schema: Some("dbo".to_owned()),
                securable_type: SecurableType::Table,
                database: Some("db".to_owned()),
            },
            true,
            &ctx,
        );
        table.set_expected_grantor(Some("dbo".to_owned()));
        let columns = ["A", "B"]
            .into_iter()
            .map(|name| SecurableInfo {
                urn: format!("db/dbo/Table1/{name}"),
                name: name.to_owned(),
                schema: Some("dbo".to_owned()),
                securable_type: SecurableType::Column,
                database: Some("db".to_owned()),
            })
            .collect();
        table.set_columns(columns, &ctx).unwrap();
        table
    }

    fn row(state: PermissionStatus, code: PermissionCode, grantor: &str) -> PermissionRow {
        PermissionRow {
            state,
            code,
            grantor: grantor.to_owned(),
        }
    }

    fn u1() -> PrincipalKey {
        PrincipalKey::new("U1", PrincipalType::User)
    }

    fn select() -> Permission {
        Permission::by_name("SELECT").unwrap()
    }

    #[test]
    fn table_grant_with_column_exception() {
        let table = table1();
        let mut rows = GrantRows {
            object: vec![row(PermissionStatus::Grant, ObjectPermission::Select.code(), "dbo")],
            ..GrantRows::default()
        };
        rows.columns.insert(
            "A".to_owned(),
            vec![row(PermissionStatus::Deny, ObjectPermission::Select.code(), "dbo")],
        );

        let states = populate_permission_states(&table, &u1(), &rows, None);
        let parent = states.get(select(), "dbo").unwrap();
        assert_eq!(parent.state(), PermissionStatus::Grant);
        assert_eq!(parent.child("A").unwrap().state(), PermissionStatus::Deny);
        assert_eq!(parent.child("B").unwrap().state(), PermissionStatus::Revoke);
        assert_eq!(parent.display_state(), DisplayStatus::PartialDeny);
    }

    #[test]
    fn missing_permissions_become_revoke() {
        let table = table1();
        let states = populate_permission_states(&table, &u1(), &GrantRows::default(), None);
        assert_eq!(states.len(), table.relevant_permissions().len());
        assert!(states.iter().all(|s| s.state() == PermissionStatus::Revoke));
        assert!(states.iter().all(|s| s.grantor() == "dbo"));
        // column-level permissions hang under their table-level state
        assert_eq!(states.get(select(), "dbo").unwrap().children().len(), 2);
        assert!(states
            .get(Permission::by_name("DELETE").unwrap(), "dbo")
            .unwrap()
            .children()
            .is_empty());
    }

    #[test]
    #[traced_test]
    fn unknown_codes_are_dropped() {
        let table = table1();
        let rows = GrantRows {
            object: vec![row(PermissionStatus::Grant, PermissionCode(9999), "dbo")],
            ..GrantRows::default()
        };
        let states = populate_permission_states(&table, &u1(), &rows, None);
        assert_eq!(states.len(), table.relevant_permissions().len());
        assert!(!states.any_changed());
        assert!(logs_contain("dropping unknown permission code"));
    }

    #[test]
    fn column_grant_from_other_grantor_creates_parent() {
        let table = table1();
        let mut rows = GrantRows::default();
        rows.columns.insert(
            "B".to_owned(),
            vec![row(PermissionStatus::Grant, ObjectPermission::Select.code(), "alice")],
        );

        let states = populate_permission_states(&table, &u1(), &rows, None);
        let alice = states.get(select(), "alice").unwrap();
        assert_eq!(alice.state(), PermissionStatus::Revoke);
        assert_eq!(alice.child("B").unwrap().state(), PermissionStatus::Grant);
        // backfilled so both grantors see both columns
        assert_eq!(alice.child("A").unwrap().state(), PermissionStatus::Revoke);
        assert_eq!(alice.display_state(), DisplayStatus::PartialGrant);
    }

    #[test]
    fn default_grantor_used_when_securable_has_none() {
        let mut table = table1();
        table.set_expected_grantor(None);
        let states = populate_permission_states(&table, &u1(), &GrantRows::default(), Some("sa"));
        assert!(states.iter().all(|s| s.grantor() == "sa"));
    }
}
