#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for loading, editing and committing permission states

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    DB, catalog, catalog_with_columns, database_urn, service, service_with, table_urn,
};
use security_admin::domain::{OperationKind, StateMutation};
use security_admin::{DomainError, Permission, PrincipalKey, SecurityAdminConfig, StateAddress};
use security_admin_sdk::{
    DenyOptions, DisplayStatus, GrantOptions, PermissionMutator, PermissionSet, PermissionStatus,
    PermissionTarget, PrincipalType, RevokeOptions, SecurableInfo, SecurableType,
    SecurityAdminError,
};
use static_catalog_plugin::{StaticCatalog, urn};

fn perm(name: &str) -> Permission {
    Permission::by_name(name).unwrap()
}

fn u1() -> PrincipalKey {
    PrincipalKey::new("U1", PrincipalType::User)
}

fn dbo(name: &str) -> StateAddress {
    StateAddress::new(perm(name), "dbo")
}

/// Fails every grant; revokes and denies go through to the catalog.
struct FailingGrants(Arc<StaticCatalog>);

#[async_trait]
impl PermissionMutator for FailingGrants {
    async fn grant(
        &self,
        _target: &PermissionTarget,
        _permissions: &PermissionSet,
        _grantee: &str,
        _options: &GrantOptions,
    ) -> Result<(), SecurityAdminError> {
        Err(SecurityAdminError::Unavailable("connection lost".to_owned()))
    }

    async fn deny(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &DenyOptions,
    ) -> Result<(), SecurityAdminError> {
        self.0.deny(target, permissions, grantee, options).await
    }

    async fn revoke(
        &self,
        target: &PermissionTarget,
        permissions: &PermissionSet,
        grantee: &str,
        options: &RevokeOptions,
    ) -> Result<(), SecurityAdminError> {
        self.0.revoke(target, permissions, grantee, options).await
    }
}

/// Never answers within a short commit timeout.
struct Stalled;

#[async_trait]
impl PermissionMutator for Stalled {
    async fn grant(
        &self,
        _target: &PermissionTarget,
        _permissions: &PermissionSet,
        _grantee: &str,
        _options: &GrantOptions,
    ) -> Result<(), SecurityAdminError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn deny(
        &self,
        _target: &PermissionTarget,
        _permissions: &PermissionSet,
        _grantee: &str,
        _options: &DenyOptions,
    ) -> Result<(), SecurityAdminError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn revoke(
        &self,
        _target: &PermissionTarget,
        _permissions: &PermissionSet,
        _grantee: &str,
        _options: &RevokeOptions,
    ) -> Result<(), SecurityAdminError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

#[tokio::test]
async fn table_with_denied_column_reads_as_partial_deny() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut table = svc.open_securable(&table_urn()).await.unwrap();
    assert!(table.exists());
    assert_eq!(table.columns().len(), 2);
    assert_eq!(table.expected_grantor(), Some("dbo"));

    assert_eq!(svc.load_securable_principals(&mut table).await.unwrap(), 1);
    let select = table.states(&u1()).unwrap().get(perm("SELECT"), "dbo").unwrap();
    assert_eq!(select.state(), PermissionStatus::Grant);
    assert_eq!(select.child("A").unwrap().state(), PermissionStatus::Deny);
    assert_eq!(select.display_state(), DisplayStatus::PartialDeny);
    assert!(!table.has_changes());

    // loading twice does not duplicate principals
    assert_eq!(svc.load_securable_principals(&mut table).await.unwrap(), 0);
}

#[tokio::test]
async fn commit_revokes_then_grants_then_denies() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut table = svc.open_securable(&table_urn()).await.unwrap();
    svc.load_securable_principals(&mut table).await.unwrap();

    // Grant -> Deny on the table clears the column deny below it
    let events = table
        .apply(&u1(), &dbo("SELECT"), StateMutation::ToggleDeny)
        .unwrap();
    assert_eq!(events.len(), 2);
    table
        .apply(&u1(), &dbo("INSERT"), StateMutation::ToggleGrant { with_grant: false })
        .unwrap();
    assert!(table.has_changes());

    let log = svc.apply_securable_changes(&mut table).await.unwrap();
    let kinds: Vec<OperationKind> = log.applied().iter().map(|op| op.kind).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::Revoke, OperationKind::Grant, OperationKind::Deny]
    );
    let t1 = table_urn();
    assert_eq!(
        catalog.calls(),
        vec![
            format!("REVOKE SELECT ON {t1}(A) FROM U1 AS dbo"),
            format!("GRANT INSERT ON {t1} TO U1 AS dbo"),
            format!("DENY SELECT ON {t1} TO U1 AS dbo"),
        ]
    );
    assert!(!table.has_changes());
}

#[tokio::test]
async fn reload_reads_back_committed_state() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut table = svc.open_securable(&table_urn()).await.unwrap();
    svc.load_securable_principals(&mut table).await.unwrap();

    table
        .apply(&u1(), &dbo("SELECT"), StateMutation::ToggleDeny)
        .unwrap();
    svc.apply_securable_changes(&mut table).await.unwrap();
    svc.reload_securable(&mut table).await.unwrap();

    let select = table.states(&u1()).unwrap().get(perm("SELECT"), "dbo").unwrap();
    assert_eq!(select.state(), PermissionStatus::Deny);
    assert_eq!(select.child("A").unwrap().state(), PermissionStatus::Revoke);
    assert!(!table.has_changes());

    // a fresh session sees the same thing
    let mut fresh = svc.open_securable(&table_urn()).await.unwrap();
    svc.load_securable_principals(&mut fresh).await.unwrap();
    let select = fresh.states(&u1()).unwrap().get(perm("SELECT"), "dbo").unwrap();
    assert_eq!(select.state(), PermissionStatus::Deny);
}

#[tokio::test]
async fn failed_call_stops_commit_and_keeps_edits() {
    let catalog = catalog();
    let svc = service_with(
        &catalog,
        Arc::new(FailingGrants(catalog.clone())),
        SecurityAdminConfig::default(),
    );
    let mut table = svc.open_securable(&table_urn()).await.unwrap();
    svc.load_securable_principals(&mut table).await.unwrap();

    table.apply(&u1(), &dbo("SELECT"), StateMutation::Revoke).unwrap();
    table
        .apply(&u1(), &dbo("INSERT"), StateMutation::ToggleGrant { with_grant: false })
        .unwrap();
    table
        .apply(&u1(), &dbo("DELETE"), StateMutation::ToggleDeny)
        .unwrap();

    let err = svc.apply_securable_changes(&mut table).await.unwrap_err();
    assert_eq!(err.to_string(), "commit failed after 2 of 4 operations");
    let log = err.commit_log().unwrap();
    assert_eq!(log.applied().len(), 2);
    let (failed, message) = log.failed().unwrap();
    assert_eq!(failed.kind, OperationKind::Grant);
    assert!(message.contains("connection lost"));
    assert_eq!(log.pending_operations().len(), 1);

    // revokes went through, the model still holds every edit
    assert_eq!(catalog.calls().len(), 2);
    assert!(table.has_changes());
}

#[tokio::test]
async fn stalled_call_times_out() {
    let catalog = catalog();
    let config = SecurityAdminConfig {
        commit_timeout_ms: 20,
        ..SecurityAdminConfig::default()
    };
    let svc = service_with(&catalog, Arc::new(Stalled), config);
    let mut table = svc.open_securable(&table_urn()).await.unwrap();
    svc.load_securable_principals(&mut table).await.unwrap();
    table
        .apply(&u1(), &dbo("INSERT"), StateMutation::ToggleGrant { with_grant: false })
        .unwrap();

    let err = svc.apply_securable_changes(&mut table).await.unwrap_err();
    let DomainError::PartialCommit { source, .. } = err else {
        panic!("expected a partial commit");
    };
    assert!(matches!(*source, DomainError::Timeout { operation: "grant" }));
}

#[tokio::test]
async fn principal_view_commits_database_grant() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut user = svc.open_principal("U1", Some(DB)).await.unwrap();
    assert_eq!(svc.load_principal_securables(&mut user).await.unwrap(), 1);

    let db_key = svc
        .add_securable_to_principal(&mut user, &database_urn())
        .await
        .unwrap();
    assert_eq!(db_key.securable_type, SecurableType::Database);
    user.apply(&db_key, &dbo("CREATE TABLE"), StateMutation::ToggleGrant { with_grant: false })
        .unwrap();

    let log = svc.apply_principal_changes(&mut user).await.unwrap();
    assert_eq!(log.total(), 1);
    assert_eq!(
        catalog.calls(),
        vec![format!("GRANT CREATE TABLE ON DATABASE::{DB} TO U1 AS dbo")]
    );
    assert!(!user.has_changes());
}

#[tokio::test]
async fn principal_reload_picks_up_new_columns() {
    let catalog = catalog();
    let mut user = service(&catalog).open_principal("U1", Some(DB)).await.unwrap();
    service(&catalog)
        .load_principal_securables(&mut user)
        .await
        .unwrap();
    let key = user.securables().next().unwrap().securable.key().clone();
    assert_eq!(user.securable(&key).unwrap().securable.columns().len(), 2);

    // column C added on the server since the principal was opened
    let altered = catalog_with_columns(&["A", "B", "C"]);
    service(&altered).reload_principal(&mut user).await.unwrap();

    let entry = user.securable(&key).unwrap();
    assert_eq!(entry.securable.columns().len(), 3);
    let select = entry.states.get(perm("SELECT"), "dbo").unwrap();
    assert_eq!(select.state(), PermissionStatus::Grant);
    assert_eq!(select.child("A").unwrap().state(), PermissionStatus::Deny);
    assert_eq!(select.child("C").unwrap().state(), PermissionStatus::Revoke);
    assert!(!user.has_changes());
}

#[tokio::test]
async fn server_grant_reloads_as_one_state() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut server = svc.open_securable(urn::SERVER).await.unwrap();
    let login = svc.add_principal_to_securable(&mut server, "L1").await.unwrap();

    let control = StateAddress::new(perm("CONTROL SERVER"), "");
    server
        .apply(&login, &control, StateMutation::ToggleGrant { with_grant: false })
        .unwrap();
    svc.apply_securable_changes(&mut server).await.unwrap();
    assert_eq!(catalog.calls(), vec!["GRANT CONTROL SERVER ON SERVER TO L1".to_owned()]);
    svc.reload_securable(&mut server).await.unwrap();

    let states: Vec<_> = server
        .states(&login)
        .unwrap()
        .iter()
        .filter(|s| s.permission() == perm("CONTROL SERVER"))
        .collect();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].grantor(), "");
    assert_eq!(states[0].state(), PermissionStatus::Grant);
}

#[tokio::test]
async fn removed_principal_is_revoked_on_commit() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut db = svc.open_securable(&database_urn()).await.unwrap();
    svc.load_securable_principals(&mut db).await.unwrap();

    let u2 = PrincipalKey::new("U2", PrincipalType::User);
    let events = db.remove_principal(&u2).unwrap();
    assert_eq!(events.len(), 1);

    svc.apply_securable_changes(&mut db).await.unwrap();
    assert_eq!(
        catalog.calls(),
        vec![format!("REVOKE CREATE TABLE ON DATABASE::{DB} FROM U2 CASCADE AS dbo")]
    );
    assert_eq!(db.removed_principals().count(), 0);
}

#[tokio::test]
async fn reload_rejects_changed_object_kind() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut view = svc
        .new_securable(SecurableInfo {
            urn: table_urn(),
            name: "t1".to_owned(),
            schema: Some("dbo".to_owned()),
            securable_type: SecurableType::View,
            database: Some(DB.to_owned()),
        })
        .await
        .unwrap();
    assert!(!view.exists());

    let err = svc.reload_securable(&mut view).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::TypeMismatch {
            expected: SecurableType::View,
            actual: SecurableType::Table,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_securable_is_not_found() {
    let catalog = catalog();
    let svc = service(&catalog);
    let err = svc.open_securable("Server/Nowhere").await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Source(SecurityAdminError::NotFound { .. })
    ));
}
