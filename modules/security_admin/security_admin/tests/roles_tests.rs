#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the database and server role façades

mod common;

use common::{DB, catalog, service};
use security_admin::DomainError;
use security_admin::domain::RoleOperation;
use security_admin_sdk::MetadataSource;

#[tokio::test]
async fn database_role_takes_schema_and_member() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut role = svc.open_database_role(DB, "readers").await.unwrap();
    assert_eq!(role.owner(), Some("dbo"));
    assert_eq!(role.members().collect::<Vec<_>>(), vec!["U2"]);

    role.own_schema("hr").unwrap();
    assert!(role.add_member("U1"));
    let ops = svc.apply_database_role(&mut role).await.unwrap();
    assert_eq!(
        ops,
        vec![
            RoleOperation::SetSchemaOwner {
                database: DB.to_owned(),
                schema: "hr".to_owned(),
                owner: "readers".to_owned(),
            },
            RoleOperation::AddDatabaseRoleMember {
                database: DB.to_owned(),
                role: "readers".to_owned(),
                member: "U1".to_owned(),
            },
        ]
    );
    assert!(!role.has_changes());

    let schemas = catalog.schemas(DB).await.unwrap();
    let hr = schemas.iter().find(|s| s.name == "hr").unwrap();
    assert_eq!(hr.owner, "readers");
    assert_eq!(
        catalog.role_members(Some(DB), "readers").await.unwrap(),
        vec!["U1".to_owned(), "U2".to_owned()]
    );
}

#[tokio::test]
async fn released_schema_goes_back_to_new_owner() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut role = svc.open_database_role(DB, "readers").await.unwrap();
    role.own_schema("hr").unwrap();
    svc.apply_database_role(&mut role).await.unwrap();

    let mut role = svc.open_database_role(DB, "readers").await.unwrap();
    assert_eq!(role.owned_schemas().collect::<Vec<_>>(), vec!["hr"]);
    role.release_schema("hr", "dbo").unwrap();
    svc.apply_database_role(&mut role).await.unwrap();

    let schemas = catalog.schemas(DB).await.unwrap();
    assert!(schemas.iter().all(|s| s.owner == "dbo"));
}

#[tokio::test]
async fn new_database_role_is_created_first() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut role = svc.new_database_role(DB, "writers").await.unwrap();
    role.set_owner(Some("dbo".to_owned()));
    role.add_member("U1");
    svc.apply_database_role(&mut role).await.unwrap();

    assert_eq!(
        catalog.calls(),
        vec![
            format!("CREATE ROLE {DB}.writers AUTHORIZATION dbo"),
            format!("ALTER ROLE {DB}.writers ADD MEMBER U1"),
        ]
    );
    assert!(role.exists());

    let err = svc.new_database_role(DB, "writers").await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidArgument(_)));
}

#[tokio::test]
async fn missing_role_is_not_found() {
    let catalog = catalog();
    let svc = service(&catalog);
    let err = svc.open_database_role(DB, "ghosts").await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::NotFound {
            kind: "database role",
            ..
        }
    ));
    let err = svc.open_server_role("ghosts").await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn fixed_server_role_rejects_edits() {
    let catalog = catalog();
    let svc = service(&catalog);
    let mut sysadmin = svc.open_server_role("sysadmin").await.unwrap();
    assert!(sysadmin.is_fixed());
    assert!(sysadmin.set_owner(Some("L1".to_owned())).is_err());
    assert!(sysadmin.add_membership("securityadmin").is_err());
}

#[tokio::test]
async fn new_server_role_joins_members_and_parent() {
    let catalog = catalog();
    let svc = service(&catalog);

    let mut auditors = svc.new_server_role("auditors").await.unwrap();
    auditors.add_member("L1");
    assert!(auditors.add_membership("sysadmin").unwrap());
    let ops = svc.apply_server_role(&mut auditors).await.unwrap();
    assert_eq!(ops.len(), 3);

    assert_eq!(
        catalog.calls(),
        vec![
            "CREATE SERVER ROLE auditors".to_owned(),
            "ALTER SERVER ROLE auditors ADD MEMBER L1".to_owned(),
            "ALTER SERVER ROLE sysadmin ADD MEMBER auditors".to_owned(),
        ]
    );
    let reopened = svc.open_server_role("auditors").await.unwrap();
    assert_eq!(reopened.members().collect::<Vec<_>>(), vec!["L1"]);
    assert_eq!(reopened.memberships().collect::<Vec<_>>(), vec!["sysadmin"]);
}
