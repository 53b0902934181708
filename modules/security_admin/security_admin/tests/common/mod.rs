#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Common test utilities for security_admin integration tests

use std::sync::Arc;

use security_admin::{SecurityAdminConfig, Service};
use security_admin_sdk::{PermissionMutator, SecurableType};
use serde_json::json;
use static_catalog_plugin::{StaticCatalog, StaticCatalogPluginConfig, urn};

pub const DB: &str = "sales";

pub fn table_urn() -> String {
    urn::database_object(DB, SecurableType::Table, Some("dbo"), "t1")
}

pub fn database_urn() -> String {
    urn::database(DB)
}

/// Server 16 with one database:
/// - `dbo.t1 (A, B)`: U1 has SELECT granted on the table and denied on A
/// - `sales`: U2 has CREATE TABLE with grant option
/// - role `readers` owned by dbo with member U2
pub fn catalog() -> Arc<StaticCatalog> {
    catalog_with_columns(&["A", "B"])
}

/// Same catalog with `t1` carrying `columns`, which must include `A`.
pub fn catalog_with_columns(columns: &[&str]) -> Arc<StaticCatalog> {
    let table = table_urn();
    let config: StaticCatalogPluginConfig = serde_json::from_value(json!({
        "server": { "version": { "major": 16 }, "engine_edition": "enterprise" },
        "logins": ["L1"],
        "server_roles": [
            { "name": "sysadmin", "is_fixed": true, "members": ["L1"] }
        ],
        "databases": [{
            "name": DB,
            "schemas": [
                { "name": "dbo", "owner": "dbo" },
                { "name": "hr", "owner": "dbo" }
            ],
            "users": ["dbo", "U1", "U2"],
            "roles": [
                { "name": "readers", "owner": "dbo", "members": ["U2"] }
            ],
            "objects": [
                { "name": "t1", "schema": "dbo", "type": "table", "columns": columns },
                { "name": "p1", "schema": "dbo", "type": "stored_procedure" }
            ]
        }],
        "grants": [
            { "on": table, "grantee": "U1", "permission": "SELECT" },
            { "on": urn::column(&table, "A"), "grantee": "U1", "permission": "SELECT", "state": "deny" },
            { "on": database_urn(), "grantee": "U2", "permission": "CREATE TABLE", "state": "with_grant" }
        ]
    }))
    .unwrap();
    Arc::new(StaticCatalog::from_config(&config))
}

pub fn service(catalog: &Arc<StaticCatalog>) -> Service {
    service_with(catalog, catalog.clone(), SecurityAdminConfig::default())
}

pub fn service_with(
    catalog: &Arc<StaticCatalog>,
    permissions: Arc<dyn PermissionMutator>,
    config: SecurityAdminConfig,
) -> Service {
    Service::new(catalog.clone(), permissions, catalog.clone(), config)
}
