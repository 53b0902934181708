//! Static Catalog Plugin
//!
//! This plugin serves server metadata from configuration and applies
//! permission and role mutations to an in-memory copy of it.
//! Useful for testing, development and offline inspection.
//!
//! ## Configuration
//!
//! ```yaml
//! server:
//!   version: { major: 16 }
//!   engine_edition: enterprise
//! logins: ["L1"]
//! databases:
//!   - name: sales
//!     schemas: [{ name: dbo, owner: dbo }]
//!     users: ["U1"]
//!     objects:
//!       - { name: t1, schema: dbo, type: table, columns: [c1, c2] }
//! grants:
//!   - on: "Server/Database[@Name='sales']/Table[@Name='t1' and @Schema='dbo']"
//!     grantee: U1
//!     permission: SELECT
//!     state: deny
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;
pub mod urn;

pub use config::StaticCatalogPluginConfig;
pub use domain::Service as StaticCatalog;
