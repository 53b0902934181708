pub mod adapter;
pub mod catalog;
pub mod collections;
pub mod commit;
pub mod error;
pub mod keys;
pub mod permission;
pub mod population;
pub mod principal;
pub mod roles;
pub mod securable;
pub mod service;
pub mod state;

pub use adapter::PermissionsAdapter;
pub use catalog::{CatalogContext, relevant_permissions, relevant_securable_types};
pub use collections::{Cursor, KeyedCollection, PermissionStateCollection};
pub use commit::{CommitLog, CommitPlan, OperationKind, OperationOutcome, PermissionOperation};
pub use error::DomainError;
pub use keys::{PrincipalKey, SecurableKey};
pub use permission::Permission;
pub use population::{GrantRows, populate_permission_states};
pub use principal::{Principal, SecurableEntry};
pub use roles::{DatabaseRole, RoleOperation, ServerRole};
pub use securable::{PrincipalEntry, Securable, SecurableShape};
pub use service::Service;
pub use state::{PermissionState, StateAddress, StateChange, StateMutation, determine_display_state};
