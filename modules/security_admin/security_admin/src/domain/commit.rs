//! Commit planning and execution.
//!
//! A plan lists every grant, deny and revoke call needed to bring the
//! server in line with the in-memory states, in this order:
//!
//! 1. revokes on objects, then on columns
//! 2. grants with grant option, objects then columns
//! 3. plain grants, objects then columns
//! 4. denies, objects then columns
//!
//! Within a pass, calls are batched per (target, grantee, grantor, cascade).

use std::collections::BTreeMap;
use std::time::Duration;

use security_admin_sdk::{
    DenyOptions, GrantOptions, PermissionMutator, PermissionSet, PermissionStatus,
    PermissionTarget, PrincipalInfo, RevokeOptions,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::adapter::PermissionsAdapter;
use super::collections::PermissionStateCollection;
use super::error::DomainError;
use super::permission::Permission;
use super::principal::Principal;
use super::securable::Securable;
use super::state::PermissionState;

/// Kind of a permission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Revoke,
    GrantWithGrant,
    Grant,
    Deny,
}

impl OperationKind {
    fn status(self) -> PermissionStatus {
        match self {
            Self::Revoke => PermissionStatus::Revoke,
            Self::GrantWithGrant => PermissionStatus::WithGrant,
            Self::Grant => PermissionStatus::Grant,
            Self::Deny => PermissionStatus::Deny,
        }
    }

    fn cascades(self) -> bool {
        matches!(self, Self::Revoke | Self::Deny)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Revoke => "revoke",
            Self::GrantWithGrant | Self::Grant => "grant",
            Self::Deny => "deny",
        }
    }
}

/// One batched permission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionOperation {
    pub kind: OperationKind,
    pub target: PermissionTarget,
    pub permissions: PermissionSet,
    pub grantee: String,
    pub grantor: Option<String>,
    pub cascade: bool,
}

impl std::fmt::Display for PermissionOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.kind {
            OperationKind::Revoke => "REVOKE",
            OperationKind::GrantWithGrant | OperationKind::Grant => "GRANT",
            OperationKind::Deny => "DENY",
        };
        write!(f, "{verb} {} ON ", self.permissions.sql_names().join(", "))?;
        match &self.target {
            PermissionTarget::Object { urn, .. } => write!(f, "{urn}")?,
            PermissionTarget::Columns {
                parent_urn,
                columns,
            } => write!(f, "{parent_urn} ({})", columns.join(", "))?,
            PermissionTarget::Database { name } => write!(f, "DATABASE::{name}")?,
            PermissionTarget::Server => f.write_str("SERVER")?,
        }
        write!(f, " TO {}", self.grantee)?;
        if self.kind == OperationKind::GrantWithGrant {
            f.write_str(" WITH GRANT OPTION")?;
        }
        if self.cascade {
            f.write_str(" CASCADE")?;
        }
        if let Some(grantor) = &self.grantor {
            write!(f, " AS {grantor}")?;
        }
        Ok(())
    }
}

/// What happened to a planned operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum OperationOutcome {
    Applied,
    Failed(String),
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOperation {
    pub operation: PermissionOperation,
    pub outcome: OperationOutcome,
}

/// Record of a commit: every planned operation and its outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitLog {
    entries: Vec<LoggedOperation>,
}

impl CommitLog {
    fn pending(operations: &[PermissionOperation]) -> Self {
        Self {
            entries: operations
                .iter()
                .cloned()
                .map(|operation| LoggedOperation {
                    operation,
                    outcome: OperationOutcome::Pending,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LoggedOperation] {
        &self.entries
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn applied(&self) -> Vec<&PermissionOperation> {
        self.with_outcome(|o| *o == OperationOutcome::Applied)
    }

    #[must_use]
    pub fn pending_operations(&self) -> Vec<&PermissionOperation> {
        self.with_outcome(|o| *o == OperationOutcome::Pending)
    }

    /// The operation that failed and its error message.
    #[must_use]
    pub fn failed(&self) -> Option<(&PermissionOperation, &str)> {
        self.entries.iter().find_map(|e| match &e.outcome {
            OperationOutcome::Failed(msg) => Some((&e.operation, msg.as_str())),
            _ => None,
        })
    }

    fn with_outcome(&self, pred: impl Fn(&OperationOutcome) -> bool) -> Vec<&PermissionOperation> {
        self.entries
            .iter()
            .filter(|e| pred(&e.outcome))
            .map(|e| &e.operation)
            .collect()
    }
}

struct Pair<'a> {
    securable: &'a Securable,
    principal: &'a PrincipalInfo,
    states: &'a PermissionStateCollection,
}

/// Ordered list of permission calls for one securable or one principal.
#[derive(Debug, Clone, Default)]
pub struct CommitPlan {
    operations: Vec<PermissionOperation>,
}

impl CommitPlan {
    /// Plans the changes of every principal tracked on `securable`,
    /// removed principals included.
    #[must_use]
    pub fn for_securable(securable: &Securable) -> Self {
        let pairs: Vec<_> = securable
            .all_principals()
            .map(|entry| Pair {
                securable,
                principal: &entry.principal,
                states: &entry.states,
            })
            .collect();
        Self::build(&pairs)
    }

    /// Plans the changes of `principal` on every securable it tracks,
    /// removed securables included.
    #[must_use]
    pub fn for_principal(principal: &Principal) -> Self {
        let pairs: Vec<_> = principal
            .all_securables()
            .map(|entry| Pair {
                securable: &entry.securable,
                principal: principal.info(),
                states: &entry.states,
            })
            .collect();
        Self::build(&pairs)
    }

    fn build(pairs: &[Pair<'_>]) -> Self {
        let mut builder = PlanBuilder::default();
        for kind in [
            OperationKind::Revoke,
            OperationKind::GrantWithGrant,
            OperationKind::Grant,
            OperationKind::Deny,
        ] {
            for pair in pairs {
                builder.object_pass(pair, kind);
            }
            for pair in pairs {
                builder.column_pass(pair, kind);
            }
        }
        Self {
            operations: builder.operations,
        }
    }

    #[must_use]
    pub fn operations(&self) -> &[PermissionOperation] {
        &self.operations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Issues every operation in order, each bounded by `timeout`.
    ///
    /// Nothing is retried or rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::PartialCommit`] carrying the log and the
    /// underlying error as soon as one call fails.
    pub async fn execute(
        &self,
        mutator: &dyn PermissionMutator,
        timeout: Duration,
    ) -> Result<CommitLog, DomainError> {
        let mut log = CommitLog::pending(&self.operations);
        for idx in 0..log.entries.len() {
            let result = issue(mutator, &log.entries[idx].operation, timeout).await;
            match result {
                Ok(()) => log.entries[idx].outcome = OperationOutcome::Applied,
                Err(err) => {
                    warn!(
                        operation = %log.entries[idx].operation,
                        error = %err,
                        "permission call failed, stopping commit"
                    );
                    log.entries[idx].outcome = OperationOutcome::Failed(err.to_string());
                    return Err(DomainError::PartialCommit {
                        log: Box::new(log),
                        source: Box::new(err),
                    });
                }
            }
        }
        info!(operations = log.total(), "permission changes committed");
        Ok(log)
    }
}

async fn issue(
    mutator: &dyn PermissionMutator,
    op: &PermissionOperation,
    timeout: Duration,
) -> Result<(), DomainError> {
    debug!(operation = %op, "issuing permission call");
    let call = async {
        match op.kind {
            OperationKind::Revoke => {
                let options = RevokeOptions {
                    cascade: op.cascade,
                    grantor: op.grantor.clone(),
                };
                mutator
                    .revoke(&op.target, &op.permissions, &op.grantee, &options)
                    .await
            }
            OperationKind::GrantWithGrant | OperationKind::Grant => {
                let options = GrantOptions {
                    with_grant_option: op.kind == OperationKind::GrantWithGrant,
                    grantor: op.grantor.clone(),
                };
                mutator
                    .grant(&op.target, &op.permissions, &op.grantee, &options)
                    .await
            }
            OperationKind::Deny => {
                let options = DenyOptions {
                    cascade: op.cascade,
                    grantor: op.grantor.clone(),
                };
                mutator
                    .deny(&op.target, &op.permissions, &op.grantee, &options)
                    .await
            }
        }
    };
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| DomainError::Timeout {
            operation: op.kind.name(),
        })?
        .map_err(DomainError::from)
}

#[derive(Default)]
struct PlanBuilder {
    operations: Vec<PermissionOperation>,
}

impl PlanBuilder {
    fn object_pass(&mut self, pair: &Pair<'_>, kind: OperationKind) {
        let changed: Vec<&PermissionState> = pair
            .states
            .iter()
            .filter(|s| s.state_changed() && s.state() == kind.status())
            .collect();
        let adapter = PermissionsAdapter::for_securable(pair.securable);
        self.push_batches(&adapter, pair.principal, &changed, kind);
    }

    fn column_pass(&mut self, pair: &Pair<'_>, kind: OperationKind) {
        for column in pair.securable.columns() {
            let changed: Vec<&PermissionState> = pair
                .states
                .iter()
                .filter_map(|parent| parent.child(column.name()))
                .filter(|s| s.state_changed() && s.state() == kind.status())
                .collect();
            if changed.is_empty() {
                continue;
            }
            let adapter = PermissionsAdapter::for_column(pair.securable, column.name());
            self.push_batches(&adapter, pair.principal, &changed, kind);
        }
    }

    fn push_batches(
        &mut self,
        adapter: &PermissionsAdapter,
        principal: &PrincipalInfo,
        states: &[&PermissionState],
        kind: OperationKind,
    ) {
        let mut batches: BTreeMap<(String, bool), Vec<Permission>> = BTreeMap::new();
        for state in states {
            let cascade = kind.cascades() && state.cascade_needed();
            batches
                .entry((state.grantor().to_owned(), cascade))
                .or_default()
                .push(state.permission());
        }

        for ((grantor, cascade), permissions) in batches {
            let set = adapter.permission_set(&permissions);
            if set.is_empty() {
                continue;
            }
            self.operations.push(PermissionOperation {
                kind,
                target: adapter.target(),
                permissions: set,
                grantee: principal.name.clone(),
                grantor: (!grantor.is_empty()).then_some(grantor),
                cascade,
            });
        }
    }
}
