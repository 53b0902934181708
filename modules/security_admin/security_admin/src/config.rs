//! Configuration for the security admin module.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Module configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityAdminConfig {
    /// Upper bound for a single metadata query, in milliseconds.
    pub query_timeout_ms: u64,

    /// Upper bound for a single grant / deny / revoke or role call, in milliseconds.
    pub commit_timeout_ms: u64,

    /// Grantor recorded on synthesised states when a securable has no
    /// expected grantor of its own.
    pub default_expected_grantor: Option<String>,
}

impl Default for SecurityAdminConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
            commit_timeout_ms: 60_000,
            default_expected_grantor: None,
        }
    }
}

impl SecurityAdminConfig {
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    #[must_use]
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}
