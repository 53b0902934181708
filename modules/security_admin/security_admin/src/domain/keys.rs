//! Identity keys for securables and principals.

use security_admin_sdk::{PrincipalInfo, PrincipalType, SecurableInfo, SecurableType};
use serde::Serialize;

/// Identity of a securable: schema, name and kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SecurableKey {
    pub schema: Option<String>,
    pub name: String,
    pub securable_type: SecurableType,
}

impl SecurableKey {
    #[must_use]
    pub fn new(schema: Option<&str>, name: impl Into<String>, securable_type: SecurableType) -> Self {
        Self {
            schema: schema.map(str::to_owned),
            name: name.into(),
            securable_type,
        }
    }

    #[must_use]
    pub fn from_info(info: &SecurableInfo) -> Self {
        Self::new(info.schema.as_deref(), info.name.clone(), info.securable_type)
    }

    #[must_use]
    pub fn is_column(&self) -> bool {
        self.securable_type == SecurableType::Column
    }
}

impl std::fmt::Display for SecurableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) if !self.is_column() => write!(f, "{schema}.{}", self.name),
            _ => f.write_str(&self.name),
        }
    }
}

/// Identity of a principal: name and kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PrincipalKey {
    pub name: String,
    pub principal_type: PrincipalType,
}

impl PrincipalKey {
    #[must_use]
    pub fn new(name: impl Into<String>, principal_type: PrincipalType) -> Self {
        Self {
            name: name.into(),
            principal_type,
        }
    }

    #[must_use]
    pub fn from_info(info: &PrincipalInfo) -> Self {
        Self::new(info.name.clone(), info.principal_type)
    }
}

impl std::fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
