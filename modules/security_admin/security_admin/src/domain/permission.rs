//! Named permissions and their external vocabulary equivalents.
//!
//! Every permission is a flyweight backed by one static registry. The
//! registry is built once from the three vocabularies: object permissions
//! first, then database permissions, then server permissions, merging
//! entries that share the same SQL name (`SELECT` on a table and `SELECT`
//! on a database are the same named permission).

use std::collections::HashMap;
use std::sync::LazyLock;

use security_admin_sdk::{
    DatabasePermission, ObjectPermission, PermissionCode, ServerPermission, VocabularyScope,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug)]
struct PermissionInfo {
    name: &'static str,
    object: Option<ObjectPermission>,
    database: Option<DatabasePermission>,
    server: Option<ServerPermission>,
}

struct Registry {
    entries: Vec<PermissionInfo>,
    by_name: HashMap<&'static str, usize>,
    by_object: HashMap<ObjectPermission, usize>,
    by_database: HashMap<DatabasePermission, usize>,
    by_server: HashMap<ServerPermission, usize>,
}

impl Registry {
    fn build() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            by_object: HashMap::new(),
            by_database: HashMap::new(),
            by_server: HashMap::new(),
        };

        for p in ObjectPermission::ALL {
            let idx = registry.entry(p.sql_name());
            registry.entries[idx].object = Some(*p);
            registry.by_object.insert(*p, idx);
        }
        for p in DatabasePermission::ALL {
            let idx = registry.entry(p.sql_name());
            registry.entries[idx].database = Some(*p);
            registry.by_database.insert(*p, idx);
        }
        for p in ServerPermission::ALL {
            let idx = registry.entry(p.sql_name());
            registry.entries[idx].server = Some(*p);
            registry.by_server.insert(*p, idx);
        }

        registry
    }

    fn entry(&mut self, name: &'static str) -> usize {
        if let Some(idx) = self.by_name.get(name) {
            return *idx;
        }
        let idx = self.entries.len();
        self.entries.push(PermissionInfo {
            name,
            object: None,
            database: None,
            server: None,
        });
        self.by_name.insert(name, idx);
        idx
    }

    fn at(&'static self, idx: usize) -> Permission {
        Permission(&self.entries[idx])
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::build);

/// A named permission.
///
/// Cheap to copy; equality, ordering and hashing use the name only.
#[derive(Clone, Copy)]
pub struct Permission(&'static PermissionInfo);

impl Permission {
    /// Looks up a permission by SQL name, ignoring ASCII case.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        let registry: &'static Registry = &REGISTRY;
        let upper = name.trim().to_ascii_uppercase();
        registry
            .by_name
            .get(upper.as_str())
            .map(|idx| registry.at(*idx))
    }

    /// Permission for an object vocabulary value.
    #[must_use]
    pub fn from_object(p: ObjectPermission) -> Option<Self> {
        let registry: &'static Registry = &REGISTRY;
        registry.by_object.get(&p).map(|idx| registry.at(*idx))
    }

    /// Permission for a database vocabulary value.
    #[must_use]
    pub fn from_database(p: DatabasePermission) -> Option<Self> {
        let registry: &'static Registry = &REGISTRY;
        registry.by_database.get(&p).map(|idx| registry.at(*idx))
    }

    /// Permission for a server vocabulary value.
    #[must_use]
    pub fn from_server(p: ServerPermission) -> Option<Self> {
        let registry: &'static Registry = &REGISTRY;
        registry.by_server.get(&p).map(|idx| registry.at(*idx))
    }

    /// Resolves a reported code in the given vocabulary.
    ///
    /// Returns `None` for codes the vocabulary does not define.
    #[must_use]
    pub fn from_code(scope: VocabularyScope, code: PermissionCode) -> Option<Self> {
        match scope {
            VocabularyScope::Object => ObjectPermission::from_code(code).and_then(Self::from_object),
            VocabularyScope::Database => {
                DatabasePermission::from_code(code).and_then(Self::from_database)
            }
            VocabularyScope::Server => ServerPermission::from_code(code).and_then(Self::from_server),
        }
    }

    /// All registered permissions in registry order.
    pub fn all() -> impl Iterator<Item = Self> {
        let registry: &'static Registry = &REGISTRY;
        registry.entries.iter().map(Permission)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.0.name
    }

    #[must_use]
    pub fn object(self) -> Option<ObjectPermission> {
        self.0.object
    }

    #[must_use]
    pub fn database(self) -> Option<DatabasePermission> {
        self.0.database
    }

    #[must_use]
    pub fn server(self) -> Option<ServerPermission> {
        self.0.server
    }

    /// Returns `true` if the permission has a value in `scope`'s vocabulary.
    #[must_use]
    pub fn supports(self, scope: VocabularyScope) -> bool {
        match scope {
            VocabularyScope::Object => self.0.object.is_some(),
            VocabularyScope::Database => self.0.database.is_some(),
            VocabularyScope::Server => self.0.server.is_some(),
        }
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Permission {}

impl std::hash::Hash for Permission {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl PartialOrd for Permission {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Permission {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.name.cmp(other.0.name)
    }
}

impl std::fmt::Debug for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Permission({})", self.0.name)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.name)
    }
}

impl Serialize for Permission {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Permission::by_name(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown permission: {s}")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn object_and_database_share_names() {
        let select = Permission::by_name("SELECT").unwrap();
        assert_eq!(select.object(), Some(ObjectPermission::Select));
        assert_eq!(select.database(), Some(DatabasePermission::Select));
        assert_eq!(select.server(), None);
    }

    #[test]
    fn server_only_permission() {
        let p = Permission::from_server(ServerPermission::ControlServer).unwrap();
        assert_eq!(p.name(), "CONTROL SERVER");
        assert!(p.supports(VocabularyScope::Server));
        assert!(!p.supports(VocabularyScope::Object));
    }

    #[test]
    fn every_vocabulary_value_is_registered() {
        assert!(ObjectPermission::ALL
            .iter()
            .all(|p| Permission::from_object(*p).is_some()));
        assert!(DatabasePermission::ALL
            .iter()
            .all(|p| Permission::from_database(*p).is_some()));
        assert!(ServerPermission::ALL
            .iter()
            .all(|p| Permission::from_server(*p).is_some()));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(
            Permission::by_name("view definition"),
            Permission::by_name("VIEW DEFINITION")
        );
        assert!(Permission::by_name("FLY").is_none());
    }

    #[test]
    fn code_resolution_depends_on_vocabulary() {
        let code = DatabasePermission::CreateTable.code();
        let p = Permission::from_code(VocabularyScope::Database, code).unwrap();
        assert_eq!(p.name(), "CREATE TABLE");
        assert!(Permission::from_code(VocabularyScope::Object, PermissionCode(4242)).is_none());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = Permission::all().map(Permission::name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn serde_uses_name() {
        let p = Permission::by_name("EXECUTE").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#""EXECUTE""#);
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
