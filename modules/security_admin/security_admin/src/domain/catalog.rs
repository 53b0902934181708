//! Relevant-permission catalog.
//!
//! Static lookup tables that decide which permissions are meaningful for an
//! object kind, and which object kinds are meaningful for a principal kind,
//! on a given server version, engine type and edition.

use security_admin_sdk::{
    DatabasePermission, EngineEdition, EngineType, ObjectPermission, PrincipalType,
    SecurableType, ServerInfo, ServerPermission,
};

use super::permission::Permission;

const MASTER_DATABASE: &str = "master";

/// Server and database facts that gate the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogContext {
    pub major_version: u32,
    pub database: Option<String>,
    pub engine_type: EngineType,
    pub engine_edition: EngineEdition,
}

impl CatalogContext {
    #[must_use]
    pub fn new(server: &ServerInfo, database: Option<&str>) -> Self {
        Self {
            major_version: server.version.major,
            database: database.map(str::to_owned),
            engine_type: server.engine_type,
            engine_edition: server.engine_edition,
        }
    }

    /// Same server facts, different database.
    #[must_use]
    pub fn for_database(&self, database: Option<&str>) -> Self {
        Self {
            database: database.map(str::to_owned),
            ..self.clone()
        }
    }

    fn at_least(&self, major: u32) -> bool {
        self.major_version >= major
    }

    fn is_master(&self) -> bool {
        self.database
            .as_deref()
            .is_some_and(|db| db.eq_ignore_ascii_case(MASTER_DATABASE))
    }

    fn is_data_warehouse(&self) -> bool {
        self.engine_edition == EngineEdition::SqlDataWarehouse
    }

    fn is_cloud_database(&self) -> bool {
        self.engine_type == EngineType::SqlAzureDatabase
    }
}

/// Ordered permissions meaningful for `securable_type` in `ctx`.
#[must_use]
pub fn relevant_permissions(securable_type: SecurableType, ctx: &CatalogContext) -> Vec<Permission> {
    match securable_type {
        SecurableType::Server => server_permissions(ctx)
            .into_iter()
            .filter_map(Permission::from_server)
            .collect(),
        SecurableType::Database => database_permissions(ctx)
            .into_iter()
            .filter_map(Permission::from_database)
            .collect(),
        other => object_permissions(other, ctx)
            .into_iter()
            .filter_map(Permission::from_object)
            .collect(),
    }
}

fn object_permissions(securable_type: SecurableType, ctx: &CatalogContext) -> Vec<ObjectPermission> {
    use ObjectPermission as P;

    let mut list = match securable_type {
        SecurableType::Table | SecurableType::View => vec![
            P::Alter,
            P::Control,
            P::Delete,
            P::Insert,
            P::References,
            P::Select,
            P::TakeOwnership,
            P::Update,
            P::ViewChangeTracking,
            P::ViewDefinition,
        ],
        SecurableType::Column => vec![P::References, P::Select, P::Update],
        SecurableType::StoredProcedure => vec![
            P::Alter,
            P::Control,
            P::Execute,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::ExtendedStoredProcedure => {
            vec![P::Control, P::Execute, P::TakeOwnership, P::ViewDefinition]
        }
        SecurableType::ScalarFunction | SecurableType::AggregateFunction => vec![
            P::Alter,
            P::Control,
            P::Execute,
            P::References,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::TableValuedFunction | SecurableType::InlineFunction => vec![
            P::Alter,
            P::Control,
            P::Delete,
            P::Insert,
            P::References,
            P::Select,
            P::TakeOwnership,
            P::Update,
            P::ViewDefinition,
        ],
        SecurableType::Synonym => vec![
            P::Alter,
            P::Control,
            P::Delete,
            P::Execute,
            P::Insert,
            P::Select,
            P::TakeOwnership,
            P::Update,
            P::ViewDefinition,
        ],
        SecurableType::Sequence => vec![
            P::Alter,
            P::Control,
            P::References,
            P::TakeOwnership,
            P::Update,
            P::ViewDefinition,
        ],
        SecurableType::Schema => vec![
            P::Alter,
            P::Control,
            P::CreateSequence,
            P::Delete,
            P::Execute,
            P::Insert,
            P::References,
            P::Select,
            P::TakeOwnership,
            P::Update,
            P::ViewChangeTracking,
            P::ViewDefinition,
        ],
        SecurableType::UserDefinedDataType
        | SecurableType::UserDefinedTableType
        | SecurableType::UserDefinedType => vec![
            P::Control,
            P::Execute,
            P::References,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::XmlSchemaCollection => vec![
            P::Alter,
            P::Control,
            P::Execute,
            P::References,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::Assembly
        | SecurableType::Certificate
        | SecurableType::AsymmetricKey
        | SecurableType::SymmetricKey
        | SecurableType::FullTextCatalog
        | SecurableType::FullTextStopList
        | SecurableType::SearchPropertyList
        | SecurableType::MessageType
        | SecurableType::ServiceContract
        | SecurableType::ExternalDataSource
        | SecurableType::ExternalFileFormat
        | SecurableType::DatabaseScopedCredential => vec![
            P::Alter,
            P::Control,
            P::References,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::BrokerService => vec![
            P::Alter,
            P::Control,
            P::Send,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::ServiceQueue => vec![
            P::Alter,
            P::Control,
            P::Receive,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::RemoteServiceBinding
        | SecurableType::ServiceRoute
        | SecurableType::DatabaseRole
        | SecurableType::ApplicationRole
        | SecurableType::ServerRole => {
            vec![P::Alter, P::Control, P::TakeOwnership, P::ViewDefinition]
        }
        SecurableType::User | SecurableType::Login => {
            vec![P::Alter, P::Control, P::Impersonate, P::ViewDefinition]
        }
        SecurableType::Endpoint | SecurableType::AvailabilityGroup => vec![
            P::Alter,
            P::Connect,
            P::Control,
            P::TakeOwnership,
            P::ViewDefinition,
        ],
        SecurableType::Server | SecurableType::Database => Vec::new(),
    };

    if !ctx.at_least(10) {
        list.retain(|p| *p != P::ViewChangeTracking);
    }
    if !ctx.at_least(11) {
        list.retain(|p| *p != P::CreateSequence);
    }
    if ctx.at_least(16) && matches!(securable_type, SecurableType::Table | SecurableType::Column) {
        list.push(P::Unmask);
    }

    list
}

fn database_permissions(ctx: &CatalogContext) -> Vec<DatabasePermission> {
    use DatabasePermission as P;

    P::ALL
        .iter()
        .copied()
        .filter(|p| match p {
            P::CreateDatabase => ctx.is_master(),
            P::BackupLog | P::CreateDefault | P::CreateRule => !ctx.is_data_warehouse(),
            P::AlterAnyDatabaseAudit => ctx.at_least(11),
            P::AlterAnyDatabaseScopedConfiguration
            | P::AlterAnyExternalDataSource
            | P::AlterAnyExternalFileFormat
            | P::AlterAnyMask
            | P::AlterAnySecurityPolicy
            | P::ExecuteAnyExternalScript
            | P::Unmask => ctx.at_least(13),
            P::KillDatabaseConnection => ctx.is_cloud_database(),
            _ => true,
        })
        .collect()
}

fn server_permissions(ctx: &CatalogContext) -> Vec<ServerPermission> {
    use ServerPermission as P;

    P::ALL
        .iter()
        .copied()
        .filter(|p| match p {
            P::AlterAnyServerRole
            | P::CreateServerRole
            | P::AlterAnyAvailabilityGroup
            | P::CreateAvailabilityGroup => ctx.at_least(11),
            P::ConnectAnyDatabase | P::ImpersonateAnyLogin | P::SelectAllUserSecurables => {
                ctx.at_least(12)
            }
            _ => true,
        })
        .collect()
}

/// Object kinds a principal of `principal_type` can hold permissions on.
#[must_use]
pub fn relevant_securable_types(
    principal_type: PrincipalType,
    ctx: &CatalogContext,
) -> Vec<SecurableType> {
    if principal_type.is_server_scoped() {
        let mut types = vec![SecurableType::Server, SecurableType::Endpoint, SecurableType::Login];
        if ctx.at_least(11) {
            types.push(SecurableType::ServerRole);
            types.push(SecurableType::AvailabilityGroup);
        }
        return types;
    }

    let mut types = vec![
        SecurableType::Database,
        SecurableType::Schema,
        SecurableType::Table,
        SecurableType::View,
        SecurableType::StoredProcedure,
    ];
    if ctx.is_master() {
        types.push(SecurableType::ExtendedStoredProcedure);
    }
    types.extend([
        SecurableType::ScalarFunction,
        SecurableType::TableValuedFunction,
        SecurableType::InlineFunction,
        SecurableType::AggregateFunction,
        SecurableType::Synonym,
    ]);
    if ctx.at_least(11) {
        types.push(SecurableType::Sequence);
    }
    types.extend([
        SecurableType::UserDefinedDataType,
        SecurableType::UserDefinedTableType,
        SecurableType::UserDefinedType,
        SecurableType::XmlSchemaCollection,
        SecurableType::Assembly,
        SecurableType::Certificate,
        SecurableType::AsymmetricKey,
        SecurableType::SymmetricKey,
        SecurableType::FullTextCatalog,
        SecurableType::FullTextStopList,
    ]);
    if ctx.at_least(11) {
        types.push(SecurableType::SearchPropertyList);
    }
    if !ctx.is_data_warehouse() {
        types.extend([
            SecurableType::MessageType,
            SecurableType::ServiceContract,
            SecurableType::BrokerService,
            SecurableType::ServiceQueue,
            SecurableType::RemoteServiceBinding,
            SecurableType::ServiceRoute,
        ]);
    }
    if ctx.at_least(13) {
        types.extend([
            SecurableType::ExternalDataSource,
            SecurableType::ExternalFileFormat,
            SecurableType::DatabaseScopedCredential,
        ]);
    }
    types.extend([
        SecurableType::User,
        SecurableType::DatabaseRole,
        SecurableType::ApplicationRole,
    ]);
    types
}
