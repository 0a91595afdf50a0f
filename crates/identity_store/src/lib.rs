pub mod config;
pub mod datastore;
mod db;
pub mod default_mapping;
pub mod mapping;
pub mod migration;
pub mod query;
pub mod session;
pub mod store;

pub use aideon_identity_core::*;
pub use config::{DatabaseConfig, IdentityStoreConfig, PoolConfig};
pub use datastore::{connect, default_sqlite_path, load_or_init_config, open_default};
pub use default_mapping::{default_declarations, default_registry};
pub use mapping::{
    EntityMapper, EntityMapperRegistry, MappingDescriptor, ObjectRowTranslator, OwnerBinding,
    OwnerTarget, RowDeclaration, RowKind,
};
pub use query::{QueryPlan, QueryTranslator, Translation};
pub use session::SeaOrmSession;
pub use store::IdentityStore;
