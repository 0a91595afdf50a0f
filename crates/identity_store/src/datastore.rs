use std::path::{Path, PathBuf};

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use aideon_identity_core::IdentityResult;

use crate::migration::Migrator;
use crate::{IdentityStore, IdentityStoreConfig};

const DEFAULT_DB_NAME: &str = "identity.sqlite";

pub fn load_or_init_config(base: &Path) -> IdentityResult<IdentityStoreConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    IdentityStoreConfig::load_or_init(base, &default_sqlite)
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

pub async fn connect(
    config: &IdentityStoreConfig,
    base_dir: &Path,
) -> IdentityResult<DatabaseConnection> {
    let conn = Database::connect(config.connect_options(base_dir)?).await?;
    if config.installs_default_schema() {
        Migrator::up(&conn, None).await?;
    }
    log::debug!("identity store connected to {} backend", config.backend_name());
    Ok(conn)
}

/// Connection plus a store over the configured mapping, read from `identity.json`.
pub async fn open_default(base: &Path) -> IdentityResult<(DatabaseConnection, IdentityStore)> {
    let config = load_or_init_config(base)?;
    let conn = connect(&config, base).await?;
    Ok((conn, IdentityStore::new(config.registry(base)?)))
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_default};
    use tempfile::tempdir;

    #[tokio::test]
    async fn opens_store_with_default_config() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), "sqlite");
        assert!(base.join("identity.json").exists());
        let (conn, store) = open_default(base).await.expect("open store");
        assert!(default_sqlite_path(base).exists());
        assert!(!store.registry().mappers().is_empty());
        let _ = conn;
    }
}
