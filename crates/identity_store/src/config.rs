use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sea_orm::ConnectOptions;
use serde::{Deserialize, Serialize};

use aideon_identity_core::{IdentityError, IdentityResult, TypeHierarchy};

use crate::default_mapping::default_declarations;
use crate::mapping::{EntityMapperRegistry, RowDeclaration};

const DEFAULT_CONFIG_NAME: &str = "identity.json";
const DEFAULT_DB_NAME: &str = "identity.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityStoreConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    /// Runs the bundled schema migrations on connect. Defaults to on.
    pub install_default_schema: Option<bool>,
    /// JSON list of row declarations used instead of the default mapping.
    pub mapping: Option<String>,
    /// Logs every statement the driver runs.
    pub log_statements: Option<bool>,
}

impl IdentityStoreConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            install_default_schema: Some(true),
            mapping: None,
            log_statements: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> IdentityResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| IdentityError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| IdentityError::storage(format!("read config: {err}")))?;
            let config: IdentityStoreConfig = serde_json::from_str(&raw)
                .map_err(|err| IdentityError::invalid(format!("identity config: {err}")))?;
            config.validate()?;
            return Ok(config);
        }
        let default = IdentityStoreConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| IdentityError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| IdentityError::storage(format!("write config: {err}")))?;
        log::debug!("wrote default identity config to {}", config_path.display());
        Ok(default)
    }

    /// Rejects settings no backend could honour.
    pub fn validate(&self) -> IdentityResult<()> {
        match &self.database {
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => {
                if url.trim().is_empty() {
                    return Err(IdentityError::invalid(format!(
                        "{} backend needs a connection url",
                        self.backend_name()
                    )));
                }
            }
            DatabaseConfig::Sqlite { .. } => {}
        }
        if let Some(pool) = &self.pool {
            if let (Some(min), Some(max)) = (pool.min_connections, pool.max_connections) {
                if min > max {
                    return Err(IdentityError::invalid(format!(
                        "pool min_connections {min} exceeds max_connections {max}"
                    )));
                }
            }
            if pool.max_connections == Some(0) {
                return Err(IdentityError::invalid("pool max_connections must be positive"));
            }
        }
        if let Some(mapping) = &self.mapping {
            if mapping.trim().is_empty() {
                return Err(IdentityError::invalid("mapping path is empty"));
            }
        }
        Ok(())
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> IdentityResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                Ok(resolve(base_dir, &path))
            }
            _ => Err(IdentityError::invalid("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn installs_default_schema(&self) -> bool {
        self.install_default_schema.unwrap_or(true)
    }

    /// Driver url plus pool and logging settings.
    pub fn connect_options(&self, base_dir: &Path) -> IdentityResult<ConnectOptions> {
        self.validate()?;
        let url = match &self.database {
            DatabaseConfig::Sqlite { .. } => {
                format!("sqlite://{}?mode=rwc", self.sqlite_path(base_dir)?.display())
            }
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => url.clone(),
        };
        let mut options = ConnectOptions::new(url);
        options.sqlx_logging(self.log_statements.unwrap_or(false));
        if let Some(pool) = &self.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        Ok(options)
    }

    /// Row declarations from the configured mapping file, or the default mapping.
    pub fn declarations(&self, base_dir: &Path) -> IdentityResult<Vec<RowDeclaration>> {
        let Some(mapping) = &self.mapping else {
            return Ok(default_declarations());
        };
        let path = resolve(base_dir, mapping);
        let raw = fs::read_to_string(&path).map_err(|err| {
            IdentityError::storage(format!("read mapping {}: {err}", path.display()))
        })?;
        let declarations: Vec<RowDeclaration> = serde_json::from_str(&raw).map_err(|err| {
            IdentityError::integrity(format!("mapping {}: {err}", path.display()))
        })?;
        log::debug!(
            "loaded {} row declarations from {}",
            declarations.len(),
            path.display()
        );
        Ok(declarations)
    }

    pub fn registry(&self, base_dir: &Path) -> IdentityResult<EntityMapperRegistry> {
        EntityMapperRegistry::configure(TypeHierarchy::builtin(), self.declarations(base_dir)?)
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{DatabaseConfig, IdentityStoreConfig, PoolConfig};
    use crate::default_mapping::default_declarations;
    use aideon_identity_core::{ColumnKind, IdentityError};

    #[test]
    fn relative_sqlite_paths_resolve_against_base() {
        let config = IdentityStoreConfig {
            database: DatabaseConfig::Sqlite { path: None },
            pool: None,
            install_default_schema: None,
            mapping: None,
            log_statements: None,
        };
        let path = config.sqlite_path(Path::new("/data")).expect("path");
        assert_eq!(path, Path::new("/data/identity.sqlite"));
        assert!(config.installs_default_schema());
        assert!(config.connection_url().is_none());
    }

    #[test]
    fn connect_options_carry_pool_settings() {
        let mut config = IdentityStoreConfig::default_sqlite("idm.sqlite");
        config.pool = Some(PoolConfig {
            max_connections: Some(8),
            min_connections: Some(2),
            connect_timeout_ms: Some(1500),
            acquire_timeout_ms: None,
            idle_timeout_ms: Some(30_000),
        });
        let options = config.connect_options(Path::new("/data")).expect("options");
        assert_eq!(options.get_url(), "sqlite:///data/idm.sqlite?mode=rwc");
        assert_eq!(options.get_max_connections(), Some(8));
        assert_eq!(options.get_min_connections(), Some(2));
        assert_eq!(options.get_connect_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn inverted_pool_bounds_are_rejected() {
        let mut config = IdentityStoreConfig::default_sqlite("idm.sqlite");
        config.pool = Some(PoolConfig {
            max_connections: Some(1),
            min_connections: Some(4),
            ..PoolConfig::default()
        });
        let err = config.validate().expect_err("min above max");
        assert!(matches!(err, IdentityError::Validation { .. }));

        let config = IdentityStoreConfig {
            database: DatabaseConfig::Postgres { url: " ".into() },
            pool: None,
            install_default_schema: None,
            mapping: None,
            log_statements: None,
        };
        assert!(config.connect_options(Path::new("/data")).is_err());
    }

    #[test]
    fn mapping_file_replaces_default_declarations() {
        let dir = tempdir().expect("tempdir");
        let mut declarations = default_declarations();
        for declaration in &mut declarations {
            for column in &mut declaration.shape.columns {
                if column.name == "identity_id" {
                    column.kind = ColumnKind::Text;
                }
            }
        }
        let payload = serde_json::to_string(&declarations).expect("serialize");
        std::fs::write(dir.path().join("mapping.json"), payload).expect("write mapping");

        let mut config = IdentityStoreConfig::default_sqlite("idm.sqlite");
        config.mapping = Some("mapping.json".into());
        let registry = config.registry(dir.path()).expect("registry");
        let member = registry.relationship_member_mapper().expect("members");
        let column = member.shape.find_column("identity_id").expect("column");
        assert_eq!(column.kind, ColumnKind::Text);

        config.mapping = Some("missing.json".into());
        let err = config.registry(dir.path()).expect_err("missing file");
        assert!(matches!(err, IdentityError::Storage { .. }));
    }
}
