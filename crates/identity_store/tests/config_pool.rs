use aideon_identity_store::{
    AttributedType, DatabaseConfig, IdentityContext, IdentityError, IdentityResult,
    IdentityStoreConfig, PROP_NAME, PartitionStoreApi, REALM, SeaOrmSession, load_or_init_config,
    open_default,
};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn deserializes_pool_settings() {
    let payload = json!({
        "database": { "backend": "sqlite", "path": "data.sqlite" },
        "pool": {
            "max_connections": 20,
            "min_connections": 2,
            "connect_timeout_ms": 1000,
            "acquire_timeout_ms": 500,
            "idle_timeout_ms": 60000
        }
    });
    let config: IdentityStoreConfig = serde_json::from_value(payload).expect("config");
    match config.database {
        DatabaseConfig::Sqlite { ref path } => {
            assert_eq!(path.as_deref(), Some("data.sqlite"));
        }
        _ => panic!("expected sqlite backend"),
    }
    assert!(config.installs_default_schema());
    let pool = config.pool.expect("pool");
    assert_eq!(pool.max_connections, Some(20));
    assert_eq!(pool.min_connections, Some(2));
    assert_eq!(pool.connect_timeout_ms, Some(1000));
    assert_eq!(pool.acquire_timeout_ms, Some(500));
    assert_eq!(pool.idle_timeout_ms, Some(60000));
}

#[test]
fn load_or_init_keeps_existing_file() {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let created = load_or_init_config(base).expect("create");
    assert!(created.pool.is_none());
    assert_eq!(
        created.sqlite_path(base).expect("path"),
        base.join("identity.sqlite")
    );

    std::fs::write(
        base.join("identity.json"),
        json!({
            "database": { "backend": "mysql", "url": "mysql://localhost/idm" },
            "install_default_schema": false
        })
        .to_string(),
    )
    .expect("write config");
    let loaded = load_or_init_config(base).expect("load");
    assert_eq!(loaded.backend_name(), "mysql");
    assert_eq!(loaded.connection_url(), Some("mysql://localhost/idm"));
    assert!(!loaded.installs_default_schema());
}

#[test]
fn load_rejects_inverted_pool_bounds() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("identity.json"),
        json!({
            "database": { "backend": "sqlite" },
            "pool": { "max_connections": 1, "min_connections": 3 }
        })
        .to_string(),
    )
    .expect("write config");
    let err = load_or_init_config(dir.path()).expect_err("inverted bounds");
    assert!(matches!(err, IdentityError::Validation { .. }));
}

#[tokio::test]
async fn single_connection_pool_serves_the_store() -> IdentityResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    std::fs::write(
        base.join("identity.json"),
        json!({
            "database": { "backend": "sqlite", "path": "pooled.sqlite" },
            "pool": { "max_connections": 1, "min_connections": 1, "acquire_timeout_ms": 5000 },
            "log_statements": true
        })
        .to_string(),
    )
    .expect("write config");

    let (conn, store) = open_default(base).await?;
    assert!(base.join("pooled.sqlite").exists());
    let session = SeaOrmSession::new(&conn);
    let context = IdentityContext::new(&session);
    let realm = AttributedType::new(REALM).with(PROP_NAME, "pooled");
    store.add_partition(&context, &realm, "cfg").await?;
    let found = store
        .lookup_partition(&context, REALM, "pooled")
        .await?
        .expect("realm");
    assert_eq!(found.id, realm.id);
    Ok(())
}
