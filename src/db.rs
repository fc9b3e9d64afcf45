use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::constants::EXPECTED_DB_VERSION;
use crate::queries::{ddl, metadata};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Open a file-based database pool for production use
/// Creates the file if missing, enables WAL mode and foreign keys
pub async fn open_database_pool(db_path: &Path) -> Result<SqlitePool, DynError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create tables and indexes if they do not exist yet
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    sqlx::query(&ddl::create_metadata_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_users_table()).execute(pool).await?;
    sqlx::query(&ddl::create_processes_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_instances_table())
        .execute(pool)
        .await?;

    sqlx::query(&ddl::create_instances_user_start_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_instances_process_id_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_processes_created_by_index())
        .execute(pool)
        .await?;

    sqlx::query(&metadata::insert_or_ignore("version", EXPECTED_DB_VERSION))
        .execute(pool)
        .await?;

    Ok(())
}

/// Refuse to run against a database written by a different schema version
pub async fn check_database_version(pool: &SqlitePool) -> Result<(), DynError> {
    let row = sqlx::query(&metadata::select_by_key("version"))
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("Failed to read version from metadata: {}", e))?;

    let version: String = match row {
        Some(row) => row.get(0),
        None => return Err("Database has no version in metadata".into()),
    };

    if version != EXPECTED_DB_VERSION {
        return Err(format!(
            "Unsupported database version: '{}'. This application only supports version '{}'",
            version, EXPECTED_DB_VERSION
        )
        .into());
    }

    Ok(())
}

/// Open the pool, create the schema and verify the version in one step
pub async fn open_and_init(db_path: &Path) -> Result<SqlitePool, DynError> {
    let pool = open_database_pool(db_path).await?;
    init_database_schema(&pool).await?;
    check_database_version(&pool).await?;
    Ok(pool)
}

/// Create a database in a temporary directory for testing
/// The returned guard must be kept alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let dir = tempfile::tempdir()?;
    let pool = open_database_pool(&dir.path().join("test.sqlite")).await?;
    Ok((pool, dir))
}
