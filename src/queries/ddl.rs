use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Instances, Metadata, Processes, Users};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS users (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL,
///     role TEXT NOT NULL DEFAULT 'user',
///     api_token TEXT NOT NULL UNIQUE
/// )
pub fn create_users_table() -> String {
    Table::create()
        .table(Users::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Users::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Users::Name).string().not_null())
        .col(ColumnDef::new(Users::Role).string().not_null().default("user"))
        .col(
            ColumnDef::new(Users::ApiToken)
                .string()
                .not_null()
                .unique_key(),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS processes (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL,
///     description TEXT,
///     metadata_schema TEXT NOT NULL,
///     is_official INTEGER NOT NULL DEFAULT 0,
///     created_by INTEGER NOT NULL REFERENCES users(id),
///     created_at_ms INTEGER NOT NULL
/// )
pub fn create_processes_table() -> String {
    Table::create()
        .table(Processes::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Processes::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Processes::Name).string().not_null())
        .col(ColumnDef::new(Processes::Description).string())
        .col(ColumnDef::new(Processes::MetadataSchema).text().not_null())
        .col(
            ColumnDef::new(Processes::IsOfficial)
                .integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(Processes::CreatedBy).big_integer().not_null())
        .col(
            ColumnDef::new(Processes::CreatedAtMs)
                .big_integer()
                .not_null(),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Processes::Table, Processes::CreatedBy)
                .to(Users::Table, Users::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS instances (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     process_id INTEGER NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
///     user_id INTEGER NOT NULL REFERENCES users(id),
///     start_time_ms INTEGER NOT NULL,
///     end_time_ms INTEGER,
///     duration_seconds INTEGER,
///     metadata TEXT NOT NULL,
///     created_at_ms INTEGER NOT NULL,
///     updated_at_ms INTEGER NOT NULL
/// )
pub fn create_instances_table() -> String {
    Table::create()
        .table(Instances::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Instances::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Instances::ProcessId).big_integer().not_null())
        .col(ColumnDef::new(Instances::UserId).big_integer().not_null())
        .col(
            ColumnDef::new(Instances::StartTimeMs)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(Instances::EndTimeMs).big_integer())
        .col(ColumnDef::new(Instances::DurationSeconds).big_integer())
        .col(ColumnDef::new(Instances::Metadata).text().not_null())
        .col(
            ColumnDef::new(Instances::CreatedAtMs)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(Instances::UpdatedAtMs)
                .big_integer()
                .not_null(),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Instances::Table, Instances::ProcessId)
                .to(Processes::Table, Processes::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Instances::Table, Instances::UserId)
                .to(Users::Table, Users::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_instances_user_start ON instances(user_id, start_time_ms)
pub fn create_instances_user_start_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_instances_user_start")
        .table(Instances::Table)
        .col(Instances::UserId)
        .col(Instances::StartTimeMs)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_instances_process_id ON instances(process_id)
pub fn create_instances_process_id_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_instances_process_id")
        .table(Instances::Table)
        .col(Instances::ProcessId)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_processes_created_by ON processes(created_by)
pub fn create_processes_created_by_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_processes_created_by")
        .table(Processes::Table)
        .col(Processes::CreatedBy)
        .to_string(SqliteQueryBuilder)
}
