use log::{info, warn};
use sqlx::SqlitePool;

use super::now_ms;
use crate::error::{ApiError, Result};
use crate::fields::MetadataSchema;
use crate::models::{CreateProcess, Process, UpdateProcess, User};
use crate::queries::processes;

/// Official processes plus the caller's own
pub async fn list(pool: &SqlitePool, user: &User) -> Result<Vec<Process>> {
    let rows = sqlx::query(&processes::select_visible(user.id))
        .fetch_all(pool)
        .await?;
    rows.iter().map(Process::from_row).collect()
}

pub async fn get(pool: &SqlitePool, user: &User, id: i64) -> Result<Process> {
    let row = sqlx::query(&processes::select_visible_by_id(id, user.id))
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Process"))?;
    Process::from_row(&row)
}

async fn fetch_any(pool: &SqlitePool, id: i64) -> Result<Process> {
    let row = sqlx::query(&processes::select_by_id(id))
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Process"))?;
    Process::from_row(&row)
}

fn check_schema(schema: &MetadataSchema) -> Result<String> {
    schema.validate().map_err(ApiError::Validation)?;
    Ok(serde_json::to_string(schema)?)
}

pub async fn create(pool: &SqlitePool, user: &User, request: CreateProcess) -> Result<Process> {
    let name = match request.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(ApiError::Validation("Process name is required".to_string())),
    };
    let schema = request.metadata_schema.unwrap_or_default();
    let schema_json = check_schema(&schema)?;

    // Only admins may publish official processes; everyone else silently gets a private one
    let is_official = request.is_official.unwrap_or(false) && user.is_admin();

    let result = sqlx::query(&processes::insert(
        &name,
        request.description.as_deref(),
        &schema_json,
        is_official,
        user.id,
        now_ms(),
    ))
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!(
        "Process {} '{}' created by user {} (official: {})",
        id, name, user.id, is_official
    );
    fetch_any(pool, id).await
}

/// Load a process and make sure the caller may change it
async fn fetch_writable(pool: &SqlitePool, user: &User, id: i64) -> Result<Process> {
    let process = fetch_any(pool, id).await?;
    if !process.can_edit(user) {
        warn!("User {} denied write access to process {}", user.id, id);
        return Err(ApiError::Forbidden(
            "Only the creator or an admin (for official processes) can modify this process",
        ));
    }
    Ok(process)
}

/// Merge the provided fields into the stored process
pub async fn update(
    pool: &SqlitePool,
    user: &User,
    id: i64,
    request: UpdateProcess,
) -> Result<Process> {
    let current = fetch_writable(pool, user, id).await?;

    let name = match request.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::Validation("Process name cannot be empty".to_string())),
        other => other,
    };
    let schema_json = match &request.metadata_schema {
        Some(schema) => Some(check_schema(schema)?),
        None => None,
    };

    let sql = match processes::update_guarded(
        id,
        user.id,
        user.is_admin(),
        name,
        request.description.as_deref(),
        schema_json.as_deref(),
    ) {
        Some(sql) => sql,
        None => return Ok(current),
    };

    let result = sqlx::query(&sql).execute(pool).await?;
    if result.rows_affected() == 0 {
        // Deleted or re-owned between the check and the write
        return Err(ApiError::NotFound("Process"));
    }
    info!("Process {} updated by user {}", id, user.id);
    fetch_any(pool, id).await
}

/// Remove a process; its instances go with it
pub async fn delete(pool: &SqlitePool, user: &User, id: i64) -> Result<()> {
    fetch_writable(pool, user, id).await?;

    let result = sqlx::query(&processes::delete_guarded(id, user.id, user.is_admin()))
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Process"));
    }
    info!("Process {} deleted by user {}", id, user.id);
    Ok(())
}
