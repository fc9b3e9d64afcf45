use log::info;
use sqlx::SqlitePool;

use super::{now_ms, to_millis};
use crate::constants::DEFAULT_INSTANCE_LIMIT;
use crate::error::{ApiError, Result};
use crate::models::{Instance, InstanceStats, ListInstances, StartInstance, UpdateInstance, User};
use crate::queries::{instances, processes};

/// Whole seconds between two millisecond timestamps, halves rounded up
pub fn duration_seconds(start_time_ms: i64, end_time_ms: i64) -> i64 {
    (end_time_ms - start_time_ms + 500).div_euclid(1000)
}

/// The caller's instances, newest start first
pub async fn list(pool: &SqlitePool, user: &User, filter: ListInstances) -> Result<Vec<Instance>> {
    let limit = filter.limit.unwrap_or(DEFAULT_INSTANCE_LIMIT);
    let offset = filter.offset.unwrap_or(0);
    if limit < 0 || offset < 0 {
        return Err(ApiError::Validation(
            "limit and offset must not be negative".to_string(),
        ));
    }

    let rows = sqlx::query(&instances::select_owned(
        user.id,
        filter.process_id,
        limit as u64,
        offset as u64,
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(Instance::from_row).collect()
}

pub async fn get(pool: &SqlitePool, user: &User, id: i64) -> Result<Instance> {
    let row = sqlx::query(&instances::select_owned_by_id(id, user.id))
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Instance"))?;
    Instance::from_row(&row)
}

/// Record the start of a session against a process the caller can see
pub async fn start(pool: &SqlitePool, user: &User, request: StartInstance) -> Result<Instance> {
    let process_id = request
        .process_id
        .ok_or_else(|| ApiError::Validation("process_id is required".to_string()))?;

    sqlx::query(&processes::select_visible_by_id(process_id, user.id))
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Process"))?;

    let now = now_ms();
    let start_time_ms = request.start_time.map(to_millis).unwrap_or(now);
    let metadata_json = serde_json::to_string(&request.metadata.unwrap_or_default())?;

    let result = sqlx::query(&instances::insert(
        process_id,
        user.id,
        start_time_ms,
        &metadata_json,
        now,
    ))
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!(
        "Instance {} of process {} started by user {}",
        id, process_id, user.id
    );
    get(pool, user, id).await
}

/// Set the end time (first time only) and/or replace the metadata
pub async fn update(
    pool: &SqlitePool,
    user: &User,
    id: i64,
    request: UpdateInstance,
) -> Result<Instance> {
    let current = get(pool, user, id).await?;

    let end = match (request.end_time, current.end_time) {
        (Some(end_time), None) => {
            let start_ms = to_millis(current.start_time);
            let end_ms = to_millis(end_time);
            if end_ms < start_ms {
                return Err(ApiError::Validation(
                    "end_time must not be before start_time".to_string(),
                ));
            }
            Some((end_ms, duration_seconds(start_ms, end_ms)))
        }
        // An end time is frozen once stored
        _ => None,
    };
    let metadata_json = match &request.metadata {
        Some(metadata) => Some(serde_json::to_string(metadata)?),
        None => None,
    };

    let result = sqlx::query(&instances::update_owned(
        id,
        user.id,
        end,
        metadata_json.as_deref(),
        now_ms(),
    ))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Instance"));
    }
    if let Some((_, duration)) = end {
        info!("Instance {} completed after {}s", id, duration);
    }
    get(pool, user, id).await
}

pub async fn delete(pool: &SqlitePool, user: &User, id: i64) -> Result<()> {
    let result = sqlx::query(&instances::delete_owned(id, user.id))
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Instance"));
    }
    info!("Instance {} deleted by user {}", id, user.id);
    Ok(())
}

/// Totals over the caller's completed instances
pub async fn summary(pool: &SqlitePool, user: &User) -> Result<InstanceStats> {
    let (total_instances, total_seconds, unique_processes): (i64, i64, i64) =
        sqlx::query_as(&instances::select_summary(user.id))
            .fetch_one(pool)
            .await?;
    Ok(InstanceStats {
        total_instances,
        total_seconds,
        unique_processes,
    })
}
