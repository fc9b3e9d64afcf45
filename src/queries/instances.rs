use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use crate::schema::{Instances, Processes};

/// SELECT i.*, p.name AS process_name, p.metadata_schema
/// FROM instances i JOIN processes p ON i.process_id = p.id
fn select_with_process() -> SelectStatement {
    Query::select()
        .columns([
            (Instances::Table, Instances::Id),
            (Instances::Table, Instances::ProcessId),
            (Instances::Table, Instances::UserId),
            (Instances::Table, Instances::StartTimeMs),
            (Instances::Table, Instances::EndTimeMs),
            (Instances::Table, Instances::DurationSeconds),
            (Instances::Table, Instances::Metadata),
            (Instances::Table, Instances::CreatedAtMs),
            (Instances::Table, Instances::UpdatedAtMs),
        ])
        .expr_as(
            Expr::col((Processes::Table, Processes::Name)),
            Alias::new("process_name"),
        )
        .column((Processes::Table, Processes::MetadataSchema))
        .from(Instances::Table)
        .inner_join(
            Processes::Table,
            Expr::col((Instances::Table, Instances::ProcessId))
                .equals((Processes::Table, Processes::Id)),
        )
        .to_owned()
}

/// The caller's instances, optionally for one process, newest start first
pub fn select_owned(user_id: i64, process_id: Option<i64>, limit: u64, offset: u64) -> String {
    let mut query = select_with_process();
    query.and_where(Expr::col((Instances::Table, Instances::UserId)).eq(user_id));
    if let Some(process_id) = process_id {
        query.and_where(Expr::col((Instances::Table, Instances::ProcessId)).eq(process_id));
    }
    query
        .order_by((Instances::Table, Instances::StartTimeMs), Order::Desc)
        .order_by((Instances::Table, Instances::Id), Order::Desc)
        .limit(limit)
        .offset(offset)
        .to_string(SqliteQueryBuilder)
}

/// Single instance owned by the caller
pub fn select_owned_by_id(id: i64, user_id: i64) -> String {
    select_with_process()
        .and_where(Expr::col((Instances::Table, Instances::Id)).eq(id))
        .and_where(Expr::col((Instances::Table, Instances::UserId)).eq(user_id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO instances (process_id, user_id, start_time_ms, metadata, created_at_ms, updated_at_ms)
pub fn insert(
    process_id: i64,
    user_id: i64,
    start_time_ms: i64,
    metadata_json: &str,
    now_ms: i64,
) -> String {
    Query::insert()
        .into_table(Instances::Table)
        .columns([
            Instances::ProcessId,
            Instances::UserId,
            Instances::StartTimeMs,
            Instances::Metadata,
            Instances::CreatedAtMs,
            Instances::UpdatedAtMs,
        ])
        .values_panic([
            process_id.into(),
            user_id.into(),
            start_time_ms.into(),
            metadata_json.into(),
            now_ms.into(),
            now_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// UPDATE instances
/// SET end_time_ms = COALESCE(end_time_ms, ?), duration_seconds = COALESCE(duration_seconds, ?),
///     metadata = ?, updated_at_ms = ?
/// WHERE id = ? AND user_id = ?
///
/// The COALESCE keeps a stored end time and duration even if another stop raced this one.
pub fn update_owned(
    id: i64,
    user_id: i64,
    end: Option<(i64, i64)>,
    metadata_json: Option<&str>,
    now_ms: i64,
) -> String {
    let mut query = Query::update();
    query.table(Instances::Table);
    if let Some((end_time_ms, duration_seconds)) = end {
        query.value(
            Instances::EndTimeMs,
            Func::coalesce([
                Expr::col(Instances::EndTimeMs).into(),
                Expr::val(end_time_ms).into(),
            ]),
        );
        query.value(
            Instances::DurationSeconds,
            Func::coalesce([
                Expr::col(Instances::DurationSeconds).into(),
                Expr::val(duration_seconds).into(),
            ]),
        );
    }
    if let Some(metadata_json) = metadata_json {
        query.value(Instances::Metadata, metadata_json);
    }
    query
        .value(Instances::UpdatedAtMs, now_ms)
        .and_where(Expr::col(Instances::Id).eq(id))
        .and_where(Expr::col(Instances::UserId).eq(user_id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM instances WHERE id = ? AND user_id = ?
pub fn delete_owned(id: i64, user_id: i64) -> String {
    Query::delete()
        .from_table(Instances::Table)
        .and_where(Expr::col(Instances::Id).eq(id))
        .and_where(Expr::col(Instances::UserId).eq(user_id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id), COALESCE(SUM(duration_seconds), 0), COUNT(DISTINCT process_id)
/// FROM instances WHERE user_id = ? AND end_time_ms IS NOT NULL
pub fn select_summary(user_id: i64) -> String {
    Query::select()
        .expr(Func::count(Expr::col(Instances::Id)))
        .expr(Func::coalesce([
            Func::sum(Expr::col(Instances::DurationSeconds)).into(),
            Expr::val(0).into(),
        ]))
        .expr(Expr::cust(r#"COUNT(DISTINCT "process_id")"#))
        .from(Instances::Table)
        .and_where(Expr::col(Instances::UserId).eq(user_id))
        .and_where(Expr::col(Instances::EndTimeMs).is_not_null())
        .to_string(SqliteQueryBuilder)
}
