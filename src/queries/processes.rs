use sea_query::{
    Alias, Expr, Order, Query, SelectStatement, SimpleExpr, SqliteQueryBuilder, Value,
};

use crate::schema::{Processes, Users};

/// Columns shared by every process read, with the creator's name joined in
///
/// SELECT p.id, p.name, p.description, p.metadata_schema, p.is_official, p.created_by,
///        p.created_at_ms, u.name AS creator_name
/// FROM processes p LEFT JOIN users u ON p.created_by = u.id
fn select_with_creator() -> SelectStatement {
    Query::select()
        .columns([
            (Processes::Table, Processes::Id),
            (Processes::Table, Processes::Name),
            (Processes::Table, Processes::Description),
            (Processes::Table, Processes::MetadataSchema),
            (Processes::Table, Processes::IsOfficial),
            (Processes::Table, Processes::CreatedBy),
            (Processes::Table, Processes::CreatedAtMs),
        ])
        .expr_as(
            Expr::col((Users::Table, Users::Name)),
            Alias::new("creator_name"),
        )
        .from(Processes::Table)
        .left_join(
            Users::Table,
            Expr::col((Processes::Table, Processes::CreatedBy))
                .equals((Users::Table, Users::Id)),
        )
        .to_owned()
}

/// is_official = 1 OR created_by = ?
fn visible_to(user_id: i64) -> SimpleExpr {
    Expr::col((Processes::Table, Processes::IsOfficial))
        .eq(1)
        .or(Expr::col((Processes::Table, Processes::CreatedBy)).eq(user_id))
}

/// created_by = ? [OR is_official = 1 when the caller is an admin]
fn writable_by(user_id: i64, is_admin: bool) -> SimpleExpr {
    let owned = Expr::col(Processes::CreatedBy).eq(user_id);
    if is_admin {
        owned.or(Expr::col(Processes::IsOfficial).eq(1))
    } else {
        owned
    }
}

/// Official processes plus the caller's own, official first then by name
pub fn select_visible(user_id: i64) -> String {
    select_with_creator()
        .cond_where(visible_to(user_id))
        .order_by((Processes::Table, Processes::IsOfficial), Order::Desc)
        .order_by((Processes::Table, Processes::Name), Order::Asc)
        .order_by((Processes::Table, Processes::Id), Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// Single process if it is official or owned by the caller
pub fn select_visible_by_id(id: i64, user_id: i64) -> String {
    select_with_creator()
        .and_where(Expr::col((Processes::Table, Processes::Id)).eq(id))
        .cond_where(visible_to(user_id))
        .to_string(SqliteQueryBuilder)
}

/// Single process regardless of visibility (authorization is checked by the caller)
pub fn select_by_id(id: i64) -> String {
    select_with_creator()
        .and_where(Expr::col((Processes::Table, Processes::Id)).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO processes (name, description, metadata_schema, is_official, created_by, created_at_ms)
pub fn insert(
    name: &str,
    description: Option<&str>,
    metadata_schema_json: &str,
    is_official: bool,
    created_by: i64,
    created_at_ms: i64,
) -> String {
    Query::insert()
        .into_table(Processes::Table)
        .columns([
            Processes::Name,
            Processes::Description,
            Processes::MetadataSchema,
            Processes::IsOfficial,
            Processes::CreatedBy,
            Processes::CreatedAtMs,
        ])
        .values_panic([
            name.into(),
            description.map(str::to_string).into(),
            metadata_schema_json.into(),
            (is_official as i32).into(),
            created_by.into(),
            created_at_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// UPDATE processes SET <provided columns> WHERE id = ? AND <writable_by>
///
/// Returns None when no column is provided, since there is nothing to write.
pub fn update_guarded(
    id: i64,
    user_id: i64,
    is_admin: bool,
    name: Option<&str>,
    description: Option<&str>,
    metadata_schema_json: Option<&str>,
) -> Option<String> {
    let mut values: Vec<(Processes, Value)> = Vec::new();
    if let Some(name) = name {
        values.push((Processes::Name, name.into()));
    }
    if let Some(description) = description {
        values.push((Processes::Description, description.into()));
    }
    if let Some(schema) = metadata_schema_json {
        values.push((Processes::MetadataSchema, schema.into()));
    }
    if values.is_empty() {
        return None;
    }

    let mut query = Query::update();
    query.table(Processes::Table);
    for (column, value) in values {
        query.value(column, value);
    }
    Some(
        query
            .and_where(Expr::col(Processes::Id).eq(id))
            .cond_where(writable_by(user_id, is_admin))
            .to_string(SqliteQueryBuilder),
    )
}

/// DELETE FROM processes WHERE id = ? AND <writable_by>
pub fn delete_guarded(id: i64, user_id: i64, is_admin: bool) -> String {
    Query::delete()
        .from_table(Processes::Table)
        .and_where(Expr::col(Processes::Id).eq(id))
        .cond_where(writable_by(user_id, is_admin))
        .to_string(SqliteQueryBuilder)
}
