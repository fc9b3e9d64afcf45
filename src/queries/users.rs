use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::Users;

/// INSERT INTO users (name, role, api_token) VALUES (?, ?, ?)
pub fn insert(name: &str, role: &str, api_token: &str) -> String {
    Query::insert()
        .into_table(Users::Table)
        .columns([Users::Name, Users::Role, Users::ApiToken])
        .values_panic([name.into(), role.into(), api_token.into()])
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, name, role FROM users WHERE api_token = ?
pub fn select_by_token(api_token: &str) -> String {
    Query::select()
        .columns([Users::Id, Users::Name, Users::Role])
        .from(Users::Table)
        .and_where(Expr::col(Users::ApiToken).eq(api_token))
        .to_string(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_token_does_not_return_token() {
        let sql = select_by_token("pt_abc");
        assert_eq!(
            sql,
            r#"SELECT "id", "name", "role" FROM "users" WHERE "api_token" = 'pt_abc'"#
        );
    }
}
