use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::error::ApiError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

pub fn bind_query<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: Vec<SqlValue>,
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn bind_query_as<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

pub fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryScalar<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// ===============================
/// Pagination
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }
}

/// Envelope every list endpoint returns.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[aliases(
    UserPage = Paginated<crate::api::user::UserResponse>,
    BusinessPage = Paginated<crate::model::business::Business>,
    AttendancePage = Paginated<crate::model::attendance::Attendance>,
    AdvancePage = Paginated<crate::model::advance::Advance>,
    ClaimPage = Paginated<crate::model::claim::Claim>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            data,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
        }
    }
}

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?` when a value is present
    pub fn eq(&mut self, column: &str, value: Option<impl Into<SqlValue>>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{column} = ?"));
            self.values.push(v.into());
        }
        self
    }

    pub fn gte(&mut self, column: &str, value: Option<impl Into<SqlValue>>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{column} >= ?"));
            self.values.push(v.into());
        }
        self
    }

    pub fn lte(&mut self, column: &str, value: Option<impl Into<SqlValue>>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{column} <= ?"));
            self.values.push(v.into());
        }
        self
    }

    /// `(a LIKE ? OR b LIKE ?)` over every column, ignoring blank terms.
    /// The term matches literally: `%` and `_` are not wildcards.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let like = format!("%{}%", escape_like(term));
        let clause = columns
            .iter()
            .map(|c| format!("{c} LIKE ? ESCAPE '!'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({clause})"));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    /// Raw condition with its own bindings.
    pub fn raw(&mut self, condition: &str, values: Vec<SqlValue>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

/// Escapes LIKE metacharacters with `!`, the escape character `search` declares.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

/// `?, ?, ?` for an `IN (...)` list of `count` items
pub fn in_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` become columns; anything else is a 400.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::bad_request(format!("Field '{unknown}' cannot be updated")));
    }

    // Build SET clause
    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 1);

    // Convert JSON values → SqlValue
    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    values.push(SqlValue::U64(u));
                } else if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(ApiError::bad_request("Unsupported JSON value type")),
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let query = bind_query(sqlx::query(&update.sql), update.values);
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pagination_clamps_inputs() {
        let p = Pagination::new(None, None);
        assert_eq!((p.page, p.per_page, p.offset()), (1, 20, 0));

        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!((p.page, p.per_page), (1, 100));

        let p = Pagination::new(Some(3), Some(0));
        assert_eq!((p.page, p.per_page, p.offset()), (3, 1, 2));

        let p = Pagination::new(Some(4), Some(25));
        assert_eq!(p.offset(), 75);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn empty_filters_produce_no_where_clause() {
        let f = Filters::new();
        assert_eq!(f.where_clause(), "");
        assert!(f.values().is_empty());
    }

    #[test]
    fn filters_skip_absent_values_and_keep_binding_order() {
        let mut f = Filters::new();
        f.eq("business_id", Some(3u64))
            .eq("user_id", None::<u64>)
            .eq("status", Some("pending"))
            .gte("work_date", NaiveDate::from_ymd_opt(2026, 1, 1))
            .lte("work_date", None::<NaiveDate>);

        assert_eq!(
            f.where_clause(),
            " WHERE business_id = ? AND status = ? AND work_date >= ?"
        );
        assert_eq!(
            f.values(),
            vec![
                SqlValue::U64(3),
                SqlValue::String("pending".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            ]
        );
    }

    #[test]
    fn search_expands_to_every_column() {
        let mut f = Filters::new();
        f.search(&["name", "email"], Some(" ann "));
        assert_eq!(
            f.where_clause(),
            " WHERE (name LIKE ? ESCAPE '!' OR email LIKE ? ESCAPE '!')"
        );
        assert_eq!(
            f.values(),
            vec![SqlValue::String("%ann%".into()), SqlValue::String("%ann%".into())]
        );

        let mut blank = Filters::new();
        blank.search(&["name"], Some("   "));
        assert_eq!(blank.where_clause(), "");
    }

    #[test]
    fn search_terms_match_wildcards_literally() {
        let mut f = Filters::new();
        f.search(&["email"], Some("_"));
        assert_eq!(f.values(), vec![SqlValue::String("%!_%".into())]);

        let mut f = Filters::new();
        f.search(&["name"], Some("50% off!"));
        assert_eq!(f.values(), vec![SqlValue::String("%50!% off!!%".into())]);
    }

    #[test]
    fn in_placeholders_match_count() {
        assert_eq!(in_placeholders(1), "?");
        assert_eq!(in_placeholders(3), "?, ?, ?");
    }

    #[test]
    fn update_sql_binds_id_last() {
        let payload = json!({ "name": "Acme", "is_active": false });
        let update =
            build_update_sql("businesses", &payload, &["name", "is_active"], "id", 9).unwrap();

        assert!(update.sql.starts_with("UPDATE businesses SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("name = ?"));
        assert!(update.sql.contains("is_active = ?"));
        assert_eq!(update.values.len(), 3);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn update_sql_rejects_unknown_columns() {
        let payload = json!({ "name": "Acme", "owner_id": 1 });
        let err = build_update_sql("businesses", &payload, &["name"], "id", 1).unwrap_err();
        assert!(err.to_string().contains("owner_id"));
    }

    #[test]
    fn update_sql_requires_fields() {
        assert!(build_update_sql("users", &json!({}), &["name"], "id", 1).is_err());
        assert!(build_update_sql("users", &json!([1]), &["name"], "id", 1).is_err());
    }

    #[test]
    fn update_sql_recognises_dates() {
        let payload = json!({ "work_date": "2026-03-02" });
        let update = build_update_sql("attendances", &payload, &["work_date"], "id", 1).unwrap();
        assert_eq!(
            update.values[0],
            SqlValue::Date(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
        );
    }
}
