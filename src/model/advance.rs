use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Salary advance. `remaining_amount` is what the employee still owes back.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Advance {
    #[schema(example = 10)]
    pub id: u64,
    pub user_id: u64,
    pub business_id: u64,
    #[schema(example = 500.0)]
    pub amount: f64,
    #[schema(example = 250.0)]
    pub remaining_amount: f64,
    #[schema(nullable = true, example = "Medical bills")]
    pub reason: Option<String>,
    #[schema(example = "2026-02-01", value_type = String, format = "date")]
    pub request_date: NaiveDate,
    #[schema(example = "approved")]
    pub status: String,
    #[schema(nullable = true)]
    pub notes: Option<String>,
    #[schema(nullable = true)]
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub paid_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}
