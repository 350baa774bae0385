use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Expense claim. `remaining_amount` is what the business still has to reimburse.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Claim {
    #[schema(example = 4)]
    pub id: u64,
    pub user_id: u64,
    pub business_id: u64,
    #[schema(example = "Client lunch")]
    pub title: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    #[schema(nullable = true, example = "meals")]
    pub category: Option<String>,
    #[schema(example = "2026-02-03", value_type = String, format = "date")]
    pub expense_date: NaiveDate,
    #[schema(example = 82.5)]
    pub amount: f64,
    #[schema(example = 82.5)]
    pub remaining_amount: f64,
    #[schema(example = "pending")]
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
