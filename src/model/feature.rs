use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Feature {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "attendance")]
    pub feature_key: String,
    #[schema(example = "Attendance tracking")]
    pub name: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

/// A feature together with its toggle for one business.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BusinessFeature {
    pub feature_id: u64,
    #[schema(example = "claims")]
    pub feature_key: String,
    pub name: String,
    pub enabled: bool,
}
