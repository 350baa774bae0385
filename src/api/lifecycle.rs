//! Approval and payment flow shared by advances and claims.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, mysql::MySqlRow};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::{
        advance::Advance,
        claim::Claim,
        request_status::{RequestStatus, apply_payment},
        role::perm,
    },
    utils::{
        db_utils::{Filters, Paginated, Pagination, bind_query_as, bind_scalar},
        feature_cache::{self, require_feature},
    },
};

/// A money request owned by a user inside a business.
pub trait MoneyRequest: for<'r> FromRow<'r, MySqlRow> + Serialize + Send + Unpin {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Column the `from`/`to` filters apply to.
    const DATE_COLUMN: &'static str;
    const LABEL: &'static str;
    const FEATURE: &'static str;
    const VIEW: &'static str;
    const MANAGE: &'static str;

    fn id(&self) -> u64;
    fn user_id(&self) -> u64;
    fn business_id(&self) -> u64;
    fn status(&self) -> &str;
    fn remaining_amount(&self) -> f64;
}

impl MoneyRequest for Advance {
    const TABLE: &'static str = "advances";
    const COLUMNS: &'static str = "id, user_id, business_id, amount, remaining_amount, reason, \
                                   request_date, status, notes, approved_by, approved_at, paid_at, \
                                   created_at, updated_at";
    const DATE_COLUMN: &'static str = "request_date";
    const LABEL: &'static str = "Advance";
    const FEATURE: &'static str = feature_cache::ADVANCES;
    const VIEW: &'static str = perm::ADVANCES_VIEW;
    const MANAGE: &'static str = perm::ADVANCES_MANAGE;

    fn id(&self) -> u64 {
        self.id
    }
    fn user_id(&self) -> u64 {
        self.user_id
    }
    fn business_id(&self) -> u64 {
        self.business_id
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn remaining_amount(&self) -> f64 {
        self.remaining_amount
    }
}

impl MoneyRequest for Claim {
    const TABLE: &'static str = "claims";
    const COLUMNS: &'static str = "id, user_id, business_id, title, description, category, \
                                   expense_date, amount, remaining_amount, status, notes, \
                                   approved_by, approved_at, paid_at, created_at, updated_at";
    const DATE_COLUMN: &'static str = "expense_date";
    const LABEL: &'static str = "Claim";
    const FEATURE: &'static str = feature_cache::CLAIMS;
    const VIEW: &'static str = perm::CLAIMS_VIEW;
    const MANAGE: &'static str = perm::CLAIMS_MANAGE;

    fn id(&self) -> u64 {
        self.id
    }
    fn user_id(&self) -> u64 {
        self.user_id
    }
    fn business_id(&self) -> u64 {
        self.business_id
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn remaining_amount(&self) -> f64 {
        self.remaining_amount
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RequestQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Superadmins only; everyone else sees their own business
    pub business_id: Option<u64>,
    /// Ignored without the view permission
    pub user_id: Option<u64>,
    pub status: Option<RequestStatus>,
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PaymentRequest {
    /// Settles the whole remaining balance when omitted
    #[schema(example = 250.0)]
    pub amount: Option<f64>,
}

pub async fn fetch<R: MoneyRequest>(pool: &MySqlPool, id: u64) -> Result<R, ApiError> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", R::COLUMNS, R::TABLE);
    sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound(R::LABEL))
}

/// Own records are always visible; others need the view permission.
pub async fn fetch_visible<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
) -> Result<R, ApiError> {
    let record = fetch::<R>(pool, id).await?;
    auth.require_business_access(record.business_id())?;
    require_feature(pool, auth, record.business_id(), R::FEATURE).await?;
    if record.user_id() != auth.user_id {
        auth.require_permission(pool, R::VIEW).await?;
    }
    Ok(record)
}

/// Owner or manager, and only while pending.
pub async fn fetch_editable<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
) -> Result<R, ApiError> {
    let record = fetch::<R>(pool, id).await?;
    auth.require_business_access(record.business_id())?;
    require_feature(pool, auth, record.business_id(), R::FEATURE).await?;
    if record.user_id() != auth.user_id {
        auth.require_permission(pool, R::MANAGE).await?;
    }
    RequestStatus::parse(record.status())?.ensure_editable()?;
    Ok(record)
}

async fn fetch_managed<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
) -> Result<R, ApiError> {
    let record = fetch::<R>(pool, id).await?;
    auth.require_business_access(record.business_id())?;
    require_feature(pool, auth, record.business_id(), R::FEATURE).await?;
    auth.require_permission(pool, R::MANAGE).await?;
    Ok(record)
}

fn request_filters(
    date_column: &str,
    business_id: Option<u64>,
    user_id: Option<u64>,
    query: &RequestQuery,
) -> Filters {
    let mut filters = Filters::new();
    filters
        .eq("business_id", business_id)
        .eq("user_id", user_id)
        .eq("status", query.status.map(|s| s.to_string()))
        .gte(date_column, query.from)
        .lte(date_column, query.to);
    filters
}

pub async fn list<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    query: &RequestQuery,
) -> Result<Paginated<R>, ApiError> {
    let business_id = auth.scope_business(query.business_id)?;
    if let Some(business_id) = business_id {
        require_feature(pool, auth, business_id, R::FEATURE).await?;
    }
    let can_view = auth.can(pool, R::VIEW).await?;
    let user_id = auth.visible_user(can_view, query.user_id);

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = request_filters(R::DATE_COLUMN, business_id, user_id, query);
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {}{where_clause}", R::TABLE);
    debug!(sql = %count_sql, "Counting {}", R::TABLE);
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!(error = %e, sql = %count_sql, "Failed to count {}", R::TABLE);
            ApiError::Internal
        })?;

    let data_sql = format!(
        "SELECT {} FROM {}{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?",
        R::COLUMNS,
        R::TABLE
    );
    let records = bind_query_as(sqlx::query_as::<_, R>(&data_sql), filters.values())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch {}", R::TABLE);
            ApiError::Internal
        })?;

    Ok(Paginated::new(records, pagination, total))
}

/// Approval resets the balance to the full amount, rejection clears it.
pub async fn decide<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
    next: RequestStatus,
) -> Result<R, ApiError> {
    let record = fetch_managed::<R>(pool, auth, id).await?;
    let current = RequestStatus::parse(record.status())?;
    current.ensure_transition(next)?;

    let remaining = match next {
        RequestStatus::Approved => "amount",
        _ => "0",
    };
    let sql = format!(
        "UPDATE {} SET status = ?, remaining_amount = {remaining}, approved_by = ?, approved_at = NOW() \
         WHERE id = ? AND status = ?",
        R::TABLE
    );
    let result = sqlx::query(&sql)
        .bind(next.as_ref())
        .bind(auth.user_id)
        .bind(id)
        .bind(current.as_ref())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(format!(
            "{} was changed concurrently",
            R::LABEL
        )));
    }

    info!(table = R::TABLE, id, status = %next, by = auth.user_id, "Request decided");
    fetch::<R>(pool, id).await
}

/// Reduces the outstanding balance; the request becomes paid when it reaches zero.
pub async fn pay<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
    amount: Option<f64>,
) -> Result<R, ApiError> {
    let record = fetch_managed::<R>(pool, auth, id).await?;
    let status = RequestStatus::parse(record.status())?;
    let outcome = apply_payment(status, record.remaining_amount(), amount)?;

    let sql = format!(
        "UPDATE {} SET remaining_amount = ?, status = ?, \
         paid_at = CASE WHEN ? THEN NOW() ELSE paid_at END \
         WHERE id = ? AND status = ? AND remaining_amount = ?",
        R::TABLE
    );
    let result = sqlx::query(&sql)
        .bind(outcome.remaining)
        .bind(outcome.status.as_ref())
        .bind(outcome.status == RequestStatus::Paid)
        .bind(id)
        .bind(RequestStatus::Approved.as_ref())
        .bind(record.remaining_amount())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(format!(
            "{} balance changed, reload and retry",
            R::LABEL
        )));
    }

    info!(
        table = R::TABLE,
        id,
        paid = outcome.paid,
        remaining = outcome.remaining,
        by = auth.user_id,
        "Payment recorded"
    );
    fetch::<R>(pool, id).await
}

pub async fn delete<R: MoneyRequest>(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
) -> Result<(), ApiError> {
    let record = fetch_editable::<R>(pool, auth, id).await?;

    let sql = format!("DELETE FROM {} WHERE id = ? AND status = ?", R::TABLE);
    let result = sqlx::query(&sql)
        .bind(record.id())
        .bind(RequestStatus::Pending.as_ref())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(format!(
            "{} is no longer pending",
            R::LABEL
        )));
    }

    info!(table = R::TABLE, id, by = auth.user_id, "Request deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    fn employee() -> AuthUser {
        AuthUser {
            user_id: 9,
            email: "employee@acme.test".into(),
            roles: vec!["employee".into()],
            business_id: Some(3),
        }
    }

    #[test]
    fn employees_only_list_their_own_requests() {
        let auth = employee();
        let query = RequestQuery {
            user_id: Some(42),
            status: Some(RequestStatus::Pending),
            ..Default::default()
        };

        let user_id = auth.visible_user(false, query.user_id);
        let filters = request_filters(Advance::DATE_COLUMN, Some(3), user_id, &query);
        assert_eq!(
            filters.where_clause(),
            " WHERE business_id = ? AND user_id = ? AND status = ?"
        );
        assert_eq!(
            filters.values(),
            vec![
                SqlValue::U64(3),
                SqlValue::U64(9),
                SqlValue::String("pending".into()),
            ]
        );
    }

    #[test]
    fn viewers_pick_any_user_or_none() {
        let auth = employee();
        let query = RequestQuery {
            user_id: Some(42),
            from: NaiveDate::from_ymd_opt(2026, 1, 1),
            ..Default::default()
        };

        let user_id = auth.visible_user(true, query.user_id);
        let filters = request_filters(Claim::DATE_COLUMN, Some(3), user_id, &query);
        assert_eq!(
            filters.where_clause(),
            " WHERE business_id = ? AND user_id = ? AND expense_date >= ?"
        );
        assert_eq!(filters.values()[1], SqlValue::U64(42));

        let everyone = request_filters(
            Claim::DATE_COLUMN,
            Some(3),
            auth.visible_user(true, None),
            &RequestQuery::default(),
        );
        assert_eq!(everyone.where_clause(), " WHERE business_id = ?");
    }
}
