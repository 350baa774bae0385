use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{optional_json, user::fetch_user},
    auth::auth::AuthUser,
    error::ApiError,
    model::{
        attendance::{
            Attendance, AttendanceStatus, DailySummary, DailyTotals, WorkUnits, summarize,
        },
        role::perm,
    },
    utils::{
        db_utils::{AttendancePage, Filters, Paginated, Pagination, bind_query_as, bind_scalar},
        feature_cache::{self, require_feature},
    },
};

const ATTENDANCE_COLUMNS: &str = "id, user_id, business_id, work_date, start_time, end_time, \
                                  regular_units, overtime_units, status, notes, approved_by, \
                                  created_at, updated_at";

#[derive(Default, Deserialize, Validate, ToSchema)]
pub struct ClockIn {
    #[schema(example = "Working from the warehouse")]
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateAttendance {
    #[schema(example = 12)]
    pub user_id: u64,
    #[schema(example = "2026-01-05T09:00:00", value_type = String, format = "date-time")]
    pub start_time: NaiveDateTime,
    #[schema(example = "2026-01-05T17:30:00", value_type = Option<String>, format = "date-time")]
    pub end_time: Option<NaiveDateTime>,
    pub status: Option<AttendanceStatus>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateAttendance {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub start_time: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub end_time: Option<NaiveDateTime>,
    pub status: Option<AttendanceStatus>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Superadmins only; everyone else sees their own business
    pub business_id: Option<u64>,
    /// Ignored without `attendance.view`
    pub user_id: Option<u64>,
    pub status: Option<AttendanceStatus>,
    /// Inclusive lower bound on work_date
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on work_date
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub to: Option<NaiveDate>,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

async fn fetch_attendance(pool: &MySqlPool, id: u64) -> Result<Attendance, ApiError> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE id = ?");
    sqlx::query_as::<_, Attendance>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Attendance"))
}

/// Loads a record the caller may manage: same business, feature on, `attendance.manage`.
async fn fetch_managed(
    pool: &MySqlPool,
    auth: &AuthUser,
    id: u64,
) -> Result<Attendance, ApiError> {
    let record = fetch_attendance(pool, id).await?;
    auth.require_business_access(record.business_id)?;
    require_feature(pool, auth, record.business_id, feature_cache::ATTENDANCE).await?;
    auth.require_permission(pool, perm::ATTENDANCE_MANAGE).await?;
    Ok(record)
}

/// WHERE clause shared by the list and the summary. Callers without
/// `attendance.view` only ever see their own rows.
async fn scoped_filters(
    pool: &MySqlPool,
    auth: &AuthUser,
    query: &AttendanceQuery,
) -> Result<Filters, ApiError> {
    let business_id = auth.scope_business(query.business_id)?;
    if let Some(business_id) = business_id {
        require_feature(pool, auth, business_id, feature_cache::ATTENDANCE).await?;
    }

    let can_view = auth.can(pool, perm::ATTENDANCE_VIEW).await?;
    let user_id = auth.visible_user(can_view, query.user_id);
    Ok(attendance_filters(business_id, user_id, query))
}

fn attendance_filters(
    business_id: Option<u64>,
    user_id: Option<u64>,
    query: &AttendanceQuery,
) -> Filters {
    let mut filters = Filters::new();
    filters
        .eq("business_id", business_id)
        .eq("user_id", user_id)
        .eq("status", query.status.map(|s| s.to_string()))
        .gte("work_date", query.from)
        .lte("work_date", query.to);
    filters
}

#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = ClockIn,
    responses(
        (status = 201, description = "Open attendance record", body = Attendance),
        (status = 403, description = "No business profile or attendance disabled")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let business_id = auth.require_business()?;
    let payload: ClockIn = optional_json(&body)?;
    payload.validate()?;
    let notes = payload.notes;
    require_feature(pool.get_ref(), &auth, business_id, feature_cache::ATTENDANCE).await?;

    let started = now();
    let result = sqlx::query(
        r#"
        INSERT INTO attendances (user_id, business_id, work_date, start_time, status, notes)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(business_id)
    .bind(started.date())
    .bind(started)
    .bind(AttendanceStatus::Pending.as_ref())
    .bind(&notes)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = auth.user_id, "Clock-in failed");
        ApiError::from(e)
    })?;

    info!(user_id = auth.user_id, business_id, "Clocked in");
    let record = fetch_attendance(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(record))
}

#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    responses(
        (status = 200, description = "Closed attendance record", body = Attendance),
        (status = 400, description = "No open attendance record", body = Object, example = json!({
            "message": "No open attendance record"
        })),
        (status = 403, description = "No business profile or attendance disabled")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let business_id = auth.require_business()?;
    require_feature(pool.get_ref(), &auth, business_id, feature_cache::ATTENDANCE).await?;

    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
         WHERE user_id = ? AND end_time IS NULL \
         ORDER BY start_time DESC, id DESC LIMIT 1"
    );
    let open = sqlx::query_as::<_, Attendance>(&sql)
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::bad_request("No open attendance record"))?;

    let ended = now();
    let units = WorkUnits::between(open.start_time, ended);

    let result = sqlx::query(
        r#"
        UPDATE attendances
        SET end_time = ?, regular_units = ?, overtime_units = ?
        WHERE id = ? AND end_time IS NULL
        "#,
    )
    .bind(ended)
    .bind(units.regular)
    .bind(units.overtime)
    .bind(open.id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = auth.user_id, "Clock-out failed");
        ApiError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Attendance record was already closed"));
    }

    info!(
        user_id = auth.user_id,
        attendance_id = open.id,
        regular = units.regular,
        overtime = units.overtime,
        "Clocked out"
    );
    let record = fetch_attendance(pool.get_ref(), open.id).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendancePage)
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, ApiError> {
    let filters = scoped_filters(pool.get_ref(), &auth, &query).await?;
    let pagination = Pagination::new(query.page, query.per_page);
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM attendances{where_clause}");
    debug!(sql = %count_sql, "Counting attendance");
    let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %count_sql, "Failed to count attendance");
            ApiError::Internal
        })?;

    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances{where_clause} \
         ORDER BY work_date DESC, start_time DESC LIMIT ? OFFSET ?"
    );
    let records = bind_query_as(sqlx::query_as::<_, Attendance>(&data_sql), filters.values())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch attendance");
            ApiError::Internal
        })?;

    Ok(HttpResponse::Ok().json(Paginated::new(records, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Totals per user per work date", body = [DailySummary])
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, ApiError> {
    let filters = scoped_filters(pool.get_ref(), &auth, &query).await?;

    let sql = format!(
        "SELECT user_id, work_date, COUNT(*) AS entries, \
         SUM(regular_units) AS regular_units, SUM(overtime_units) AS overtime_units \
         FROM attendances{} GROUP BY user_id, work_date ORDER BY user_id, work_date",
        filters.where_clause()
    );
    debug!(sql = %sql, "Summarizing attendance");
    let rows = bind_query_as(sqlx::query_as::<_, DailyTotals>(&sql), filters.values())
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, sql = %sql, "Failed to summarize attendance");
            ApiError::Internal
        })?;

    Ok(HttpResponse::Ok().json(summarize(rows)))
}

#[utoipa::path(
    get,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance ID")),
    responses(
        (status = 200, body = Attendance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let record = fetch_attendance(pool.get_ref(), path.into_inner()).await?;

    auth.require_business_access(record.business_id)?;
    require_feature(pool.get_ref(), &auth, record.business_id, feature_cache::ATTENDANCE).await?;
    if record.user_id != auth.user_id {
        auth.require_permission(pool.get_ref(), perm::ATTENDANCE_VIEW).await?;
    }

    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = CreateAttendance,
    responses(
        (status = 201, description = "Attendance recorded", body = Attendance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn create_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAttendance>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let user = fetch_user(pool.get_ref(), payload.user_id).await?;
    let business_id = user
        .business_id
        .ok_or_else(|| ApiError::invalid("user_id", "user does not belong to a business"))?;

    auth.require_business_access(business_id)?;
    require_feature(pool.get_ref(), &auth, business_id, feature_cache::ATTENDANCE).await?;
    auth.require_permission(pool.get_ref(), perm::ATTENDANCE_MANAGE).await?;

    let status = payload.status.unwrap_or(AttendanceStatus::Pending);
    let approved_by = (status != AttendanceStatus::Pending).then_some(auth.user_id);
    let units = WorkUnits::for_interval(payload.start_time, payload.end_time);

    let result = sqlx::query(
        r#"
        INSERT INTO attendances
        (user_id, business_id, work_date, start_time, end_time,
         regular_units, overtime_units, status, notes, approved_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(business_id)
    .bind(payload.start_time.date())
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(units.regular)
    .bind(units.overtime)
    .bind(status.as_ref())
    .bind(&payload.notes)
    .bind(approved_by)
    .execute(pool.get_ref())
    .await?;

    info!(user_id = user.id, by = auth.user_id, "Attendance recorded manually");
    let record = fetch_attendance(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(record))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance ID")),
    request_body = UpdateAttendance,
    responses(
        (status = 200, description = "Attendance updated, hours recomputed", body = Attendance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found"),
        (status = 409, description = "Illegal status change")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAttendance>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let record = fetch_managed(pool.get_ref(), &auth, path.into_inner()).await?;
    let current = AttendanceStatus::parse(&record.status)?;

    let status = payload.status.unwrap_or(current);
    current.ensure_transition(status)?;
    let approved_by = if status != current {
        Some(auth.user_id)
    } else {
        record.approved_by
    };

    let start_time = payload.start_time.unwrap_or(record.start_time);
    let end_time = payload.end_time.or(record.end_time);
    let units = WorkUnits::for_interval(start_time, end_time);
    let notes = payload.notes.clone().or(record.notes);

    let result = sqlx::query(
        r#"
        UPDATE attendances
        SET work_date = ?, start_time = ?, end_time = ?,
            regular_units = ?, overtime_units = ?,
            status = ?, notes = ?, approved_by = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(start_time.date())
    .bind(start_time)
    .bind(end_time)
    .bind(units.regular)
    .bind(units.overtime)
    .bind(status.as_ref())
    .bind(&notes)
    .bind(approved_by)
    .bind(record.id)
    .bind(current.as_ref())
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        // MySQL counts unchanged rows as unaffected; only a status race is an error
        let latest = fetch_attendance(pool.get_ref(), record.id).await?;
        if latest.status != current.as_ref() {
            return Err(ApiError::conflict("Attendance record was changed concurrently"));
        }
    }

    info!(attendance_id = record.id, by = auth.user_id, "Attendance updated");
    let updated = fetch_attendance(pool.get_ref(), record.id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn decide(
    auth: AuthUser,
    pool: &MySqlPool,
    id: u64,
    next: AttendanceStatus,
) -> Result<HttpResponse, ApiError> {
    let record = fetch_managed(pool, &auth, id).await?;
    AttendanceStatus::parse(&record.status)?.ensure_transition(next)?;

    let result = sqlx::query(
        "UPDATE attendances SET status = ?, approved_by = ? WHERE id = ? AND status = ?",
    )
    .bind(next.as_ref())
    .bind(auth.user_id)
    .bind(id)
    .bind(AttendanceStatus::Pending.as_ref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Attendance record is no longer pending"));
    }

    info!(attendance_id = id, status = %next, by = auth.user_id, "Attendance decided");
    let record = fetch_attendance(pool, id).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{attendance_id}/approve",
    params(("attendance_id" = u64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "Attendance approved", body = Attendance),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn approve_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    decide(auth, pool.get_ref(), path.into_inner(), AttendanceStatus::Approved).await
}

#[utoipa::path(
    put,
    path = "/api/attendance/{attendance_id}/reject",
    params(("attendance_id" = u64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "Attendance rejected", body = Attendance),
        (status = 409, description = "Not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reject_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    decide(auth, pool.get_ref(), path.into_inner(), AttendanceStatus::Rejected).await
}

#[utoipa::path(
    delete,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "Attendance deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let record = fetch_managed(pool.get_ref(), &auth, path.into_inner()).await?;

    sqlx::query("DELETE FROM attendances WHERE id = ?")
        .bind(record.id)
        .execute(pool.get_ref())
        .await?;

    info!(attendance_id = record.id, by = auth.user_id, "Attendance deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Attendance deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    #[test]
    fn attendance_without_view_permission_is_the_callers_own() {
        let auth = AuthUser {
            user_id: 9,
            email: "employee@acme.test".into(),
            roles: vec!["employee".into()],
            business_id: Some(3),
        };
        let query = AttendanceQuery {
            user_id: Some(42),
            to: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..Default::default()
        };

        let own = attendance_filters(Some(3), auth.visible_user(false, query.user_id), &query);
        assert_eq!(
            own.where_clause(),
            " WHERE business_id = ? AND user_id = ? AND work_date <= ?"
        );
        assert_eq!(own.values()[1], SqlValue::U64(9));

        let picked = attendance_filters(Some(3), auth.visible_user(true, query.user_id), &query);
        assert_eq!(picked.values()[1], SqlValue::U64(42));
    }
}
