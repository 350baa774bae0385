use crate::api::advance::{CreateAdvance, UpdateAdvance};
use crate::api::attendance::{ClockIn, CreateAttendance, UpdateAttendance};
use crate::api::business::{BusinessQuery, CreateBusiness, UpdateBusiness};
use crate::api::claim::{CreateClaim, UpdateClaim};
use crate::api::feature::{CreateFeature, ToggleFeature, UpdateFeature};
use crate::api::lifecycle::PaymentRequest;
use crate::api::permission::{CreatePermission, UpdatePermission};
use crate::api::role::{CreateRole, RoleDetail, SyncPermissions, UpdateRole};
use crate::api::user::{CreateUser, SyncRoles, UpdateUser, UserQuery, UserResponse};
use crate::auth::auth::AuthUser;
use crate::model::advance::Advance;
use crate::model::attendance::{Attendance, AttendanceStatus, DailySummary};
use crate::model::business::Business;
use crate::model::claim::Claim;
use crate::model::feature::{BusinessFeature, Feature};
use crate::model::request_status::RequestStatus;
use crate::model::role::{Permission, Role};
use crate::models::{LoginReqDto, LoginResponse};
use crate::utils::db_utils::{AdvancePage, AttendancePage, BusinessPage, ClaimPage, UserPage};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Business Admin Portal API",
        version = "1.0.0",
        description = r#"
## Multi-tenant business administration

Each business manages its own staff, working hours and money requests.

### Key Features
- **Businesses & Users**: tenants, their members and role assignments
- **Access control**: roles, permissions and per-business feature toggles
- **Attendance**: clock-in/clock-out with regular and overtime hours
- **Advances & Claims**: request, approve or reject, then pay out

### Security
Every `/api/*` endpoint needs a **JWT Bearer** access token from `/auth/login`.
Superadmins see every business; everyone else is scoped to their own.

### Response Format
- JSON bodies, `{ "message": ... }` on errors
- `422` responses carry `errors: { field: [messages] }`
- List endpoints return `{ data, page, per_page, total }`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::create_user,
        crate::api::user::update_user,
        crate::api::user::delete_user,
        crate::api::user::sync_user_roles,

        crate::api::business::list_businesses,
        crate::api::business::get_business,
        crate::api::business::create_business,
        crate::api::business::update_business,
        crate::api::business::delete_business,

        crate::api::role::list_roles,
        crate::api::role::get_role,
        crate::api::role::create_role,
        crate::api::role::update_role,
        crate::api::role::delete_role,
        crate::api::role::sync_role_permissions,

        crate::api::permission::list_permissions,
        crate::api::permission::get_permission,
        crate::api::permission::create_permission,
        crate::api::permission::update_permission,
        crate::api::permission::delete_permission,

        crate::api::feature::list_features,
        crate::api::feature::create_feature,
        crate::api::feature::update_feature,
        crate::api::feature::delete_feature,
        crate::api::feature::list_business_features,
        crate::api::feature::toggle_business_feature,

        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_summary,
        crate::api::attendance::get_attendance,
        crate::api::attendance::create_attendance,
        crate::api::attendance::update_attendance,
        crate::api::attendance::approve_attendance,
        crate::api::attendance::reject_attendance,
        crate::api::attendance::delete_attendance,

        crate::api::advance::list_advances,
        crate::api::advance::get_advance,
        crate::api::advance::create_advance,
        crate::api::advance::update_advance,
        crate::api::advance::delete_advance,
        crate::api::advance::approve_advance,
        crate::api::advance::reject_advance,
        crate::api::advance::pay_advance,

        crate::api::claim::list_claims,
        crate::api::claim::get_claim,
        crate::api::claim::create_claim,
        crate::api::claim::update_claim,
        crate::api::claim::delete_claim,
        crate::api::claim::approve_claim,
        crate::api::claim::reject_claim,
        crate::api::claim::pay_claim
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            AuthUser,
            UserResponse,
            UserQuery,
            CreateUser,
            UpdateUser,
            SyncRoles,
            Business,
            BusinessQuery,
            CreateBusiness,
            UpdateBusiness,
            Role,
            RoleDetail,
            CreateRole,
            UpdateRole,
            SyncPermissions,
            Permission,
            CreatePermission,
            UpdatePermission,
            Feature,
            BusinessFeature,
            CreateFeature,
            UpdateFeature,
            ToggleFeature,
            Attendance,
            AttendanceStatus,
            DailySummary,
            ClockIn,
            CreateAttendance,
            UpdateAttendance,
            Advance,
            CreateAdvance,
            UpdateAdvance,
            Claim,
            CreateClaim,
            UpdateClaim,
            RequestStatus,
            PaymentRequest,
            UserPage,
            BusinessPage,
            AttendancePage,
            AdvancePage,
            ClaimPage
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and the current principal"),
        (name = "Users", description = "Business members and their roles"),
        (name = "Businesses", description = "Tenant management"),
        (name = "Roles", description = "Role management (superadmin)"),
        (name = "Permissions", description = "Permission management (superadmin)"),
        (name = "Features", description = "Feature catalogue and per-business toggles"),
        (name = "Attendance", description = "Clock-in/clock-out and hour tracking"),
        (name = "Advances", description = "Salary advance requests"),
        (name = "Claims", description = "Expense claims"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_module() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/auth/login",
            "/api/me",
            "/api/users/{user_id}/roles",
            "/api/businesses/{business_id}/features/{feature_id}",
            "/api/roles/{role_id}/permissions",
            "/api/attendance/clock-in",
            "/api/attendance/summary",
            "/api/advances/{advance_id}/pay",
            "/api/claims/{claim_id}/approve",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("UserPage"));
    }
}
