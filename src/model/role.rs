use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Roles seeded at install time. Custom roles may exist alongside them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SystemRole {
    Superadmin,
    Owner,
    Manager,
    Employee,
}

impl SystemRole {
    pub fn is_system_name(name: &str) -> bool {
        name.parse::<SystemRole>().is_ok()
    }
}

/// Permission names checked by the handlers.
pub mod perm {
    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_MANAGE: &str = "users.manage";
    pub const BUSINESSES_MANAGE: &str = "businesses.manage";
    pub const ATTENDANCE_VIEW: &str = "attendance.view";
    pub const ATTENDANCE_MANAGE: &str = "attendance.manage";
    pub const ADVANCES_VIEW: &str = "advances.view";
    pub const ADVANCES_MANAGE: &str = "advances.manage";
    pub const CLAIMS_VIEW: &str = "claims.view";
    pub const CLAIMS_MANAGE: &str = "claims.manage";
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Role {
    #[schema(example = 2)]
    pub id: u64,
    #[schema(example = "owner")]
    pub name: String,
    #[schema(example = "Business owner", nullable = true)]
    pub description: Option<String>,
    #[schema(example = "2026-01-01T09:00:00", value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Permission {
    #[schema(example = 4)]
    pub id: u64,
    #[schema(example = "attendance.manage")]
    pub name: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    #[schema(example = "2026-01-01T09:00:00", value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn system_roles_round_trip_through_names() {
        for role in SystemRole::iter() {
            assert_eq!(role.as_ref().parse::<SystemRole>().unwrap(), role);
        }
        assert_eq!(SystemRole::Superadmin.to_string(), "superadmin");
    }

    #[test]
    fn custom_names_are_not_system_roles() {
        assert!(SystemRole::is_system_name("owner"));
        assert!(!SystemRole::is_system_name("auditor"));
    }
}
