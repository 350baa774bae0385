use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::SystemRole;
use crate::models::{Claims, TokenType};
use crate::utils::permission_cache;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use super::jwt::verify_token;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub roles: Vec<String>,

    /// Present only if this user belongs to a business
    pub business_id: Option<u64>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            roles: claims.roles,
            business_id: claims.business_id,
        }
    }

    /// Decodes a bearer access token. Refresh tokens are refused.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, ApiError> {
        let claims = verify_token(token, secret)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }
        Ok(Self::from_claims(claims))
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ApiError::Unauthorized("Missing token".into()))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                tracing::error!("Config missing from app data");
                return ready(Err(ApiError::Internal));
            }
        };

        ready(AuthUser::from_token(token, &config.jwt_secret))
    }
}

impl AuthUser {
    pub fn has_role(&self, role: SystemRole) -> bool {
        self.roles.iter().any(|r| r == role.as_ref())
    }

    pub fn is_superadmin(&self) -> bool {
        self.has_role(SystemRole::Superadmin)
    }

    pub fn require_superadmin(&self) -> Result<(), ApiError> {
        if self.is_superadmin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Superadmin only"))
        }
    }

    /// The caller's own business, required for self-service actions.
    pub fn require_business(&self) -> Result<u64, ApiError> {
        self.business_id
            .ok_or_else(|| ApiError::forbidden("No business profile"))
    }

    pub fn require_business_access(&self, business_id: u64) -> Result<(), ApiError> {
        if self.is_superadmin() || self.business_id == Some(business_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Not a member of this business"))
        }
    }

    /// Resolves which business a list query may cover. Superadmins may ask
    /// for any (or none, meaning all); everyone else is pinned to their own.
    pub fn scope_business(&self, requested: Option<u64>) -> Result<Option<u64>, ApiError> {
        if self.is_superadmin() {
            return Ok(requested);
        }
        let own = self.require_business()?;
        match requested {
            Some(id) if id != own => Err(ApiError::forbidden("Not a member of this business")),
            _ => Ok(Some(own)),
        }
    }

    /// User whose rows a listing covers. Without the view permission the
    /// caller only ever sees their own rows, whatever was requested.
    pub fn visible_user(&self, can_view: bool, requested: Option<u64>) -> Option<u64> {
        if can_view {
            requested
        } else {
            Some(self.user_id)
        }
    }

    pub async fn can(&self, pool: &MySqlPool, permission: &str) -> Result<bool, ApiError> {
        if self.is_superadmin() {
            return Ok(true);
        }
        for role in &self.roles {
            let granted = permission_cache::permissions_for_role(pool, role).await?;
            if granted.contains(permission) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn require_permission(
        &self,
        pool: &MySqlPool,
        permission: &str,
    ) -> Result<(), ApiError> {
        if self.can(pool, permission).await? {
            Ok(())
        } else {
            tracing::info!(user_id = self.user_id, permission, "Permission denied");
            Err(ApiError::forbidden(format!("Missing permission: {permission}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};

    fn user(roles: &[&str], business_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "someone@acme.test".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            business_id,
        }
    }

    #[test]
    fn superadmin_bypasses_business_checks() {
        let root = user(&["superadmin"], None);
        assert!(root.require_superadmin().is_ok());
        assert!(root.require_business_access(99).is_ok());
        assert_eq!(root.scope_business(None).unwrap(), None);
        assert_eq!(root.scope_business(Some(3)).unwrap(), Some(3));
    }

    #[test]
    fn members_are_pinned_to_their_business() {
        let owner = user(&["owner"], Some(5));
        assert!(owner.require_superadmin().is_err());
        assert!(owner.require_business_access(5).is_ok());
        assert!(owner.require_business_access(6).is_err());
        assert_eq!(owner.scope_business(None).unwrap(), Some(5));
        assert_eq!(owner.scope_business(Some(5)).unwrap(), Some(5));
        assert!(owner.scope_business(Some(6)).is_err());
    }

    #[test]
    fn user_without_business_cannot_self_serve() {
        let drifter = user(&["employee"], None);
        assert!(drifter.require_business().is_err());
        assert!(drifter.scope_business(None).is_err());
    }

    #[test]
    fn listings_without_view_permission_are_pinned_to_the_caller() {
        let employee = user(&["employee"], Some(5));
        assert_eq!(employee.visible_user(false, Some(42)), Some(1));
        assert_eq!(employee.visible_user(false, None), Some(1));

        let manager = user(&["manager"], Some(5));
        assert_eq!(manager.visible_user(true, Some(42)), Some(42));
        assert_eq!(manager.visible_user(true, None), None);
    }

    #[test]
    fn token_decoding_refuses_refresh_tokens() {
        let subject = TokenSubject {
            user_id: 3,
            email: "e@acme.test".into(),
            roles: vec!["employee".into()],
            business_id: Some(2),
        };
        let access = generate_access_token(&subject, "k", 60).unwrap();
        let (refresh, _) = generate_refresh_token(&subject, "k", 60).unwrap();

        let decoded = AuthUser::from_token(&access, "k").unwrap();
        assert_eq!(decoded.user_id, 3);
        assert_eq!(decoded.business_id, Some(2));
        assert!(AuthUser::from_token(&refresh, "k").is_err());
        assert!(AuthUser::from_token("garbage", "k").is_err());
    }
}
