use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use sqlx::error::ErrorKind;
use validator::ValidationErrors;

/// Field name → list of messages, returned with 422 responses.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "The given data was invalid")]
    Validation(FieldErrors),

    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "{}", _0)]
    Unprocessable(String),

    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, msg: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![msg.into()]);
        ApiError::Validation(errors)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(errors) => json!({
                "message": self.to_string(),
                "errors": errors,
            }),
            _ => json!({ "message": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("{field} is invalid ({})", e.code),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        ApiError::Validation(fields)
    }
}

impl ApiError {
    /// Client-facing error for a violated constraint, `None` when the
    /// failure is not the caller's fault.
    fn from_constraint(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::UniqueViolation => {
                Some(ApiError::conflict("Record conflicts with an existing one"))
            }
            ErrorKind::ForeignKeyViolation => Some(ApiError::Unprocessable(
                "Referenced record does not exist or is still in use".into(),
            )),
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => Some(
                ApiError::Unprocessable("Record violates a required constraint".into()),
            ),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(mapped) = ApiError::from_constraint(db_err.kind()) {
                tracing::warn!(error = %db_err, "Constraint violation");
                return mapped;
            }
        }
        tracing::error!(error = %e, "Database error");
        ApiError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "email must be a valid address"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(ApiError::invalid("x", "bad").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Claim").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Unprocessable("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn constraint_violations_map_to_client_errors() {
        let status = |kind| ApiError::from_constraint(kind).map(|e| e.status_code());

        assert_eq!(status(ErrorKind::UniqueViolation), Some(StatusCode::CONFLICT));
        assert_eq!(
            status(ErrorKind::ForeignKeyViolation),
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(
            status(ErrorKind::NotNullViolation),
            Some(StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert_eq!(status(ErrorKind::Other), None);
    }

    #[test]
    fn non_database_errors_are_internal() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal Server Error");
    }

    #[test]
    fn not_found_names_the_resource() {
        assert_eq!(ApiError::NotFound("Advance").to_string(), "Advance not found");
    }

    #[test]
    fn validation_errors_keep_field_messages() {
        let signup = Signup {
            email: "nope".into(),
            password: "short".into(),
        };
        let err: ApiError = signup.validate().unwrap_err().into();

        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields["email"], vec!["email must be a valid address".to_string()]);
        assert_eq!(fields["password"].len(), 1);
        assert!(fields["password"][0].contains("password"));
    }

    #[actix_web::test]
    async fn validation_response_body_lists_errors() {
        let resp = ApiError::invalid("amount", "amount must be positive").error_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "The given data was invalid");
        assert_eq!(json["errors"]["amount"][0], "amount must be positive");
    }
}
