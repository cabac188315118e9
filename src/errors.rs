use actix_identity::error::{GetIdentityError, LoginError};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(SqlxError),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Identity error: {0}")]
    IdentityError(#[from] GetIdentityError),

    #[error("Login error: {0}")]
    LoginError(#[from] LoginError),

    #[error("Password error: {0}")]
    PasswordError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound,
            e => AppError::DatabaseError(e),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::IdentityError(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseError(_)
            | AppError::MigrationError(_)
            | AppError::TemplateError(_)
            | AppError::LoginError(_)
            | AppError::PasswordError(_)
            | AppError::ConfigError(_)
            | AppError::StorageError(_)
            | AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            // pages send the browser back to the login form
            AppError::Unauthorized | AppError::IdentityError(_) => HttpResponse::SeeOther()
                .append_header(("Location", "/login"))
                .body("Redirecting to login page"),
            _ if self.status_code().is_server_error() => {
                HttpResponse::build(self.status_code()).body("Internal server error")
            }
            _ => HttpResponse::build(self.status_code()).body(self.to_string()),
        }
    }
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

/// Wrapper for the `/api` endpoints: same status codes as [`AppError`] but
/// a `{"error": "..."}` JSON body and no login redirect.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AppError);

impl From<SqlxError> for ApiError {
    fn from(err: SqlxError) -> Self {
        ApiError(AppError::from(err))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.status_code().is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.0.to_string()
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from(SqlxError::RowNotFound);
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_redirects_to_login() {
        let resp = AppError::Unauthorized.error_response();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get("Location").unwrap(), "/login");
    }

    #[actix_web::test]
    async fn api_error_is_json() {
        let resp = ApiError(AppError::Validation("name is required".into())).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "name is required");
    }

    #[actix_web::test]
    async fn server_errors_hide_details() {
        let resp = AppError::StorageError("disk full at /var/x".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], b"Internal server error");
    }
}
