//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 비즈니스 규칙 위반: 4xx (잔액 부족, 영업시간 외, 상태 충돌)
/// - 서버 에러: 5xx (내부 오류)
///
/// 민감한 내부 정보(SQL 에러 등)는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ============ 401 / 403 ============
    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Balance integrity check failed for user {0}")]
    IntegrityViolation(i64),

    // ============ 422 Unprocessable Entity ============
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    // ============ 423 Locked ============
    #[error("Outside business hours, next business day {next_business_day}")]
    OutsideBusinessHours { next_business_day: NaiveDate },

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin privileges required".to_string(),
                None,
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "Balance was modified concurrently, retry the operation".to_string(),
                Some(msg.clone()),
            ),
            ApiError::InvalidState(msg) => (
                StatusCode::CONFLICT,
                "INVALID_STATE",
                "Operation not allowed in current state".to_string(),
                Some(msg.clone()),
            ),
            ApiError::IntegrityViolation(user_id) => {
                tracing::warn!(user_id, "Balance integrity violation surfaced to client");
                (
                    StatusCode::CONFLICT,
                    "INTEGRITY_VIOLATION",
                    "Balance verification failed, contact support".to_string(),
                    None,
                )
            }
            ApiError::InsufficientBalance(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
                "Insufficient balance".to_string(),
                Some(msg.clone()),
            ),
            ApiError::OutsideBusinessHours { next_business_day } => (
                StatusCode::LOCKED,
                "OUTSIDE_BUSINESS_HOURS",
                "Withdrawals are processed during business hours only".to_string(),
                Some(format!("next business day: {}", next_business_day)),
            ),

            // 5xx 서버 에러
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::InternalError => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Repository 에러를 ApiError로 변환
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::VersionConflict { .. } => ApiError::Conflict(err.to_string()),
            StoreError::InvalidTransition(msg) => ApiError::InvalidState(msg),
            StoreError::InsufficientFunds { .. } => ApiError::InsufficientBalance(err.to_string()),
            StoreError::ConstraintViolation(msg) => ApiError::ValidationError(msg),
            StoreError::Corrupt(msg) => {
                tracing::error!("Corrupt row: {}", msg);
                ApiError::InternalError
            }
            StoreError::Database(e) => e.into(),
        }
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        ApiError::DatabaseError(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::InternalError
    }
}
