//! Engine Errors
//!
//! Structured error values carrying a domain code, a human message, a
//! correlation id, and optional details. Codes map onto HTTP statuses at the
//! handler layer.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Domain error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Authorization
    Unauthenticated,
    Forbidden,
    BidVerifiedRequired,

    // Rate limiting
    TooManyRequests,

    // Validation
    InvalidArgument,
    AucBidStepTooLow,
    AucInvalidTimeWindow,
    AucProductNotAvailable,
    BidBelowMinimum,
    BidNotMultipleOfStep,

    // State
    AucNotFound,
    AucNotLive,
    AucElapsed,
    AucNewForbiddenState,
    BidNotFound,
    Conflict,

    // Transient / internal
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::BidVerifiedRequired => "BID_VERIFIED_REQUIRED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AucBidStepTooLow => "AUC_BID_STEP_TOO_LOW",
            Self::AucInvalidTimeWindow => "AUC_INVALID_TIME_WINDOW",
            Self::AucProductNotAvailable => "AUC_PRODUCT_NOT_AVAILABLE",
            Self::BidBelowMinimum => "BID_BELOW_MINIMUM",
            Self::BidNotMultipleOfStep => "BID_NOT_MULTIPLE_OF_STEP",
            Self::AucNotFound => "AUC_NOT_FOUND",
            Self::AucNotLive => "AUC_NOT_LIVE",
            Self::AucElapsed => "AUC_ELAPSED",
            Self::AucNewForbiddenState => "AUC_NEW_FORBIDDEN_STATE",
            Self::BidNotFound => "BID_NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status the code maps to.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::BidVerifiedRequired => StatusCode::FORBIDDEN,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidArgument
            | Self::AucBidStepTooLow
            | Self::AucInvalidTimeWindow
            | Self::AucProductNotAvailable
            | Self::BidBelowMinimum
            | Self::BidNotMultipleOfStep => StatusCode::BAD_REQUEST,
            Self::AucNotFound | Self::BidNotFound => StatusCode::NOT_FOUND,
            Self::AucNotLive
            | Self::AucElapsed
            | Self::AucNewForbiddenState
            | Self::Conflict => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error value.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: Uuid,
    pub details: Option<Value>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: Uuid::new_v4(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Authentication required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn rate_limited(retry_after_secs: i64) -> Self {
        Self::new(
            ErrorCode::TooManyRequests,
            format!("Too many requests; retry after {retry_after_secs}s"),
        )
    }

    pub fn auction_not_found(auction_id: i64) -> Self {
        Self::new(
            ErrorCode::AucNotFound,
            format!("Auction {auction_id} not found"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Whether a caller may retry after observing current state.
    pub fn is_retriable(&self) -> bool {
        matches!(self.code, ErrorCode::Unavailable | ErrorCode::Conflict)
    }

    /// Wire body for error responses.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code.as_str(),
            message: self.message.clone(),
            correlation_id: self.correlation_id,
            details: self.details.clone(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if let Some(code) = db.code() {
                // 23505: unique violation (e.g. second active auction per product).
                if code == "23505" {
                    return Self::new(ErrorCode::Conflict, "Conflicting concurrent change");
                }
                // 40001: serialization failure, safe to retry.
                if code == "40001" {
                    return Self::new(ErrorCode::Unavailable, "Transient conflict; retry");
                }
            }
        }
        tracing::error!(error = %err, "database error");
        Self::new(ErrorCode::Internal, "Internal error")
    }
}

/// Error response body: `{code, message, correlation_id, details?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Result alias used across the engine.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ErrorCode::Unauthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::BidVerifiedRequired.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::TooManyRequests.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::BidBelowMinimum.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::AucNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::AucNotLive.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::Unavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::Internal.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_carries_code_and_details() {
        let err = CoreError::new(ErrorCode::BidBelowMinimum, "Bid must be at least 1050.00")
            .with_details(serde_json::json!({ "required_minimum": "1050.00" }));
        let body = err.body();
        assert_eq!(body.code, "BID_BELOW_MINIMUM");
        assert!(body.details.is_some());
    }

    #[test]
    fn retriable_classes() {
        assert!(CoreError::new(ErrorCode::Unavailable, "retry").is_retriable());
        assert!(!CoreError::unauthenticated().is_retriable());
    }
}
