//! Errors for Atlas Core.
//!
//! Every failure is an [`AtlasError`]: a stable [`ErrorCode`], a message that
//! is safe to return to callers, an optional internal message that only goes
//! to logs, and an optional source. Absence of an experiment is not an error
//! inside the engine; loaders and the aggregator return `Ok(None)` and only
//! the HTTP edge turns that into `RecordNotFound`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AtlasError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// The caller sent something we refuse.
    Low,
    /// The request was aborted by a deadline, cancellation or back-pressure.
    Medium,
    /// A dependency misbehaved.
    High,
    Critical,
}

/// One row per code: numeric code, HTTP status, severity.
macro_rules! error_codes {
    ($( $variant:ident = $numeric:literal, $status:ident, $severity:ident; )+) => {
        /// Machine-readable error codes, stable across releases.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum ErrorCode {
            $( $variant, )+
        }

        impl ErrorCode {
            pub const fn numeric_code(&self) -> u32 {
                match self {
                    $( Self::$variant => $numeric, )+
                }
            }

            pub const fn http_status(&self) -> StatusCode {
                match self {
                    $( Self::$variant => StatusCode::$status, )+
                }
            }

            pub const fn severity(&self) -> ErrorSeverity {
                match self {
                    $( Self::$variant => ErrorSeverity::$severity, )+
                }
            }
        }
    };
}

error_codes! {
    AggregationCancelled     = 1000, INTERNAL_SERVER_ERROR, Medium;
    TimeLimitExceeded        = 1001, GATEWAY_TIMEOUT,       Medium;
    FanOutSaturated          = 1002, SERVICE_UNAVAILABLE,   Medium;

    DatabaseError            = 2000, INTERNAL_SERVER_ERROR, High;
    DatabaseConnectionFailed = 2001, SERVICE_UNAVAILABLE,   Critical;
    DatabaseQueryFailed      = 2002, INTERNAL_SERVER_ERROR, High;
    RecordNotFound           = 2004, NOT_FOUND,             Low;
    UnexpectedRow            = 2006, INTERNAL_SERVER_ERROR, High;

    SerializationError       = 2200, INTERNAL_SERVER_ERROR, High;
    DeserializationError     = 2201, INTERNAL_SERVER_ERROR, High;

    Unauthorized             = 4000, UNAUTHORIZED,          Low;

    ValidationError          = 4100, UNPROCESSABLE_ENTITY,  Low;
    InvalidInput             = 4101, BAD_REQUEST,           Low;
    UnknownColumn            = 4104, UNPROCESSABLE_ENTITY,  Low;

    ConfigurationError       = 5000, INTERNAL_SERVER_ERROR, High;
    MissingConfiguration     = 5001, INTERNAL_SERVER_ERROR, High;
    InvalidConfiguration     = 5002, INTERNAL_SERVER_ERROR, High;

    InternalError            = 9000, INTERNAL_SERVER_ERROR, Critical;
}

impl ErrorCode {
    /// Whether a caller may retry. The engine itself never retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed | Self::DatabaseQueryFailed | Self::TimeLimitExceeded | Self::FanOutSaturated
        )
    }

    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "aggregation",
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AtlasError
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured details returned alongside the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ErrorDetails {
    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_type.is_none() && self.entity_id.is_none()
    }
}

#[derive(Error, Debug)]
pub struct AtlasError {
    code: ErrorCode,
    user_message: Cow<'static, str>,
    /// Logged, never returned to clients.
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " ({})", internal)?;
        }
        Ok(())
    }
}

impl AtlasError {
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        counter!(
            "atlas_errors_total",
            "code" => code.to_string(),
            "category" => code.category(),
            "retryable" => code.is_retryable().to_string(),
        )
        .increment(1);

        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        }
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// The message names only the requested identifier, so a foreign record
    /// and a missing one are indistinguishable.
    pub fn not_found(entity_type: &str, entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        let mut error = Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        );
        error.details.entity_type = Some(entity_type.to_string());
        error.details.entity_id = Some(entity_id);
        error
    }

    /// Well-formed request with a value we refuse (422).
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Request that could not be parsed at all (400).
    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// A column outside the table's whitelist was used in a query.
    pub fn unknown_column(table: &str, column: &str) -> Self {
        Self::with_internal(
            ErrorCode::UnknownColumn,
            "Query referenced an unknown column",
            format!("{}.{}", table, column),
        )
        .with_context("table", table)
        .with_context("column", column)
    }

    /// The store returned a row of a different table than the one queried.
    pub fn unexpected_row(expected: &str, actual: &str) -> Self {
        Self::with_internal(
            ErrorCode::UnexpectedRow,
            "The data store returned an unexpected record",
            format!("expected {} row, got {}", expected, actual),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::AggregationCancelled, "The request was cancelled")
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    /// Log at a level chosen by severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => tracing::error!(
                error_code = %code,
                category,
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                details = ?self.details,
                source = ?self.source,
                "Request failed"
            ),
            ErrorSeverity::Medium => tracing::warn!(
                error_code = %code,
                category,
                http_status = status,
                internal_message = ?self.internal_message,
                "Request aborted"
            ),
            ErrorSeverity::Low => tracing::debug!(
                error_code = %code,
                http_status = status,
                user_message = %self.user_message,
                "Request rejected"
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// `{ "success": false, "error": { ... } }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&AtlasError> for ErrorResponse {
    fn from(error: &AtlasError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: (!error.details.is_empty()).then(|| error.details.clone()),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for AtlasError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AtlasError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_message) = match &error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                (ErrorCode::DatabaseConnectionFailed, "Unable to connect to the database")
            }
            sqlx::Error::Database(_) | sqlx::Error::ColumnNotFound(_) => {
                (ErrorCode::DatabaseQueryFailed, "A database error occurred")
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                (ErrorCode::DeserializationError, "Stored data could not be decoded")
            }
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        Self::with_internal(code, user_message, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };
        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<tokio::sync::AcquireError> for AtlasError {
    fn from(error: tokio::sync::AcquireError) -> Self {
        Self::internal(format!("fan-out semaphore closed: {}", error)).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for AtlasError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(ErrorCode::TimeLimitExceeded, "Operation timed out", error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for AtlasError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<AtlasError>() {
            Ok(atlas_error) => atlas_error,
            Err(error) => Self::internal(format!("{:#}", error)),
        }
    }
}

impl From<config::ConfigError> for AtlasError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_message) = match &error {
            config::ConfigError::NotFound(_) => (ErrorCode::MissingConfiguration, "Required configuration not found"),
            // A required config file that does not exist.
            config::ConfigError::Foreign(cause)
                if cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound) =>
            {
                (ErrorCode::MissingConfiguration, "Configuration file not found")
            }
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                (ErrorCode::InvalidConfiguration, "Configuration could not be parsed")
            }
            _ => (ErrorCode::ConfigurationError, "Invalid configuration"),
        };
        Self::with_internal(code, user_message, error.to_string()).with_source(error)
    }
}
