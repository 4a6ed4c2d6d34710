//! Unified error handling for the Flux Studio CLI and SDK
//!
//! Every error carries a unique code for debugging and documentation,
//! structured context, and convenient constructor methods.

use std::fmt;
use thiserror::Error;

/// Unified Result type for all Flux Studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Error codes for Flux Studio operations
///
/// Each error has a unique code in the format `EXXX` where:
/// - E1XX: Configuration and credential errors
/// - E2XX: Network and API errors
/// - E3XX: File and I/O errors
/// - E4XX: Job lifecycle errors
/// - E5XX: Validation and input errors
/// - E8XX: UI and interaction errors
/// - E9XX: Internal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (E1XX)
    /// E101: Configuration error
    ConfigError,
    /// E102: Missing credentials
    MissingCredentials,
    /// E103: Invalid endpoint
    InvalidEndpoint,

    // Network (E2XX)
    /// E201: HTTP request failed
    HttpError,
    /// E202: Connection timeout
    ConnectionTimeout,
    /// E203: Connection refused
    ConnectionRefused,
    /// E204: API returned error response
    ApiError,
    /// E205: Invalid API response format
    InvalidResponse,

    // File/IO (E3XX)
    /// E301: File not found
    FileNotFound,
    /// E302: File read error
    FileReadError,
    /// E303: File write error
    FileWriteError,

    // Job lifecycle (E4XX)
    /// E401: Submit acknowledged without a job id
    NoJobId,
    /// E402: Engine reported job failure
    JobFailed,
    /// E403: Engine reported job cancellation
    JobCancelled,
    /// E404: Local wait deadline exceeded
    JobTimeout,

    // Validation (E5XX)
    /// E501: Invalid input
    InvalidInput,
    /// E502: Resource not found
    ResourceNotFound,

    // UI (E8XX)
    /// E801: Dialog error
    DialogError,
    /// E802: User cancelled
    UserCancelled,

    // Internal (E9XX)
    /// E901: Internal error
    InternalError,
    /// E902: Serialization error
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::ConfigError => 101,
            ErrorCode::MissingCredentials => 102,
            ErrorCode::InvalidEndpoint => 103,

            ErrorCode::HttpError => 201,
            ErrorCode::ConnectionTimeout => 202,
            ErrorCode::ConnectionRefused => 203,
            ErrorCode::ApiError => 204,
            ErrorCode::InvalidResponse => 205,

            ErrorCode::FileNotFound => 301,
            ErrorCode::FileReadError => 302,
            ErrorCode::FileWriteError => 303,

            ErrorCode::NoJobId => 401,
            ErrorCode::JobFailed => 402,
            ErrorCode::JobCancelled => 403,
            ErrorCode::JobTimeout => 404,

            ErrorCode::InvalidInput => 501,
            ErrorCode::ResourceNotFound => 502,

            ErrorCode::DialogError => 801,
            ErrorCode::UserCancelled => 802,

            ErrorCode::InternalError => 901,
            ErrorCode::SerializationError => 902,
        }
    }

    /// Get the string code (e.g., "E201")
    pub fn as_str(&self) -> String {
        format!("E{}", self.code())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.code())
    }
}

/// Main error type for all Flux Studio operations
#[derive(Error, Debug)]
pub enum StudioError {
    // ==================== Configuration Errors (E1XX) ====================
    /// Configuration error
    #[error("[{code}] Configuration error: {message}")]
    Config {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<config::ConfigError>,
    },

    // ==================== Network Errors (E2XX) ====================
    /// Transport-level failure below the HTTP layer
    #[error("[{code}] Network error: {message}")]
    Network {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// HTTP response received with a non-2xx status
    #[error("[{code}] API error ({status}): {body}")]
    Api {
        code: ErrorCode,
        status: u16,
        body: String,
    },

    // ==================== File/IO Errors (E3XX) ====================
    /// File or IO error
    #[error("[{code}] {context}: {message}")]
    Io {
        code: ErrorCode,
        context: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // ==================== Job Lifecycle Errors (E4XX) ====================
    /// Submit was acknowledged but the response carried no job id
    #[error("[{code}] Submit response did not include a job id")]
    NoJobId { code: ErrorCode },

    /// Engine explicitly reported failure
    #[error("[{code}] Job failed: {message}")]
    JobFailed { code: ErrorCode, message: String },

    /// Engine reported the job as cancelled
    #[error("[{code}] Job {id} was cancelled by the engine")]
    JobCancelled { code: ErrorCode, id: String },

    /// Local deadline exceeded; a best-effort remote cancel was attempted
    #[error("[{code}] Job did not complete within {waited_secs}s")]
    JobTimeout { code: ErrorCode, waited_secs: u64 },

    // ==================== Validation Errors (E5XX) ====================
    /// Invalid input error
    #[error("[{code}] Invalid input: {message}")]
    InvalidInput { code: ErrorCode, message: String },

    /// Resource not found
    #[error("[{code}] Not found: {resource}")]
    NotFound { code: ErrorCode, resource: String },

    // ==================== UI Errors (E8XX) ====================
    /// UI/Dialog error
    #[error("[{code}] UI error: {message}")]
    Ui { code: ErrorCode, message: String },

    // ==================== Internal Errors (E9XX) ====================
    /// Internal/Unexpected error
    #[error("[{code}] Internal error: {message}")]
    Internal { code: ErrorCode, message: String },

    /// JSON serialization error
    #[error("[{code}] Serialization error: {message}")]
    Serialization {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

// ==================== Constructor Methods ====================

impl StudioError {
    // --- Configuration ---

    /// Create configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::ConfigError,
            message: message.into(),
            source: None,
        }
    }

    /// Create missing credentials error
    pub fn missing_credentials(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::MissingCredentials,
            message: message.into(),
            source: None,
        }
    }

    /// Create invalid endpoint error
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::InvalidEndpoint,
            message: message.into(),
            source: None,
        }
    }

    // --- Network ---

    /// Create network error from message
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            code: ErrorCode::HttpError,
            message: message.into(),
            source: None,
        }
    }

    /// Create network error from reqwest error
    pub fn network_from_reqwest(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::ConnectionTimeout
        } else if err.is_connect() {
            ErrorCode::ConnectionRefused
        } else {
            ErrorCode::HttpError
        };

        Self::Network {
            code,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create API error from a non-2xx response
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            code: ErrorCode::ApiError,
            status,
            body: body.into(),
        }
    }

    /// Create invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::Api {
            code: ErrorCode::InvalidResponse,
            status: 0,
            body: message.into(),
        }
    }

    // --- File/IO ---

    /// Create IO error with context
    pub fn io(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            code: ErrorCode::FileReadError,
            context: context.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create IO error from std::io::Error
    pub fn io_from_error(context: impl Into<String>, err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::FileWriteError,
            _ => ErrorCode::FileReadError,
        };

        Self::Io {
            code,
            context: context.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create file not found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::Io {
            code: ErrorCode::FileNotFound,
            context: "File not found".to_string(),
            message: path.into(),
            source: None,
        }
    }

    // --- Job lifecycle ---

    /// Create missing job id error
    pub fn no_job_id() -> Self {
        Self::NoJobId {
            code: ErrorCode::NoJobId,
        }
    }

    /// Create job failed error carrying the engine's message
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed {
            code: ErrorCode::JobFailed,
            message: message.into(),
        }
    }

    /// Create job cancelled error
    pub fn job_cancelled(id: impl Into<String>) -> Self {
        Self::JobCancelled {
            code: ErrorCode::JobCancelled,
            id: id.into(),
        }
    }

    /// Create job timeout error
    pub fn job_timeout(waited_secs: u64) -> Self {
        Self::JobTimeout {
            code: ErrorCode::JobTimeout,
            waited_secs,
        }
    }

    // --- Validation ---

    /// Create invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::InvalidInput,
            message: message.into(),
        }
    }

    /// Create not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::ResourceNotFound,
            resource: resource.into(),
        }
    }

    // --- UI ---

    /// Create user cancelled error
    pub fn user_cancelled() -> Self {
        Self::Ui {
            code: ErrorCode::UserCancelled,
            message: "Operation cancelled by user".to_string(),
        }
    }

    // --- Internal ---

    /// Create internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: ErrorCode::InternalError,
            message: message.into(),
        }
    }

    /// Create serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            code: ErrorCode::SerializationError,
            message: message.into(),
            source: None,
        }
    }

    // --- Utility Methods ---

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config { code, .. } => *code,
            Self::Network { code, .. } => *code,
            Self::Api { code, .. } => *code,
            Self::Io { code, .. } => *code,
            Self::NoJobId { code } => *code,
            Self::JobFailed { code, .. } => *code,
            Self::JobCancelled { code, .. } => *code,
            Self::JobTimeout { code, .. } => *code,
            Self::InvalidInput { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Ui { code, .. } => *code,
            Self::Internal { code, .. } => *code,
            Self::Serialization { code, .. } => *code,
        }
    }

    /// Check if this is a network-level error
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Api { .. })
    }

    /// Check if this error ends a job's lifecycle on the client side
    pub fn is_terminal_job_error(&self) -> bool {
        matches!(
            self,
            Self::JobFailed { .. } | Self::JobCancelled { .. } | Self::JobTimeout { .. }
        )
    }
}

// ==================== From Implementations ====================

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        Self::io_from_error("IO operation", err)
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        Self::network_from_reqwest(err)
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            code: ErrorCode::SerializationError,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<config::ConfigError> for StudioError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            code: ErrorCode::ConfigError,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<dialoguer::Error> for StudioError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Ui {
            code: ErrorCode::DialogError,
            message: format!("Dialog error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::ConfigError.code(), 101);
        assert_eq!(ErrorCode::HttpError.code(), 201);
        assert_eq!(ErrorCode::FileNotFound.code(), 301);
        assert_eq!(ErrorCode::NoJobId.code(), 401);
    }

    #[test]
    fn test_error_code_string() {
        assert_eq!(ErrorCode::JobFailed.as_str(), "E402");
        assert_eq!(ErrorCode::ApiError.as_str(), "E204");
    }

    #[test]
    fn test_error_display() {
        let err = StudioError::job_failed("OOM");
        assert!(err.to_string().contains("E402"));
        assert!(err.to_string().contains("OOM"));

        let err = StudioError::api(500, "worker exception");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("worker exception"));
    }

    #[test]
    fn test_terminal_job_errors() {
        assert!(StudioError::job_timeout(600).is_terminal_job_error());
        assert!(StudioError::job_cancelled("j-1").is_terminal_job_error());
        assert!(!StudioError::no_job_id().is_terminal_job_error());
        assert!(StudioError::api(502, "bad gateway").is_network_error());
    }
}
