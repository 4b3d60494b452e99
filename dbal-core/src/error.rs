/// Errors that can occur anywhere in the DBAL stack.
///
/// This is a closed set: adapters, blob backends, and handlers all speak the
/// same ten codes, and every code maps to exactly one HTTP status and one
/// wire tag. Handlers attach context to the message without changing the
/// code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    CapabilityNotSupported(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable wire tag, used by the blob error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::CapabilityNotSupported(_) => "NOT_SUPPORTED",
            Error::Timeout(_) => "TIMEOUT",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status carried by responses built from this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 422,
            Error::RateLimited(_) => 429,
            Error::CapabilityNotSupported(_) => 501,
            Error::Timeout(_) => 504,
            Error::Database(_) => 503,
            Error::Internal(_) => 500,
        }
    }
}
