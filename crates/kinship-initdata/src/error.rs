use thiserror::Error;

/// Terminal rejection reasons for an init-data payload.
///
/// Display strings are safe to log; none of them carries the computed or received hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitDataError {
    #[error("init data has no hash parameter")]
    MissingHash,
    #[error("init data has no auth_date parameter")]
    MissingTimestamp,
    #[error("init data auth_date is not an integer")]
    InvalidTimestamp,
    #[error("bot credential is missing or malformed")]
    InvalidCredential,
    #[error("init data signature mismatch")]
    InvalidSignature,
    #[error("init data is older than the freshness window")]
    StaleSession,
    #[error("init data auth_date is too far in the future")]
    TimestampInFuture,
    #[error("init data user payload is missing or malformed")]
    InvalidUserPayload,
}

/// How the HTTP boundary should classify a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The payload is structurally unusable.
    Malformed,
    /// The payload is well formed but not trusted.
    Unauthorized,
    /// The server is misconfigured; not the client's fault.
    Misconfigured,
}

impl InitDataError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHash => "missing_hash",
            Self::MissingTimestamp => "missing_timestamp",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::InvalidCredential => "invalid_credential",
            Self::InvalidSignature => "invalid_signature",
            Self::StaleSession => "stale_session",
            Self::TimestampInFuture => "timestamp_in_future",
            Self::InvalidUserPayload => "invalid_user_payload",
        }
    }

    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::MissingHash
            | Self::MissingTimestamp
            | Self::InvalidTimestamp
            | Self::InvalidUserPayload => RejectionKind::Malformed,
            Self::InvalidSignature | Self::StaleSession | Self::TimestampInFuture => {
                RejectionKind::Unauthorized
            }
            Self::InvalidCredential => RejectionKind::Misconfigured,
        }
    }
}
