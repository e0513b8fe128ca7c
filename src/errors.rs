//! Adapter-level failures and the tags they collapse into at the façade boundary.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Machine-readable reason attached to a degraded (empty) result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Auth,
    Timeout,
    PermissionDenied,
    TableMissing,
    Parse,
    Generic,
    Unconfigured,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission-denied",
            Self::TableMissing => "table-missing",
            Self::Parse => "parse",
            Self::Generic => "generic",
            Self::Unconfigured => "unconfigured",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no resolvable credential: {details}")]
    Auth { details: String },

    #[error("{operation} exceeded its {budget:?} budget")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("access denied by {origin}: {details}")]
    Permission {
        origin: &'static str,
        details: String,
    },

    #[error("expected table or column is absent: {details}")]
    Schema { details: String },

    #[error("malformed {context}: {details}")]
    Parse {
        context: &'static str,
        details: String,
    },

    #[error("source failure: {details}")]
    Other { details: String },
}

impl SourceError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Auth { .. } => FailureReason::Auth,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Permission { .. } => FailureReason::PermissionDenied,
            Self::Schema { .. } => FailureReason::TableMissing,
            Self::Parse { .. } => FailureReason::Parse,
            Self::Other { .. } => FailureReason::Generic,
        }
    }

    pub fn parse(context: &'static str, details: impl fmt::Display) -> Self {
        Self::Parse {
            context,
            details: details.to_string(),
        }
    }
}

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";
const INSUFFICIENT_PRIVILEGE: &str = "42501";

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNDEFINED_TABLE) | Some(UNDEFINED_COLUMN) => Self::Schema {
                    details: db.message().to_string(),
                },
                Some(INSUFFICIENT_PRIVILEGE) => Self::Permission {
                    origin: "remote store",
                    details: db.message().to_string(),
                },
                _ => Self::Other {
                    details: err.to_string(),
                },
            },
            sqlx::Error::PoolTimedOut => Self::Timeout {
                operation: "connection acquire",
                budget: Duration::ZERO,
            },
            sqlx::Error::ColumnNotFound(column) => Self::Schema {
                details: format!("column {column} not found"),
            },
            _ => Self::Other {
                details: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Permission {
                origin: "device-local store",
                details: err.to_string(),
            },
            std::io::ErrorKind::TimedOut => Self::Timeout {
                operation: "local read",
                budget: Duration::ZERO,
            },
            _ => Self::Other {
                details: err.to_string(),
            },
        }
    }
}
