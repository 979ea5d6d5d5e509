#[cfg(feature = "sqlx")]
use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    Database,
    InvalidInput,
    NotFound,
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            source,
        }
    }

    pub fn conflict(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            code: "conflict",
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    /// True for outcomes the caller caused and can correct.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Conflict | ErrorKind::InvalidInput | ErrorKind::NotFound
        )
    }
}

impl std::fmt::Display for LibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {:#}", self.public, self.code, self.source)
    }
}

/// Maps constraint violations raised by PostgreSQL onto the error kinds a
/// caller can act on. Anything else is a store failure.
#[cfg(feature = "sqlx")]
pub(crate) fn classify_db_error(public: &'static str, err: sqlx::Error) -> LibError {
    let violation = err.as_database_error().map(|db_err| db_err.kind());
    match violation {
        Some(sqlx::error::ErrorKind::UniqueViolation) => LibError::conflict(public, anyhow!(err)),
        Some(sqlx::error::ErrorKind::ForeignKeyViolation) => {
            LibError::not_found("Graph not found", anyhow!(err))
        }
        Some(sqlx::error::ErrorKind::CheckViolation)
        | Some(sqlx::error::ErrorKind::NotNullViolation) => {
            LibError::invalid_with_code("constraint_violation", public, anyhow!(err))
        }
        _ => LibError::database(public, anyhow!(err)),
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        classify_db_error("Database request failed", value)
    }
}
