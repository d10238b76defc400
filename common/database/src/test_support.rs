//! Fabricated driver-level errors for exercising the classifiers from tests,
//! here and in dependent crates.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::Error as SqlxError;

#[derive(Debug)]
pub struct MockDbError {
    pub msg: &'static str,
    pub code: Option<&'static str>,
    pub kind: ErrorKind,
}

impl fmt::Display for MockDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msg)
    }
}

impl StdError for MockDbError {}

impl DatabaseError for MockDbError {
    fn message(&self) -> &str {
        self.msg
    }

    fn kind(&self) -> ErrorKind {
        // ErrorKind is not Clone, map back to a matching value
        match self.kind {
            ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
            ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
            ErrorKind::NotNullViolation => ErrorKind::NotNullViolation,
            ErrorKind::CheckViolation => ErrorKind::CheckViolation,
            _ => ErrorKind::Other,
        }
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        self.code.map(Cow::from)
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }
}

/// Wraps a fabricated database error into a `sqlx::Error`.
pub fn db_error(msg: &'static str, code: Option<&'static str>, kind: ErrorKind) -> SqlxError {
    SqlxError::from(MockDbError { msg, code, kind })
}
