pub mod test_support;

use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError,
};

// Default session timeouts for directory CRUD traffic: generous enough for
// paginated listings, short enough that a wedged query cannot hold a
// connection for long.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_secs(5),
    lock_timeout: Duration::from_secs(2),
    acquire_timeout: Duration::from_secs(3),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
    idle_in_transaction_session_timeout: Duration::from_secs(15),
};

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_in_transaction_session_timeout: Duration,
}

/// Connection pool snapshot, exposed on the diagnostics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub num_idle: usize,
}

pub fn pool_stats(pool: &PgPool) -> PoolStats {
    PoolStats {
        size: pool.size(),
        num_idle: pool.num_idle(),
    }
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        // Set PostgreSQL session-level timeouts for all queries on this connection
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let stmt_ms: i64 = timeouts
                    .statement_timeout
                    .as_millis()
                    .try_into()
                    .expect("statement_timeout too large");
                let lock_ms: i64 = timeouts
                    .lock_timeout
                    .as_millis()
                    .try_into()
                    .expect("lock_timeout too large");

                // SET commands don't accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{stmt_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;

                // Safety net: kill idle transactions so a leaked transaction
                // cannot hold locks forever
                let idle_tx_secs: i64 = timeouts
                    .idle_in_transaction_session_timeout
                    .as_secs()
                    .try_into()
                    .expect("idle_in_transaction_session_timeout too large");
                sqlx::query(&format!(
                    "SET idle_in_transaction_session_timeout = '{idle_tx_secs}s'"
                ))
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
        .connect(url)
        .await
}

/// Round-trips a trivial query and measures the latency. The caller turns
/// the result into a dependency probe.
pub async fn ping(pool: &PgPool) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(started.elapsed())
}

/// Determines if a sqlx::Error represents a unique constraint violation
/// (duplicate key), e.g. registering an email that already exists.
pub fn is_unique_violation_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(db_error) => {
            // Class 23 — Integrity Constraint Violation; 23505 = unique_violation
            // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
            if let Some(code) = db_error.code() {
                code.as_ref() == "23505"
            } else {
                let msg = db_error.message().to_lowercase();
                msg.contains("violates unique constraint") || msg.contains("duplicate key")
            }
        }
        _ => false,
    }
}

/// Determines if a sqlx::Error represents a timeout-related failure
pub fn is_timeout_error(error: &SqlxError) -> bool {
    match error {
        // Pool acquisition timed out
        SqlxError::PoolTimedOut => true,

        // IO-level timeout (network/socket)
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => true,

        // Protocol text sometimes includes "timeout"
        SqlxError::Protocol(msg) => msg.to_lowercase().contains("timeout"),

        // Database-reported timeouts/cancels
        SqlxError::Database(db_error) => {
            if let Some(code) = db_error.code() {
                let code = code.as_ref();
                // 57014: query_canceled (e.g., statement_timeout)
                // 55P03: lock_not_available (e.g., lock_timeout)
                // 25P03: idle_in_transaction_session_timeout
                code == "57014" || code == "55P03" || code == "25P03"
            } else {
                // Fallback heuristic (less reliable than SQLSTATE)
                let msg = db_error.message().to_lowercase();
                msg.contains("timeout")
                    || msg.contains("canceling")   // Postgres US spelling
                    || msg.contains("cancelling") // just in case
            }
        }

        _ => false,
    }
}

/// Determines if a sqlx::Error represents a transient failure worth a 503
/// rather than a 500
pub fn is_transient_error(error: &SqlxError) -> bool {
    match error {
        // Connection/pool issues: usually transient.
        SqlxError::Io(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        // TLS/handshake can be transient (network/cert rollover).
        | SqlxError::Tls(_) => true,

        // Database-specific errors: prefer SQLSTATE when available.
        SqlxError::Database(db_error) => {
            if let Some(code) = db_error.code() {
                let code = code.as_ref();

                // See: PostgreSQL SQLSTATE appendix
                // 08***  Connection Exception
                // 53***  Insufficient Resources
                // 57***  Operator Intervention
                // 58***  System Error (often transient)
                // 40001  Serialization Failure
                // 40003  Statement Completion Unknown (retry if idempotent)
                // 40P01  Deadlock Detected
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57")
                    || code.starts_with("58")
                    || code == "40001"
                    || code == "40003"
                    || code == "40P01"
            } else {
                // Last resort: message heuristics (less reliable than SQLSTATE).
                let msg = db_error.message().to_lowercase();
                msg.contains("connection")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("temporary")
                    || msg.contains("deadlock")
                    || msg.contains("serialization")
                    || msg.contains("disk full")
                    || msg.contains("canceling statement due to")
                    || msg.contains("terminating connection due to")
                    || msg.contains("ssl")
                    || msg.contains("tls")
            }
        }

        // Protocol glitches may be transient.
        SqlxError::Protocol(msg) => {
            let m = msg.to_lowercase();
            m.contains("connection") || m.contains("timeout") || m.contains("ssl") || m.contains("tls")
        }

        // Default: assume non-transient since we're not sure about the error type.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Error as SqlxError;

    #[test]
    fn transient_error_connection_errors() {
        let pool_timeout_error = SqlxError::PoolTimedOut;
        assert!(is_transient_error(&pool_timeout_error));

        let pool_closed_error = SqlxError::PoolClosed;
        assert!(is_transient_error(&pool_closed_error));

        let io_error = SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(is_transient_error(&io_error));

        let tls_error = SqlxError::Tls(Box::new(std::io::Error::other("TLS handshake failed")));
        assert!(is_transient_error(&tls_error));
    }

    #[test]
    fn transient_error_protocol_errors() {
        let protocol_connection_error = SqlxError::Protocol("connection lost".to_string());
        assert!(is_transient_error(&protocol_connection_error));

        let protocol_timeout_error = SqlxError::Protocol("operation timeout".to_string());
        assert!(is_transient_error(&protocol_timeout_error));

        let protocol_other_error = SqlxError::Protocol("invalid protocol version".to_string());
        assert!(!is_transient_error(&protocol_other_error));
    }

    #[test]
    fn transient_error_non_transient_errors() {
        let config_error =
            SqlxError::Configuration(Box::new(std::io::Error::other("invalid connection string")));
        assert!(!is_transient_error(&config_error));

        let column_error = SqlxError::ColumnNotFound("missing_column".to_string());
        assert!(!is_transient_error(&column_error));

        let row_not_found = SqlxError::RowNotFound;
        assert!(!is_transient_error(&row_not_found));

        let worker_crashed = SqlxError::WorkerCrashed;
        assert!(!is_transient_error(&worker_crashed));
    }

    #[test]
    fn unique_violation_non_database_errors() {
        let config_error =
            SqlxError::Configuration(Box::new(std::io::Error::other("invalid connection string")));
        assert!(!is_unique_violation_error(&config_error));

        let row_not_found = SqlxError::RowNotFound;
        assert!(!is_unique_violation_error(&row_not_found));

        let protocol_error = SqlxError::Protocol("some protocol error".to_string());
        assert!(!is_unique_violation_error(&protocol_error));
    }

    use crate::test_support::db_error;
    use sqlx::error::ErrorKind;

    #[test]
    fn unique_violation_with_sqlstate() {
        let unique_error = db_error(
            "duplicate key value violates unique constraint \"users_email_key\"",
            Some("23505"),
            ErrorKind::UniqueViolation,
        );
        assert!(is_unique_violation_error(&unique_error));

        // Other integrity violations don't match
        let fk_error = db_error(
            "insert violates foreign key constraint \"fk_constraint\"",
            Some("23503"),
            ErrorKind::ForeignKeyViolation,
        );
        assert!(!is_unique_violation_error(&fk_error));
    }

    #[test]
    fn unique_violation_message_fallback() {
        let no_code = db_error(
            "duplicate key value violates unique constraint \"tokens_token_key\"",
            None,
            ErrorKind::UniqueViolation,
        );
        assert!(is_unique_violation_error(&no_code));

        let short_msg = db_error(
            "violates unique constraint",
            None,
            ErrorKind::UniqueViolation,
        );
        assert!(is_unique_violation_error(&short_msg));

        let other_error = db_error("some other database error", None, ErrorKind::Other);
        assert!(!is_unique_violation_error(&other_error));
    }

    #[test]
    fn transient_error_sqlstate_classes() {
        // 08*** Connection Exception
        let conn_err = db_error(
            "connection dropped unexpectedly",
            Some("08006"),
            ErrorKind::Other,
        );
        assert!(is_transient_error(&conn_err));

        // 53*** Insufficient Resources
        let disk_full_err = db_error(
            "could not extend file: No space left on device",
            Some("53100"),
            ErrorKind::Other,
        );
        assert!(is_transient_error(&disk_full_err));

        // 57*** Operator Intervention
        let cancel_err = db_error(
            "canceling statement due to statement timeout",
            Some("57014"),
            ErrorKind::Other,
        );
        assert!(is_transient_error(&cancel_err));

        // 58*** System Error
        let sys_err = db_error(
            "could not read block: Input/output error",
            Some("58030"),
            ErrorKind::Other,
        );
        assert!(is_transient_error(&sys_err));

        // 40001 Serialization Failure
        let serialization_err = db_error(
            "could not serialize access due to concurrent update",
            Some("40001"),
            ErrorKind::Other,
        );
        assert!(is_transient_error(&serialization_err));

        // 40P01 Deadlock Detected
        let deadlock_err = db_error("deadlock detected", Some("40P01"), ErrorKind::Other);
        assert!(is_transient_error(&deadlock_err));
    }

    #[test]
    fn transient_error_non_transient_sqlstates() {
        // 23*** Integrity Constraint Violations (permanent)
        let unique_violation = db_error(
            "duplicate key value violates unique constraint",
            Some("23505"),
            ErrorKind::UniqueViolation,
        );
        assert!(!is_transient_error(&unique_violation));

        // 42*** Syntax Error or Access Rule Violation (permanent)
        let syntax_error = db_error(
            "syntax error at or near \"SELECT\"",
            Some("42601"),
            ErrorKind::Other,
        );
        assert!(!is_transient_error(&syntax_error));

        // 22*** Data Exception (usually permanent)
        let data_exception = db_error(
            "invalid input syntax for type integer",
            Some("22P02"),
            ErrorKind::Other,
        );
        assert!(!is_transient_error(&data_exception));
    }

    #[test]
    fn transient_error_message_fallback() {
        let connection_msg_err = db_error("connection to server was lost", None, ErrorKind::Other);
        assert!(is_transient_error(&connection_msg_err));

        let timeout_msg_err = db_error("operation timed out", None, ErrorKind::Other);
        assert!(is_transient_error(&timeout_msg_err));

        let ssl_msg_err = db_error(
            "SSL connection has been closed unexpectedly",
            None,
            ErrorKind::Other,
        );
        assert!(is_transient_error(&ssl_msg_err));

        let permanent_msg_err = db_error("column does not exist", None, ErrorKind::Other);
        assert!(!is_transient_error(&permanent_msg_err));

        // Memory pressure is NOT retried to avoid amplifying load
        let memory_err = db_error("out of memory", None, ErrorKind::Other);
        assert!(!is_transient_error(&memory_err));
    }

    #[test]
    fn timeout_error_pool_timeout() {
        assert!(is_timeout_error(&SqlxError::PoolTimedOut));
    }

    #[test]
    fn timeout_error_io() {
        let io_error = SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ));
        assert!(is_timeout_error(&io_error));

        let io_other = SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(!is_timeout_error(&io_other));
    }

    #[test]
    fn timeout_error_protocol() {
        let protocol_error = SqlxError::Protocol("operation timeout".to_string());
        assert!(is_timeout_error(&protocol_error));

        let protocol_non_timeout = SqlxError::Protocol("invalid protocol".to_string());
        assert!(!is_timeout_error(&protocol_non_timeout));
    }

    #[test]
    fn timeout_error_database_with_timeout_codes() {
        assert!(is_timeout_error(&db_error(
            "canceling statement due to statement timeout",
            Some("57014"),
            ErrorKind::Other
        )));
        assert!(is_timeout_error(&db_error(
            "lock not available",
            Some("55P03"),
            ErrorKind::Other
        )));
        assert!(is_timeout_error(&db_error(
            "terminating connection due to idle-in-transaction timeout",
            Some("25P03"),
            ErrorKind::Other
        )));
    }

    #[test]
    fn timeout_error_database_non_timeout_codes() {
        assert!(!is_timeout_error(&db_error(
            "duplicate key value violates unique constraint",
            Some("23505"),
            ErrorKind::UniqueViolation
        )));
        assert!(!is_timeout_error(&db_error(
            "syntax error at or near",
            Some("42601"),
            ErrorKind::Other
        )));
    }

    #[test]
    fn timeout_error_database_message_fallback() {
        assert!(is_timeout_error(&db_error(
            "operation timeout",
            None,
            ErrorKind::Other
        )));
        assert!(is_timeout_error(&db_error(
            "canceling statement due to timeout",
            None,
            ErrorKind::Other
        )));
        assert!(is_timeout_error(&db_error(
            "cancelling statement due to timeout",
            None,
            ErrorKind::Other
        )));

        assert!(!is_timeout_error(&db_error(
            "column does not exist",
            None,
            ErrorKind::Other
        )));
        assert!(!is_timeout_error(&db_error(
            "relation does not exist",
            None,
            ErrorKind::Other
        )));
    }
}
