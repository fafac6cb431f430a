use keystone_core::{Error, error::StorageError};

/// Map a sqlx failure into a storage error, logging it at the failure site.
///
/// Unique violations become [`StorageError::Constraint`] so callers can tell
/// a lost race from an infrastructure failure. Foreign key violations become
/// [`StorageError::ForeignKey`].
pub(crate) fn db_error(message: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                tracing::warn!(error = %e, "{}", message);
                return Error::Storage(StorageError::Constraint(format!(
                    "{message}: {}",
                    db.message()
                )));
            }
            if db.is_foreign_key_violation() {
                tracing::warn!(error = %e, "{}", message);
                return Error::Storage(StorageError::ForeignKey(format!(
                    "{message}: {}",
                    db.message()
                )));
            }
        }

        tracing::error!(error = %e, "{}", message);
        Error::Storage(StorageError::Database(message.to_string()))
    }
}

/// Like [`db_error`], for inserts keyed by a caller-chosen id: a unique
/// violation there means the record exists, not that a race was lost.
pub(crate) fn insert_error(message: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            tracing::warn!(error = %e, "{}", message);
            Error::Storage(StorageError::AlreadyExists(format!(
                "{message}: {}",
                db.message()
            )))
        }
        _ => db_error(message)(e),
    }
}

pub(crate) fn corrupt_row(what: &str, detail: impl std::fmt::Display) -> Error {
    tracing::error!(%detail, "Corrupt {} row", what);
    Error::Storage(StorageError::Database(format!("corrupt {what} row: {detail}")))
}
