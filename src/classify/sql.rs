//! SQL classifier: marks a [`sqlx::Error`] permanent unless it looks like a
//! transient connection/pool problem.

use crate::error::{make_permanent, BoxError};
use crate::retry::ErrTransformer;
use std::sync::Arc;

/// True for the `sqlx::Error` variants worth retrying: I/O failures and pool
/// exhaustion. Query-shape errors (row not found, decode failures,
/// constraint violations) are permanent, since retrying them can't help.
pub fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

/// Build an [`ErrTransformer`] marking [`sqlx::Error`]s permanent unless
/// [`is_transient`] reports true. Errors that aren't a `sqlx::Error` pass
/// through unchanged.
pub fn classifier() -> ErrTransformer<BoxError> {
    Arc::new(move |err: BoxError| match err.downcast::<sqlx::Error>() {
        Ok(sql_err) if !is_transient(&sql_err) => Box::new(make_permanent(*sql_err)),
        Ok(sql_err) => sql_err,
        Err(other) => other,
    })
}
