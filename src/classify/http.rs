//! HTTP status classifier: marks an [`HttpStatusError`] permanent unless its
//! status code is one a caller-supplied predicate reports as transient.

use crate::error::{make_permanent, BoxError};
use crate::retry::ErrTransformer;
use http::StatusCode;
use std::sync::Arc;

/// The error shape the classifier expects: a failed HTTP call's status.
#[derive(Debug, thiserror::Error)]
#[error("http request failed with status {0}")]
pub struct HttpStatusError(pub StatusCode);

/// Default transient predicate: server errors, 429, and request timeout.
pub fn is_transient_by_default(status: &StatusCode) -> bool {
    status.is_server_error()
        || *status == StatusCode::TOO_MANY_REQUESTS
        || *status == StatusCode::REQUEST_TIMEOUT
}

/// Build an [`ErrTransformer`] marking [`HttpStatusError`]s permanent unless
/// `transient` reports true for their status. Errors that aren't an
/// `HttpStatusError` pass through unchanged.
pub fn classifier(
    transient: impl Fn(&StatusCode) -> bool + Send + Sync + 'static,
) -> ErrTransformer<BoxError> {
    Arc::new(move |err: BoxError| match err.downcast::<HttpStatusError>() {
        Ok(status_err) if !transient(&status_err.0) => Box::new(make_permanent(*status_err)),
        Ok(status_err) => status_err,
        Err(other) => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_permanent;

    #[test]
    fn server_error_is_retriable_by_default() {
        let transformer = classifier(is_transient_by_default);
        let err: BoxError = Box::new(HttpStatusError(StatusCode::SERVICE_UNAVAILABLE));
        let classified = transformer(err);
        assert!(!is_permanent(classified.as_ref()));
    }

    #[test]
    fn not_found_is_permanent_by_default() {
        let transformer = classifier(is_transient_by_default);
        let err: BoxError = Box::new(HttpStatusError(StatusCode::NOT_FOUND));
        let classified = transformer(err);
        assert!(is_permanent(classified.as_ref()));
    }
}
