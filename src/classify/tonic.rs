//! gRPC status classifier: marks a [`tonic::Status`] permanent unless its
//! code is in a caller-supplied retriable set.
//!
//! Defaults follow the canonical remote-call classifier: cancelled,
//! deadline-exceeded, unknown, internal, unavailable, and resource-exhausted
//! are retried; everything else is treated as permanent.

use crate::error::{make_permanent, BoxError};
use crate::retry::ErrTransformer;
use std::collections::HashSet;
use std::sync::Arc;
use tonic::Code;

/// The default retriable gRPC status codes.
pub fn default_retriable_codes() -> HashSet<Code> {
    [
        Code::Cancelled,
        Code::DeadlineExceeded,
        Code::Unknown,
        Code::Internal,
        Code::Unavailable,
        Code::ResourceExhausted,
    ]
    .into_iter()
    .collect()
}

/// Build an [`ErrTransformer`] that marks any [`tonic::Status`] permanent
/// unless its code is in `retriable`. Errors that aren't a `Status` pass
/// through unchanged.
pub fn classifier(retriable: HashSet<Code>) -> ErrTransformer<BoxError> {
    Arc::new(move |err: BoxError| match err.downcast::<tonic::Status>() {
        Ok(status) if !retriable.contains(&status.code()) => {
            Box::new(make_permanent(*status))
        }
        Ok(status) => status,
        Err(other) => other,
    })
}
