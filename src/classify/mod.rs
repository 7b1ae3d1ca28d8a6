//! Protocol-specific error classifiers pluggable into
//! [`crate::retry::TransformerChain`].
//!
//! Each submodule is a thin `fn(&E) -> bool`-shaped predicate (or an
//! [`crate::retry::ErrTransformer`] built around one), gated behind its own
//! Cargo feature so pulling in `tonic`/`http`/`sqlx` is opt-in, the same way
//! optional subsystems elsewhere are gated behind their own feature flags.

#[cfg(feature = "classify-tonic")]
pub mod tonic;

#[cfg(feature = "classify-http")]
pub mod http;

#[cfg(feature = "classify-sqlx")]
pub mod sql;
