//! Client-side error types.

use thiserror::Error;

use crate::commerce::SdkError;

/// Errors from the purchase controller's own operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No user is signed in; purchases and restore need a session.
    #[error("no user is signed in")]
    NotSignedIn,

    /// The commerce SDK reported a failure.
    #[error("commerce SDK error: {0}")]
    Sdk(#[from] SdkError),
}
