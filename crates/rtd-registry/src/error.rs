//! Registry error types.

use thiserror::Error;

/// Errors from the serverless and client registries.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No token is known for this `UidName`.
    #[error("no registration for {0}")]
    UnknownClient(String),

    /// The caller's `client_id` does not match the token on file.
    #[error("client_id does not match the caller's token")]
    ClientIdMismatch,

    /// `add_serverless_remote_task_client` named a package already present.
    #[error("package already serverless: {0}")]
    DuplicatePackage(String),

    /// `add_serverless_remote_task_client` named a client_id already present.
    #[error("client_id already serverless: {0}")]
    DuplicateClientId(String),

    /// A client callback raised a transport error delivering a task (spec
    /// §4.10: "remove from active set; do not retry").
    #[error("delivery transport error: {0}")]
    TransportError(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
