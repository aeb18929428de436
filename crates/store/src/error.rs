//! Store error types.

/// Errors produced by the record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bundle '{0}' already exists in this data version")]
    DuplicateName(String),

    #[error("no such bundle: {0}")]
    NoSuchBundle(i64),

    #[error("no such data version: {0}")]
    NoSuchVersion(i64),

    #[error("no deployment settings for application '{0}'")]
    NoSuchApplication(String),

    #[error("data version {0} is attached to an application version")]
    VersionInUse(i64),

    #[error("data version {0} is published and cannot be modified")]
    PublishedImmutable(i64),

    #[error("data version {0} is being published")]
    PublishInProgress(i64),

    #[error("data version {0} belongs to a different application")]
    WrongApplication(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
