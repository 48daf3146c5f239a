use thiserror::Error;

/// Failures a batch run can surface.  Nothing is swallowed: any of these
/// aborts the run and the batch is appended as a whole or not at all.
#[derive(Error, Debug)]
pub enum LoadError {
    /// HTTP failure, non-200 status, or a body that does not decode as the
    /// agenda feed.
    #[error("failed to fetch publishing schedule: {0}")]
    Fetch(String),

    /// The existence-check query could not be executed.  Not retried;
    /// distinct from a value collision, which the allocator retries.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The allocator hit its retry bound without finding a free load id.
    #[error("no free load id found after {attempts} attempts")]
    IdentifierSpaceExhausted { attempts: u32 },

    /// The batch write failed after the backstop retries.
    #[error("failed to persist batch: {0}")]
    Persistence(String),
}
