use std::path::PathBuf;

/// Every way a backup run can fail.
///
/// Clone and upload failures are normally recorded in the run report rather than
/// returned; the pipeline only returns enumeration and archive errors.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The provider rejected the access token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The repository listing endpoint failed for any other reason.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("clone of {repository} failed: {message}")]
    Clone { repository: String, message: String },

    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("remote storage rejected upload ({code}): {message}")]
    RemoteStorage { code: String, message: String },

    /// The archive could not be read, or the upload never got a response.
    #[error("upload failed before reaching remote storage: {0}")]
    Upload(String),
}

impl BackupError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
