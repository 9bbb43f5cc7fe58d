use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("Object not found: '{0}'")]
    NotFound(String),

    #[error("Object not found: {0}/{1}")]
    DetailNotFound(String, String),

    #[error("Malformed patch: {0}")]
    MalformedPatch(String),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Hook '{0}' failed: {1}")]
    Hook(String, String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RestError>;

impl RestError {
    /// Both not-found flavors map to the same status at the routing layer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::DetailNotFound(_, _))
    }
}

impl<T> From<std::sync::PoisonError<T>> for RestError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
