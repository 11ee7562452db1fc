/// Error taxonomy shared by the store, the dispatcher and the transports.
///
/// Neither variant is fatal: callers convert them into a generic failure
/// signal for the client and log the detail.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// A required field was missing or empty.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The durable read or write failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ChatError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }
}
