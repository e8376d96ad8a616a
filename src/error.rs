use thiserror::Error;

/// Main error type for RAGWeave
#[derive(Error, Debug)]
pub enum RagweaveError {
    /// Path does not exist, is a directory without recursion, or is neither file nor directory
    #[error("Path error: {0}")]
    Path(String),

    /// The vector database could not be reached at all
    #[error("Vector store unavailable ({context}): {source}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response (or GraphQL errors) from the vector database
    #[error("Vector store request failed ({context}): status {status}: {body}")]
    StoreRequest {
        context: String,
        status: u16,
        body: String,
    },

    /// Schema class does not exist yet
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// More than one record shares a key that must be unique
    #[error("Store integrity violation: {0}")]
    Integrity(String),

    /// Text extraction or its credential exchange failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// A required configuration value is absent
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chat completion API errors
    #[error("Chat API error: {0}")]
    Chat(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RagweaveError {
    /// Whether this error means "the class is not there (yet)".
    pub fn is_class_not_found(&self) -> bool {
        matches!(self, RagweaveError::ClassNotFound(_))
    }
}

/// Convenient Result type using RagweaveError
pub type Result<T> = std::result::Result<T, RagweaveError>;
