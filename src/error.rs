//! Pipeline error taxonomy.
//!
//! Every fallible stage of the ingestion and answer pipelines reports a
//! [`PipelineError`] variant naming the failing concern. Ingestion-time
//! chunk failures are isolated (skip-and-continue); query-time failures
//! collapse to the configured fallback response and are written to the
//! durable error log. Configuration errors are fatal at startup.

/// Classified failure from one pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    /// Bad input rejected before any network call (empty text, bad chunk
    /// parameters, unknown topic).
    Validation(String),
    /// The file extension is not one of the supported types.
    UnsupportedFileType(String),
    /// Text extraction from a supported file failed.
    Extraction(String),
    /// The embedding service call failed (timeout, auth, rate limit).
    Embedding(String),
    /// The completion service call failed.
    Completion(String),
    /// A database read or write failed.
    Persistence(String),
    /// Invalid deployment configuration (dimension mismatch, missing
    /// credentials). Not recoverable per-request.
    Configuration(String),
}

impl PipelineError {
    /// Stable kind tag recorded in the error log.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::UnsupportedFileType(_) => "unsupported_file_type",
            PipelineError::Extraction(_) => "file_processing",
            PipelineError::Embedding(_) => "embedding_generation",
            PipelineError::Completion(_) => "completion_generation",
            PipelineError::Persistence(_) => "database_error",
            PipelineError::Configuration(_) => "configuration_error",
        }
    }

    /// The component a failure is attributed to in the error log.
    pub fn component(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "rag_pipeline",
            PipelineError::UnsupportedFileType(_) | PipelineError::Extraction(_) => {
                "document_processor"
            }
            PipelineError::Embedding(_) => "embedding_service",
            PipelineError::Completion(_) => "llm_client",
            PipelineError::Persistence(_) => "storage",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(m) => write!(f, "validation failed: {}", m),
            PipelineError::UnsupportedFileType(ext) => {
                write!(f, "unsupported file type: {}", ext)
            }
            PipelineError::Extraction(m) => write!(f, "text extraction failed: {}", m),
            PipelineError::Embedding(m) => write!(f, "embedding failed: {}", m),
            PipelineError::Completion(m) => write!(f, "completion failed: {}", m),
            PipelineError::Persistence(m) => write!(f, "persistence failed: {}", m),
            PipelineError::Configuration(m) => write!(f, "configuration error: {}", m),
        }
    }
}

impl std::error::Error for PipelineError {}
