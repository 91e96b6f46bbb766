//! Error types for the sink writer.

use thiserror::Error;

/// Main error type for sink operations.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed table or column identifier
    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Target database error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Catalog metadata could not be read
    #[error("Metadata lookup failed for {table}: {message}")]
    Metadata { table: String, message: String },

    /// CREATE TABLE lost a race against another writer
    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    /// ADD COLUMN lost a race against another writer
    #[error("Column {column} already exists on {table}")]
    ColumnAlreadyExists { table: String, column: String },

    /// ALTER TABLE failed
    #[error("Schema evolution failed for {table}.{column}: {message}")]
    SchemaEvolution {
        table: String,
        column: String,
        message: String,
    },

    /// A field could not be read from a record value
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// Batch execution or commit failed
    #[error("Execution failed for table {table}: {message}")]
    Execution { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to read one field out of a record value.
///
/// The two absence cases are kept apart: a mapping with no entry for the
/// field is [`ExtractError::MissingNestedField`], a structured value whose
/// field is null (or undeclared) is [`ExtractError::FieldNotFound`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The value is neither a struct nor a map.
    #[error("Argument not a Struct or Map. Cannot get field '{field}' from {value}.")]
    TypeMismatch { field: String, value: String },

    /// Mapping lookup found no entry.
    #[error("Unable to find nested field '{field}'")]
    MissingNestedField { field: String },

    /// Struct lookup yielded null.
    #[error("The field '{field}' does not exist in {value}.")]
    FieldNotFound { field: String, value: String },
}

impl ExtractError {
    /// Name of the field the extraction was looking for.
    pub fn field(&self) -> &str {
        match self {
            ExtractError::TypeMismatch { field, .. }
            | ExtractError::MissingNestedField { field }
            | ExtractError::FieldNotFound { field, .. } => field,
        }
    }
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_DATABASE_ERROR: u8 = 2;
pub const EXIT_PARTIAL_WRITE: u8 = 3;
pub const EXIT_IO_ERROR: u8 = 7;

impl SinkError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SinkError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InvalidIdentifier error
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a Metadata error
    pub fn metadata(table: impl Into<String>, message: impl ToString) -> Self {
        SinkError::Metadata {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an Execution error
    pub fn execution(table: impl Into<String>, message: impl ToString) -> Self {
        SinkError::Execution {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is a configuration problem that must not be retried.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SinkError::Config(_) | SinkError::InvalidIdentifier { .. } | SinkError::Yaml(_)
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SinkError::Config(_)
            | SinkError::InvalidIdentifier { .. }
            | SinkError::Yaml(_)
            | SinkError::Json(_) => EXIT_CONFIG_ERROR,
            SinkError::Io(_) => EXIT_IO_ERROR,
            SinkError::Extraction(_) => EXIT_PARTIAL_WRITE,
            _ => EXIT_DATABASE_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
