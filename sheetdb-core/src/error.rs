//! Error types for SheetDB operations

use thiserror::Error;

/// Schema errors: column layout and record shape problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("Column limit exceeded: index {index}, at most {max} columns are supported")]
    ColumnLimitExceeded { index: usize, max: usize },

    #[error("Type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Column {column} is reserved")]
    ReservedColumn { column: String },

    #[error("Duplicate column: {column}")]
    DuplicateColumn { column: String },

    #[error("Invalid column name {column:?}: expected letters, digits and underscores, not starting with a digit")]
    InvalidColumnName { column: String },

    #[error("At least one column is required")]
    EmptyColumns,
}

/// Query-build errors, raised before anything is sent to the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Placeholder count mismatch: template has {placeholders}, got {args} arguments")]
    ArgumentCountMismatch { placeholders: usize, args: usize },

    #[error("Unsupported argument at position {position}: {kind}")]
    UnsupportedArgument { position: usize, kind: &'static str },

    #[error("Unterminated string literal starting at byte {start}")]
    UnterminatedLiteral { start: usize },

    #[error("String argument at position {position} contains both quote characters")]
    UnquotableString { position: usize },
}

/// Errors surfaced by a spreadsheet backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Invalid range: {range}")]
    InvalidRange { range: String },

    #[error("Spreadsheet not found: {spreadsheet_id}")]
    SpreadsheetNotFound { spreadsheet_id: String },

    #[error("Sheet not found: {sheet}")]
    SheetNotFound { sheet: String },

    #[error("Sheet already exists: {sheet}")]
    SheetExists { sheet: String },

    #[error("Formula error: {reason}")]
    FormulaError { reason: String },

    #[error("Unexpected response: {reason}")]
    UnexpectedResponse { reason: String },

    #[error("Injected fault: {reason}")]
    Injected { reason: String },
}

/// Scratchpad protocol errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Scratchpad for {sheet} is booked by {token}")]
    ScratchpadBusy { sheet: String, token: String },

    #[error("Booking {expected} for {sheet} was overwritten by {found}")]
    BookingLost {
        sheet: String,
        expected: String,
        found: String,
    },

    #[error("Interrupted sequence {token} on {sheet} cannot be recovered: {reason}")]
    UnrecoverableBooking {
        sheet: String,
        token: String,
        reason: String,
    },

    #[error("Malformed row indices from backend: {raw}")]
    MalformedRowIndices { raw: String },

    #[error("Failed to encode journal intent: {reason}")]
    IntentEncoding { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Value codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Stored value is missing the {expected:?} prefix")]
    MissingPrefix { expected: char },

    #[error("Invalid base64 payload: {reason}")]
    InvalidBase64 { reason: String },
}

/// Master error type for all SheetDB errors.
#[derive(Debug, Clone, Error)]
pub enum SheetDbError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Backend error during {operation} on {range}: {source}")]
    Backend {
        operation: &'static str,
        range: String,
        #[source]
        source: BackendError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,
}

impl SheetDbError {
    /// Wrap a backend failure with the operation and range it happened on.
    pub fn backend(operation: &'static str, range: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            operation,
            range: range.into(),
            source,
        }
    }

    /// True when the requested key or row is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// The underlying backend error, if this is one.
    pub fn backend_source(&self) -> Option<&BackendError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for SheetDB operations.
pub type SheetDbResult<T> = Result<T, SheetDbError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

// =============================================================================
// TESTS
// =============================================================================
