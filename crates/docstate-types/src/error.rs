//! Error types for the document client, the storage coordinator and config.
//!
//! [`DocumentDbError`] is whatever a client reports; [`StorageError`] is the
//! normalized shape callers of load/save see.

use thiserror::Error;

/// HTTP-style status the document database uses for a missing resource.
pub const STATUS_NOT_FOUND: u16 = 404;

/// HTTP-style status the document database uses for an id collision on create.
pub const STATUS_CONFLICT: u16 = 409;

/// Error as reported by a document database client.
///
/// Clients differ in which fields they fill: a REST backend usually supplies
/// `code` and `body`, a local backend may only supply `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", normalize(.code, .body, .message))]
pub struct DocumentDbError {
    pub code: Option<u16>,
    pub body: Option<String>,
    pub message: Option<String>,
}

impl DocumentDbError {
    pub fn with_status(code: u16, body: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            body: Some(body.into()),
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            body: None,
            message: Some(message.into()),
        }
    }

    pub fn not_found(link: &str) -> Self {
        Self::with_status(STATUS_NOT_FOUND, format!("resource '{link}' not found"))
    }

    pub fn conflict(link: &str) -> Self {
        Self::with_status(STATUS_CONFLICT, format!("resource '{link}' already exists"))
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(STATUS_NOT_FOUND)
    }

    pub fn is_conflict(&self) -> bool {
        self.code == Some(STATUS_CONFLICT)
    }

    /// Human-readable description used by [`StorageError`].
    ///
    /// `"{code}: {body}"` when both are present, else the bare message, else
    /// `"unknown error"`.
    pub fn normalized_message(&self) -> String {
        normalize(&self.code, &self.body, &self.message)
    }
}

fn normalize(code: &Option<u16>, body: &Option<String>, message: &Option<String>) -> String {
    match (code, body, message) {
        (Some(code), Some(body), _) => format!("{code}: {body}"),
        (_, _, Some(message)) => message.clone(),
        _ => "unknown error".to_string(),
    }
}

/// The single error shape callers of load/save observe.
///
/// Variants name the phase that failed; each carries the normalized message,
/// never a transport status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage initialization failed: {0}")]
    Initialization(String),

    #[error("failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("failed to write '{key}': {message}")]
    Write { key: String, message: String },
}

impl StorageError {
    pub fn initialization(err: &DocumentDbError) -> Self {
        StorageError::Initialization(err.normalized_message())
    }

    pub fn read(key: &str, err: &DocumentDbError) -> Self {
        StorageError::Read {
            key: key.to_string(),
            message: err.normalized_message(),
        }
    }

    pub fn write(key: &str, err: &DocumentDbError) -> Self {
        StorageError::Write {
            key: key.to_string(),
            message: err.normalized_message(),
        }
    }

    /// The normalized message without the phase prefix.
    pub fn message(&self) -> &str {
        match self {
            StorageError::Initialization(message) => message,
            StorageError::Read { message, .. } | StorageError::Write { message, .. } => message,
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
