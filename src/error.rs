//! Error type shared by the grid engine

use wasm_bindgen::JsValue;

/// Error type for grid operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("Invalid table structure: {0}")]
    InvalidStructure(String),
    #[error("Table with id \"{0}\" not found")]
    TableNotFound(String),
    #[error("Container with id \"{0}\" not found")]
    ContainerNotFound(String),
    #[error("Column index {index} out of range for {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },
    #[error("Row \"{0}\" not found")]
    RowNotFound(String),
    #[error("Table \"{0}\" has no body")]
    MissingBody(String),
    #[error("Fragment error: {0}")]
    Fragment(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::Serialization(e.to_string())
    }
}

impl From<GridError> for JsValue {
    fn from(e: GridError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
