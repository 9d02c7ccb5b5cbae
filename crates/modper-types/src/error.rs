use thiserror::Error;

use crate::query::Query;

/// Errors raised while routing queries or computing responses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerceptionError {
    #[error("No module can answer query: {0}")]
    NoResponder(Query),

    #[error("Multiple modules can answer query {query}: {modules:?}")]
    AmbiguousResponders { query: Query, modules: Vec<String> },

    #[error("Module {module} cannot answer query: {query}")]
    CannotAnswer { module: String, query: Query },

    #[error("Cyclic query detected: {0}")]
    CyclicQuery(Query),

    #[error("Query nesting exceeded the maximum depth of {max_depth}")]
    QueryDepthExceeded { max_depth: usize },

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Sensor fault on {sensor}: {details}")]
    SensorFault { sensor: String, details: String },

    #[error("Expected a {expected} response, got {found}")]
    UnexpectedResponse {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Predicate {predicate} expects {expected} arguments, got {found}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        found: usize,
    },

    #[error("Object {object} is not an instance of type {expected}")]
    TypeMismatch { object: String, expected: String },

    #[error("Malformed observation: {0}")]
    MalformedObservation(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PerceptionError>;
