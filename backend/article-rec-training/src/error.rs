use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrainingError>;

/// Failures that abort a training run.
///
/// Shape and alignment errors are raised at component boundaries so that they
/// never surface as an index panic from inside the numeric code. Numeric
/// degeneracies (zero vectors, zero half-life) are not errors; they are
/// sanitised where the values are consumed.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Alignment violation: {0}")]
    Alignment(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to decode {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Recommendation sink error: {0}")]
    Sink(String),
}

impl TrainingError {
    pub fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        TrainingError::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn decode(location: impl Into<String>, source: serde_json::Error) -> Self {
        TrainingError::Decode {
            location: location.into(),
            source,
        }
    }

    /// Input-shape and alignment failures mean the upstream collaborators
    /// handed over inconsistent data; the run must not produce partial output.
    pub fn is_input_contract_violation(&self) -> bool {
        matches!(
            self,
            TrainingError::EmptyInput(_)
                | TrainingError::ShapeMismatch { .. }
                | TrainingError::Alignment(_)
        )
    }

    /// Failures worth retrying at the persistence boundary.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrainingError::Io(_) | TrainingError::Sink(_))
    }
}

impl From<envy::Error> for TrainingError {
    fn from(err: envy::Error) -> Self {
        TrainingError::Config(err.to_string())
    }
}
