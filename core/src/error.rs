use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    /// Event failed boundary validation. Rejected, never defaulted.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Unknown id on a resolve or lookup, or a completion that arrived
    /// before its attempt (producer ordering contract violated).
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Unexpected state inside a heuristic or rollup.
    #[error("internal compute error: {0}")]
    InternalCompute(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AggregateError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type AggregateResult<T> = Result<T, AggregateError>;
