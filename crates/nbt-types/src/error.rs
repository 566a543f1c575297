use thiserror::Error;

/// Errors raised by the registry and sync layers.
///
/// `NotFound` and `TransportUnavailable` are only produced by the explicit
/// `require`/`try_send` helpers; the regular lookup and send paths log and
/// return a sentinel instead.
#[derive(Debug, Error)]
pub enum NbError {
    #[error("invalid {kind}: {reason}")]
    InvalidEntity { kind: &'static str, reason: String },

    #[error("unknown field in {kind} definition: {message}")]
    UnknownField { kind: &'static str, message: String },

    #[error("cannot find {kind}: {origin} | {key}")]
    NotFound {
        kind: &'static str,
        origin: String,
        key: String,
    },

    #[error("sync channel has no attached front-end")]
    TransportUnavailable,

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type NbResult<T> = Result<T, NbError>;

/// Failure of a tool's load factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The factory does not take keyword arguments; callers retry with none.
    #[error("tool factory does not accept arguments")]
    UnsupportedArgs,

    #[error("tool failed to load: {0}")]
    Failed(String),
}

impl NbError {
    /// Map a serde error from a `deny_unknown_fields` definition into the taxonomy.
    pub fn from_spec_error(kind: &'static str, err: serde_json::Error) -> Self {
        let message = err.to_string();
        if message.starts_with("unknown field") {
            Self::UnknownField { kind, message }
        } else {
            Self::InvalidEntity {
                kind,
                reason: message,
            }
        }
    }
}
