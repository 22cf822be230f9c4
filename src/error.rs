use crate::VertexId;
use thiserror::Error;

/// Errors raised by graph construction, editing and (de)serialization.
///
/// Structural and edit errors abort the operation that raised them and leave
/// the graph as it was before the call.
#[derive(Error, Debug)]
pub enum GraphError {
    /// AP double-use, dangling references, bad ring endpoints and the like.
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// An edit request that cannot be honoured, such as an incomplete AP mapping.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// The inner graph of a template cannot be set or edited any more.
    #[error("Immutable template: {0}")]
    ImmutableTemplate(String),

    /// An edit of an inner graph changed the outer AP signature of its template
    /// in a way the host graph would notice.
    #[error("Template {template} changed its outer AP signature: {detail}")]
    TemplateSignatureChanged { template: VertexId, detail: String },

    #[error("Cannot reset {counter} counter to {requested}: current value is {current}")]
    CounterRegression {
        counter: &'static str,
        requested: u64,
        current: u64,
    },

    /// An imported id leaves no room for the counter to move past it.
    #[error("No {counter} id left after {max_used}")]
    IdsExhausted { counter: &'static str, max_used: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by a building-block library.
    #[error("Library error: {0}")]
    Library(#[from] anyhow::Error),
}

impl GraphError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::StructuralInconsistency(msg.into())
    }

    pub(crate) fn invalid_edit(msg: impl Into<String>) -> Self {
        Self::InvalidEdit(msg.into())
    }

    pub(crate) fn immutable(msg: impl Into<String>) -> Self {
        Self::ImmutableTemplate(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
