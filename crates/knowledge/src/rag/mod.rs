//! Query pipeline: retrieval, context assembly and answer composition.

pub mod composer;
pub mod context;
pub mod guard;
pub mod retriever;
pub mod types;

pub use composer::{AnswerComposer, QueryOutcome, QueryState};
pub use context::{AssembledContext, ContextAssembler};
pub use guard::{DomainGuard, Scope};
pub use retriever::Retriever;
pub use types::{Answer, Citation, Relevance};
