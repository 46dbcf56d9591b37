//! Core domain types.
//!
//! Every cross-boundary payload in the agent (extracted parameters, tool
//! calls and results, resolver context, session documents) is a fixed
//! schema defined here. No bag-of-strings passing between layers.

mod catalog;
mod context;
mod corpus;
mod message;
mod params;
mod provenance;
mod session;

pub use catalog::CatalogDevice;
pub use context::{
    CountryCount, LocationContext, ManufacturerCount, ManufacturerGroup, ResolvedDevices,
    ResolverContext, ResolverField,
};
pub use corpus::{ChunkKind, CorpusChunk, synthetic_header};
pub use message::{Message, Role};
pub use params::{ExtractedParameters, LOW_CONFIDENCE_THRESHOLD, MAX_LIMIT, RecallClass};
pub use provenance::{
    Provenance, ResultMeta, StructuredResult, TermCount, ToolCall, ToolFailure, ToolResult,
};
pub use session::{Session, SessionRecord, SessionUsage};
