//! Call graph module: the structural backbone of flowlens.
//!
//! Provides the graph data model, the symbol registry used while building,
//! route matching, and the engine every analysis queries.

pub mod builder;
pub mod engine;
pub mod registry;
pub mod routes;
pub mod types;

pub use builder::build_call_graph;
pub use engine::{CallGraph, FileSummary, GraphSnapshot, GraphStats, SnapshotEdge};
pub use registry::{ModuleRef, SymbolRegistry};
pub use routes::{RoutePattern, RouteSegment};
pub use types::{
    CallFlags, CallSite, CallTarget, CallVia, Declaration, DeclarationKind, EdgeData, EdgeKind,
    ErrorHandling, ExternalEdge, ExternalKind, FileAnalysis, HttpMethod, ImportBinding,
    ImportInfo, Layer,
};
