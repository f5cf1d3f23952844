//! Collaborators driven by the orchestrator: source download, file
//! validation and the extraction engine.

pub mod engine;
pub mod fetcher;
pub mod gate;
pub mod options;

pub use engine::{CommandEngine, EngineError, ExtractionEngine, ENGINE_ARTIFACTS};
pub use fetcher::{FetchError, HttpFetcher, SourceFetcher};
pub use gate::{FileGate, GateError, Limits, PdfGate};
pub use options::{ParserEngine, ParserPrefer, TargetLanguage, TuningOptions};
