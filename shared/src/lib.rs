//! Reelport Shared Library
//!
//! Download job core used by the API server: job registry, orchestrator,
//! extractor adapter, and the naming and listing helpers around them.
pub mod errors;
pub mod extractor;
pub mod files;
pub mod filename;
pub mod job_registry;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod ytdlp;
