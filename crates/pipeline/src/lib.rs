//! Annotation workflow services: video locking, fragment submission, source
//! ingest, clip extraction with batch aggregation, and periodic maintenance.
//!
//! Services depend only on the contracts in `clipflow-core`; [`memory`]
//! provides in-process implementations for single-process use and tests.

pub mod batch;
pub mod context;
pub mod extraction;
pub mod ingest;
pub mod lock_service;
pub mod memory;
pub mod recovery;
pub mod workflow;

pub use batch::BatchOrchestrator;
pub use context::PipelineContext;
pub use extraction::{ClipExtractor, ClipJobRunner};
pub use ingest::{IngestJob, IngestOutcome};
pub use lock_service::LockService;
pub use recovery::{MaintenanceSweep, SweepReport};
pub use workflow::VideoWorkflow;
