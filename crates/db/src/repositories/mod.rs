//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod clip_repo;
pub mod job_repo;
pub mod kv_entry_repo;
pub mod source_video_repo;

pub use clip_repo::ClipRepo;
pub use job_repo::JobRepo;
pub use kv_entry_repo::KvEntryRepo;
pub use source_video_repo::SourceVideoRepo;
