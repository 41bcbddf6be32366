//! Row models.
//!
//! Each submodule contains a `FromRow` struct matching the database row and,
//! where the domain has its own type, a fallible conversion into it.

pub mod clip;
pub mod job;
pub mod kv_entry;
pub mod source_video;
pub mod status;
