//! Domain types, rules and collaborator contracts for the clip annotation
//! pipeline. This crate has no internal dependencies; storage, cloud and
//! HTTP crates implement the traits declared here.

pub mod annotation_tool;
pub mod blob;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod fragments;
pub mod lock;
pub mod media;
pub mod outcome;
pub mod queue;
pub mod roles;
pub mod status;
pub mod storage_path;
pub mod subprocess;
pub mod types;
pub mod video;
