pub mod jobs;
pub mod locks;
pub mod maintenance;
pub mod videos;
