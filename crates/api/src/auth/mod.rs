//! Authentication primitives.
//!
//! Credentials are issued by the user service; this server only validates
//! the HS256 access tokens it signs.

pub mod jwt;
