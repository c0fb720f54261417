//! Domain layer containing the transcript model.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, validation errors)
//! - `transcript` - Activity records, transcript descriptions, continuation tokens and paging

pub mod foundation;
pub mod transcript;
