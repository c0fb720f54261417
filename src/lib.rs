//! Transcript Store - Durable, paginated conversation transcripts
//!
//! Records every activity exchanged in a conversation and serves it back in
//! the order the store accepted it, filtered by date and paged with signed
//! continuation tokens. Backends are swappable behind the
//! [`ports::TranscriptStore`] trait: in-memory, append-only files, or
//! PostgreSQL.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
