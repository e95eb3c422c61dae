//! logship - a log-shipping agent core.
//!
//! This library provides the file-identity and registrar subsystem of a
//! log-shipping agent: stable per-file identities, durable per-identity
//! read offsets, and the event protocol through which discovery and
//! harvesting report what happened on disk.

pub mod agent;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod identity;
pub mod registrar;
