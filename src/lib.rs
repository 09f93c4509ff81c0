//! metasync: metadata synchronization toolkit
//!
//! Synchronizes platform metadata between plain-text JSON files and remote
//! environments. The core is a per-context cache index, a bidirectional
//! reference resolution protocol, an upsert decision engine, and a
//! bounded-concurrency batch executor with per-item failure isolation.

pub mod cli;
pub mod core;
pub mod registry;
pub mod remote;
pub mod store;
