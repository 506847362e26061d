//! Core data types for depns.
//!
//! This crate defines the value types shared by the resolver and the CLI:
//! artifact coordinates and specs, concrete artifacts, and the TOML artifact
//! profile used to populate namespaces in bulk.
//!
//! This crate is intentionally free of namespace state.

pub mod config;
pub mod coordinate;
