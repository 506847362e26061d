//! Shared utilities for depns.
//!
//! This crate provides the cross-cutting error taxonomy used by the
//! coordinate, requirement and namespace crates.

pub mod errors;
