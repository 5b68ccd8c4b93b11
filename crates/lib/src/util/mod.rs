//! Shared utilities.
//!
//! Common utilities used across the crate, currently hashing.

pub mod hash;
