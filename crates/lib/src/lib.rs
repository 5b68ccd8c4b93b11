//! stackdecl-lib: Core types and logic for stackdecl
//!
//! This crate provides the fundamental types used throughout stackdecl:
//! - `Deferred`: single-assignment values resolved after provisioning
//! - `ResourceGraph`: the declared resource intents and their dependencies
//! - `Exports`: values surfaced as program output after an apply
//! - `Snapshot`: the recorded state of a stack after each apply

pub mod config;
pub mod consts;
pub mod deferred;
pub mod execute;
pub mod export;
pub mod graph;
pub mod placeholder;
pub mod platform;
pub mod policy;
pub mod program;
pub mod programs;
pub mod provider;
pub mod resource;
pub mod snapshot;
pub mod util;
