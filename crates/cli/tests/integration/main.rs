//! CLI integration tests.

mod common;
mod history_tests;
mod up_tests;
