//! Integration tests for the provisioning driver.

mod apply_tests;
mod common;
mod destroy_tests;
