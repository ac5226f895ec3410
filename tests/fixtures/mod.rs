//! Shared inbox fixtures
//!
//! Test files pull these in with `mod fixtures;` and reach the library through
//! its crate name, so nothing depends on the test runner's search path.
#![allow(dead_code)]

pub mod expected_outputs;
pub mod sample_emails;
