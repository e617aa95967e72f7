//! Integration test suite for sqlweave
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **compile**: compiling templates through the public API
//! - **execution**: running templates against in-process data sources
//! - **store**: the shared template store under concurrent use
//! - **cli**: the `sqlweave` binary end to end

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod compile;
mod execution;
mod store;
