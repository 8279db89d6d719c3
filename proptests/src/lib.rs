//! Property-based tests for the audit pipeline.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all property tests
//! cargo test -p proptests
//!
//! # Run with more test cases (slower but more thorough)
//! PROPTEST_CASES=10000 cargo test -p proptests
//!
//! # Run specific test module
//! cargo test -p proptests merkle
//! ```
//!
//! ## Test Categories
//!
//! - **Merkle tests**: Commitment determinism, sensitivity and path replay
//! - **Challenge tests**: Derivation determinism and index range
//! - **Audit tests**: Result counts under prover failures, single-flight
//!   rounds, reporter drain completeness

/// Shared test strategies and helpers.
pub mod strategies;

#[cfg(test)]
mod audit;
#[cfg(test)]
mod challenge;
#[cfg(test)]
mod merkle;
