//! Shared test infrastructure for the rule repositories.

pub mod harness;
