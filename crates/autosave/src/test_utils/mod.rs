//! Shared mocks and fixtures for autosave tests.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
