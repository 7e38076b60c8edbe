//! Synthetic JPK archives shared with the library's unit tests.

#[path = "../../src/fixtures.rs"]
mod fixtures;

pub use fixtures::*;
