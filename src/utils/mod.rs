//!
//! Utility module for form binding.
//!
//! Re-exports identifier sequencing, map predicates and JSON value helpers for use throughout the codebase.
/// Predicates over key/value collections
pub mod maps;
/// Monotonic identifier generation
pub mod sequence;
/// Helpers for loosely typed JSON values
pub mod values;

pub use maps::any;
pub use sequence::IdSequence;
pub use values::{scalar_text, truthy};
